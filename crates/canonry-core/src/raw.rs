//! Raw records — immutable, content-addressed copies of exactly what was
//! submitted, scoped to the run that introduced them.
//!
//! Raw documents are never updated. A `(run, digest)` pair is stored at most
//! once; re-submitting identical bytes within one run returns the existing
//! row. Different runs store identical bytes independently — cross-run
//! deduplication happens at the curated layer, not here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{digest::Digest, identity::Identity, run::RunId};

pub type RawId = i64;
pub type BundleId = i64;

/// One physical document ever observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
  pub raw_id:        RawId,
  pub run_id:        RunId,
  /// The enveloping bundle this document was split out of, if any.
  pub bundle_id:     Option<BundleId>,
  /// Origin locator inside the source bundle (`fullUrl`), if any.
  pub full_url:      Option<String>,
  pub identity:      Identity,
  pub sha256:        Digest,
  /// Canonical JSON text of the document.
  pub content:       String,
  pub first_seen_ts: DateTime<Utc>,
}

/// Input to [`crate::store::ArtifactStore::append_raw`].
#[derive(Debug, Clone)]
pub struct NewRawDocument {
  pub run_id:    RunId,
  pub bundle_id: Option<BundleId>,
  pub full_url:  Option<String>,
  pub identity:  Identity,
  pub sha256:    Digest,
  pub content:   String,
}

/// Outcome of a raw append: the row id, and whether a row was actually
/// created or the within-run dedupe returned an existing one.
#[derive(Debug, Clone, Copy)]
pub struct RawAppend {
  pub raw_id:  RawId,
  pub created: bool,
}

/// Input to [`crate::store::ArtifactStore::record_bundle`] — the whole
/// envelope a bundle run was fed, stored once for provenance.
#[derive(Debug, Clone)]
pub struct NewSourceBundle {
  pub run_id:      RunId,
  pub bundle_type: Option<String>,
  pub sha256:      Digest,
  pub content:     String,
}

/// A recorded but unresolved cross-document reference. Purely observational:
/// no dedupe, no conflict semantics, and the target string is never matched
/// against stored documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEdge {
  /// Dotted/indexed path of the object carrying the reference, e.g.
  /// `subject` or `entry[0].item`.
  pub from_path:    String,
  /// The reference string exactly as found.
  pub to_reference: String,
}
