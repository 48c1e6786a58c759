//! Curated records — the identity-addressed projection over raw history.
//!
//! A curated resource is the single addressable record for one identity key.
//! Each distinct byte-content ever observed under that identity has exactly
//! one variant row. Two or more variants mean conflict, and conflict is
//! sticky: past divergence stays visible to curators even if later imports
//! only bring back the original content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{digest::Digest, run::RunId};

pub type CuratedId = i64;

/// The single addressable record for one identity key.
///
/// At least one of `canonical_url` / `logical_id` is set. Never deleted
/// during normal operation — query and export depend on curated rows being
/// stable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuratedResource {
  pub curated_id:       CuratedId,
  pub resource_type:    String,
  pub logical_id:       Option<String>,
  pub canonical_url:    Option<String>,
  pub artefact_version: Option<String>,
  pub partition_key:    Option<String>,
  /// Digest of the content currently considered authoritative for display
  /// and export: the most recently seen variant. Advancing it never resolves
  /// a conflict and never discards other variants' content.
  pub current_sha256:   Digest,
  pub has_conflict:     bool,
  pub first_seen_ts:    DateTime<Utc>,
  pub last_seen_ts:     DateTime<Utc>,
}

impl CuratedResource {
  /// The identifier shown to curators: canonical URL, else logical id.
  pub fn display_ident(&self) -> &str {
    self
      .canonical_url
      .as_deref()
      .or(self.logical_id.as_deref())
      .unwrap_or_default()
  }
}

/// One distinct byte-content observed under a curated identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
  pub curated_id:        CuratedId,
  pub sha256:            Digest,
  pub occurrences:       i64,
  pub first_seen_run_id: RunId,
  pub last_seen_run_id:  RunId,
  /// Free-text curator note.
  pub note:              Option<String>,
}

/// Outcome of one resolver call.
#[derive(Debug, Clone, Copy)]
pub struct Resolution {
  pub curated_id:       CuratedId,
  /// A curated record was created for a never-before-seen identity.
  pub new_identity:     bool,
  /// A variant row was created for content not previously seen under this
  /// identity. Always true when `new_identity` is true.
  pub new_variant:      bool,
  /// Value of the conflict flag after this resolution.
  pub conflict:         bool,
  /// The conflict flag flipped from clear to set in this call. Lets callers
  /// count newly conflicted identities without re-counting third or later
  /// variants under an already-conflicted one.
  pub conflict_raised:  bool,
}

/// One row of the raw-history digest view: how many distinct digests have
/// ever been observed for a canonical identity, independent of curated state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestHistoryRow {
  pub resource_type:    String,
  pub canonical_url:    String,
  pub artefact_version: Option<String>,
  pub distinct_digests: i64,
}
