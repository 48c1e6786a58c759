//! Ingest run records — the unit of provenance for every raw document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type RunId = i64;

/// Where a run's documents came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
  /// An enveloping bundle document whose entries were split out.
  Bundle,
  /// A package of standalone document files.
  Package,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
  /// All documents were processed, possibly with per-document skips.
  Finished,
  /// The underlying store became unavailable; progress up to that point
  /// stays committed.
  Aborted,
}

/// One import operation. Created open, closed exactly once; never mutated
/// otherwise and never deleted while raw documents reference it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRun {
  pub run_id:        RunId,
  pub started_ts:    DateTime<Utc>,
  pub finished_ts:   Option<DateTime<Utc>>,
  pub outcome:       Option<RunOutcome>,
  pub source_name:   String,
  pub source_kind:   SourceKind,
  /// Major version tag of the document schema the source claims, e.g. `"R4"`.
  pub schema_major:  String,
  /// Caller-supplied scope label (tenant, project); identities never cross
  /// partitions.
  pub partition_key: Option<String>,
}

/// Input to [`crate::store::ArtifactStore::begin_run`].
/// `started_ts` is always set by the store; it is not accepted from callers.
#[derive(Debug, Clone)]
pub struct NewRun {
  pub source_name:   String,
  pub source_kind:   SourceKind,
  pub schema_major:  String,
  pub partition_key: Option<String>,
}
