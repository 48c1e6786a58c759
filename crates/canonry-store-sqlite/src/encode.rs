//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings with microsecond precision
//! and a `Z` offset, so lexicographic comparison in SQL matches chronological
//! order. Digests are lowercase hex. Enum-like fields are stored as short
//! lowercase words.

use canonry_core::{
  curated::{CuratedResource, Variant},
  digest::Digest,
  raw::RawDocument,
  run::{IngestRun, RunOutcome, SourceKind},
};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── SourceKind ──────────────────────────────────────────────────────────────

pub fn encode_source_kind(k: SourceKind) -> &'static str {
  match k {
    SourceKind::Bundle => "bundle",
    SourceKind::Package => "package",
  }
}

pub fn decode_source_kind(s: &str) -> Result<SourceKind> {
  match s {
    "bundle" => Ok(SourceKind::Bundle),
    "package" => Ok(SourceKind::Package),
    other => Err(Error::UnknownDiscriminant {
      field: "source_kind",
      value: other.to_owned(),
    }),
  }
}

// ─── RunOutcome ──────────────────────────────────────────────────────────────

pub fn encode_outcome(o: RunOutcome) -> &'static str {
  match o {
    RunOutcome::Finished => "finished",
    RunOutcome::Aborted => "aborted",
  }
}

pub fn decode_outcome(s: &str) -> Result<RunOutcome> {
  match s {
    "finished" => Ok(RunOutcome::Finished),
    "aborted" => Ok(RunOutcome::Aborted),
    other => Err(Error::UnknownDiscriminant {
      field: "outcome",
      value: other.to_owned(),
    }),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from an `ingest_runs` row.
pub struct RawRunRow {
  pub run_id:        i64,
  pub started_ts:    String,
  pub finished_ts:   Option<String>,
  pub outcome:       Option<String>,
  pub source_name:   String,
  pub source_kind:   String,
  pub schema_major:  String,
  pub partition_key: Option<String>,
}

impl RawRunRow {
  pub fn into_run(self) -> Result<IngestRun> {
    Ok(IngestRun {
      run_id:        self.run_id,
      started_ts:    decode_dt(&self.started_ts)?,
      finished_ts:   self.finished_ts.as_deref().map(decode_dt).transpose()?,
      outcome:       self
        .outcome
        .as_deref()
        .map(decode_outcome)
        .transpose()?,
      source_name:   self.source_name,
      source_kind:   decode_source_kind(&self.source_kind)?,
      schema_major:  self.schema_major,
      partition_key: self.partition_key,
    })
  }
}

/// Raw strings read directly from a `raw_documents` row.
pub struct RawDocumentRow {
  pub raw_id:            i64,
  pub run_id:            i64,
  pub bundle_id:         Option<i64>,
  pub full_url:          Option<String>,
  pub resource_type:     String,
  pub logical_id:        Option<String>,
  pub canonical_url:     Option<String>,
  pub artefact_version:  Option<String>,
  pub meta_version_id:   Option<String>,
  pub meta_last_updated: Option<String>,
  pub sha256:            String,
  pub content:           String,
  pub first_seen_ts:     String,
}

impl RawDocumentRow {
  pub fn into_document(self) -> Result<RawDocument> {
    Ok(RawDocument {
      raw_id:        self.raw_id,
      run_id:        self.run_id,
      bundle_id:     self.bundle_id,
      full_url:      self.full_url,
      identity:      canonry_core::identity::Identity {
        resource_type:     self.resource_type,
        logical_id:        self.logical_id,
        canonical_url:     self.canonical_url,
        artefact_version:  self.artefact_version,
        meta_version_id:   self.meta_version_id,
        meta_last_updated: self.meta_last_updated,
      },
      sha256:        Digest::from_hex(self.sha256),
      content:       self.content,
      first_seen_ts: decode_dt(&self.first_seen_ts)?,
    })
  }
}

/// Raw strings read directly from a `curated_resources` row.
pub struct RawCuratedRow {
  pub curated_id:       i64,
  pub resource_type:    String,
  pub logical_id:       Option<String>,
  pub canonical_url:    Option<String>,
  pub artefact_version: Option<String>,
  pub partition_key:    Option<String>,
  pub current_sha256:   String,
  pub has_conflict:     i64,
  pub first_seen_ts:    String,
  pub last_seen_ts:     String,
}

impl RawCuratedRow {
  pub fn into_curated(self) -> Result<CuratedResource> {
    Ok(CuratedResource {
      curated_id:       self.curated_id,
      resource_type:    self.resource_type,
      logical_id:       self.logical_id,
      canonical_url:    self.canonical_url,
      artefact_version: self.artefact_version,
      partition_key:    self.partition_key,
      current_sha256:   Digest::from_hex(self.current_sha256),
      has_conflict:     self.has_conflict != 0,
      first_seen_ts:    decode_dt(&self.first_seen_ts)?,
      last_seen_ts:     decode_dt(&self.last_seen_ts)?,
    })
  }
}

/// Raw strings read directly from a `curated_variants` row.
pub struct RawVariantRow {
  pub curated_id:        i64,
  pub sha256:            String,
  pub occurrences:       i64,
  pub first_seen_run_id: i64,
  pub last_seen_run_id:  i64,
  pub note:              Option<String>,
}

impl RawVariantRow {
  pub fn into_variant(self) -> Variant {
    Variant {
      curated_id:        self.curated_id,
      sha256:            Digest::from_hex(self.sha256),
      occurrences:       self.occurrences,
      first_seen_run_id: self.first_seen_run_id,
      last_seen_run_id:  self.last_seen_run_id,
      note:              self.note,
    }
  }
}
