//! The ingest run controller.
//!
//! Drives one import end to end: opens a run record, feeds each document
//! through decode, identity extraction, digesting, raw append and curated
//! resolution, records reference edges, and closes the run.
//!
//! Failure policy: one bad document never aborts the whole run — malformed
//! and unidentifiable documents are skipped with a recorded reason. Busy
//! store transactions retry with backoff at document granularity. Any other
//! store failure aborts the run; documents already resolved stay committed,
//! and the aborted outcome is recorded on the run for auditability.

use std::{future::Future, time::Duration};

use canonry_codec::{
  Encoding, bundle, canonical_json, decode, digest_text, refs::reference_edges,
};
use canonry_core::{
  identity::Identity,
  raw::{BundleId, NewRawDocument, NewSourceBundle},
  run::{NewRun, RunId, RunOutcome, SourceKind},
  store::{ArtifactStore, StoreFailure},
};
use tracing::{debug, info, warn};

use crate::{Error, Result};

// ─── Options ─────────────────────────────────────────────────────────────────

/// How a document's content digest is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestPolicy {
  /// SHA-256 over the canonical JSON of the decoded document. Incidental
  /// whitespace and key order never split variants, and encodings converge
  /// to the extent decoding normalises them. Known limitation: the XML
  /// decoder yields every primitive as a string, so a JSON document using
  /// native numbers or booleans will not share a digest with its XML
  /// rendering.
  #[default]
  Canonical,
  /// SHA-256 over the submitted text, trimmed. Byte-faithful: any textual
  /// difference is a distinct variant.
  SourceBytes,
}

/// Parameters for one ingest run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
  pub source_name:        String,
  pub source_kind:        SourceKind,
  /// Major version tag of the document schema the source claims.
  pub schema_major:       String,
  /// Scope label (tenant, project); identities never cross partitions.
  pub partition_key:      Option<String>,
  pub digest_policy:      DigestPolicy,
  /// Scan documents for reference edges and record them.
  pub extract_references: bool,
  /// Busy-retry attempts per document before treating the store as
  /// unavailable.
  pub max_busy_retries:   u32,
}

impl IngestOptions {
  pub fn new(
    source_name: impl Into<String>,
    source_kind: SourceKind,
    schema_major: impl Into<String>,
  ) -> Self {
    Self {
      source_name:        source_name.into(),
      source_kind,
      schema_major:       schema_major.into(),
      partition_key:      None,
      digest_policy:      DigestPolicy::default(),
      extract_references: true,
      max_busy_retries:   4,
    }
  }
}

/// One document text handed to the controller.
#[derive(Debug, Clone)]
pub struct IncomingDocument {
  pub text:     String,
  pub encoding: Encoding,
  /// Origin locator inside a source bundle, if any.
  pub full_url: Option<String>,
}

impl IncomingDocument {
  pub fn json(text: impl Into<String>) -> Self {
    Self {
      text:     text.into(),
      encoding: Encoding::Json,
      full_url: None,
    }
  }

  pub fn xml(text: impl Into<String>) -> Self {
    Self {
      text:     text.into(),
      encoding: Encoding::Xml,
      full_url: None,
    }
  }
}

// ─── Run summary ─────────────────────────────────────────────────────────────

/// Why a document was skipped. The two kinds are logged distinctly: an
/// unidentifiable document was parseable, it just carries neither a
/// canonical URL nor a logical id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
  Malformed(String),
  Unidentifiable(String),
}

/// One skipped document, by batch position.
#[derive(Debug, Clone)]
pub struct Skipped {
  pub index:  usize,
  pub reason: SkipReason,
}

/// What one run did. Skips are always reported; data is never dropped
/// silently.
#[derive(Debug, Clone)]
pub struct RunSummary {
  pub run_id:         RunId,
  pub outcome:        RunOutcome,
  pub documents_seen: usize,
  /// Raw rows actually created (within-run duplicates excluded).
  pub raw_appended:   usize,
  pub new_identities: usize,
  /// Identities whose conflict flag flipped from clear to set in this run.
  pub new_conflicts:  usize,
  pub skipped:        Vec<Skipped>,
}

// ─── Entry points ────────────────────────────────────────────────────────────

/// Ingest a batch of standalone documents as one run.
pub async fn ingest<S: ArtifactStore>(
  store: &S,
  options: &IngestOptions,
  documents: Vec<IncomingDocument>,
) -> Result<RunSummary> {
  let run = store
    .begin_run(new_run(options))
    .await
    .map_err(Error::store)?;
  info!(
    run_id = run.run_id,
    source = %options.source_name,
    documents = documents.len(),
    "ingest run opened"
  );

  run_documents(store, options, run.run_id, None, documents).await
}

/// Ingest one bundle envelope as one run: the envelope is recorded once,
/// then each entry goes through the per-document pipeline.
///
/// An envelope that fails to decode or is not a bundle fails the call
/// before any run is opened.
pub async fn ingest_bundle<S: ArtifactStore>(
  store: &S,
  options: &IngestOptions,
  text: &str,
  encoding: Encoding,
) -> Result<RunSummary> {
  let split = bundle::split(text, encoding)?;

  let run = store
    .begin_run(new_run(options))
    .await
    .map_err(Error::store)?;
  info!(
    run_id = run.run_id,
    source = %options.source_name,
    entries = split.entries.len(),
    "bundle ingest run opened"
  );

  let envelope = NewSourceBundle {
    run_id:      run.run_id,
    bundle_type: split.bundle_type,
    sha256:      digest_text(text),
    content:     text.to_owned(),
  };
  let bundle_id = match with_retry(options.max_busy_retries, || {
    store.record_bundle(envelope.clone())
  })
  .await
  {
    Ok(bundle_id) => bundle_id,
    Err(e) => {
      return abort(store, run.run_id, empty_summary(run.run_id), e).await;
    }
  };

  let documents = split
    .entries
    .into_iter()
    .map(|entry| IncomingDocument {
      text: entry.text,
      encoding,
      full_url: entry.full_url,
    })
    .collect();

  run_documents(store, options, run.run_id, Some(bundle_id), documents).await
}

fn new_run(options: &IngestOptions) -> NewRun {
  NewRun {
    source_name:   options.source_name.clone(),
    source_kind:   options.source_kind,
    schema_major:  options.schema_major.clone(),
    partition_key: options.partition_key.clone(),
  }
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

fn empty_summary(run_id: RunId) -> RunSummary {
  RunSummary {
    run_id,
    outcome: RunOutcome::Finished,
    documents_seen: 0,
    raw_appended: 0,
    new_identities: 0,
    new_conflicts: 0,
    skipped: Vec::new(),
  }
}

async fn run_documents<S: ArtifactStore>(
  store: &S,
  options: &IngestOptions,
  run_id: RunId,
  bundle_id: Option<BundleId>,
  documents: Vec<IncomingDocument>,
) -> Result<RunSummary> {
  let mut summary = empty_summary(run_id);

  for (index, incoming) in documents.into_iter().enumerate() {
    summary.documents_seen += 1;

    let doc = match decode(&incoming.text, incoming.encoding) {
      Ok(doc) => doc,
      Err(e) => {
        warn!(run_id, index, error = %e, "skipping malformed document");
        summary.skipped.push(Skipped {
          index,
          reason: SkipReason::Malformed(e.to_string()),
        });
        continue;
      }
    };

    let identity = Identity::extract(&doc);
    let Some(key) = identity.key(options.partition_key.as_deref()) else {
      warn!(
        run_id,
        index,
        resource_type = %identity.resource_type,
        "skipping unidentifiable document: no canonical url or logical id"
      );
      summary.skipped.push(Skipped {
        index,
        reason: SkipReason::Unidentifiable(identity.resource_type.clone()),
      });
      continue;
    };

    let value = doc.to_value();
    let content = match canonical_json(&value) {
      Ok(content) => content,
      Err(e) => {
        warn!(run_id, index, error = %e, "skipping unserializable document");
        summary.skipped.push(Skipped {
          index,
          reason: SkipReason::Malformed(e.to_string()),
        });
        continue;
      }
    };
    let sha256 = match options.digest_policy {
      DigestPolicy::Canonical => digest_text(&content),
      DigestPolicy::SourceBytes => digest_text(incoming.text.trim()),
    };

    let input = NewRawDocument {
      run_id,
      bundle_id,
      full_url: incoming.full_url.clone(),
      identity: identity.clone(),
      sha256: sha256.clone(),
      content,
    };
    let append =
      match with_retry(options.max_busy_retries, || store.append_raw(input.clone()))
        .await
      {
        Ok(append) => append,
        Err(e) => return abort(store, run_id, summary, e).await,
      };

    if !append.created {
      debug!(run_id, index, "identical bytes already appended in this run");
      continue;
    }
    summary.raw_appended += 1;

    let resolution = match with_retry(options.max_busy_retries, || {
      store.resolve(&key, &identity, &sha256, append.raw_id, run_id)
    })
    .await
    {
      Ok(resolution) => resolution,
      Err(e) => return abort(store, run_id, summary, e).await,
    };

    if resolution.new_identity {
      summary.new_identities += 1;
    }
    if resolution.conflict_raised {
      summary.new_conflicts += 1;
      warn!(
        run_id,
        curated_id = resolution.curated_id,
        ident = identity.display_ident().unwrap_or_default(),
        "conflicting content for known identity"
      );
    }
    debug!(
      run_id,
      index,
      curated_id = resolution.curated_id,
      new_identity = resolution.new_identity,
      "document resolved"
    );

    if options.extract_references {
      let edges = reference_edges(&value);
      if !edges.is_empty() {
        let outcome = with_retry(options.max_busy_retries, || {
          store.append_reference_edges(run_id, append.raw_id, edges.clone())
        })
        .await;
        if let Err(e) = outcome {
          return abort(store, run_id, summary, e).await;
        }
      }
    }
  }

  store
    .finish_run(run_id, RunOutcome::Finished)
    .await
    .map_err(Error::store)?;
  info!(
    run_id,
    seen = summary.documents_seen,
    appended = summary.raw_appended,
    new_identities = summary.new_identities,
    new_conflicts = summary.new_conflicts,
    skipped = summary.skipped.len(),
    "ingest run finished"
  );

  Ok(summary)
}

/// Mark the run aborted and hand back the progress made so far. Documents
/// already resolved stay committed; only the current document is lost.
async fn abort<S: ArtifactStore>(
  store: &S,
  run_id: RunId,
  mut summary: RunSummary,
  cause: S::Error,
) -> Result<RunSummary> {
  warn!(run_id, error = %cause, "store unavailable, aborting run");
  if let Err(e) = store.finish_run(run_id, RunOutcome::Aborted).await {
    warn!(run_id, error = %e, "could not record aborted outcome");
  }
  summary.outcome = RunOutcome::Aborted;
  Ok(summary)
}

/// Run one store operation, retrying busy failures with backoff. Anything
/// that is not busy, or stays busy past `max_retries`, propagates.
async fn with_retry<T, E, F, Fut>(max_retries: u32, mut op: F) -> Result<T, E>
where
  E: StoreFailure,
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
{
  let mut attempt: u32 = 0;
  loop {
    match op().await {
      Err(e) if e.is_busy() && attempt < max_retries => {
        attempt += 1;
        let delay = Duration::from_millis(10u64 << attempt.min(6));
        warn!(attempt, ?delay, "store busy, retrying");
        tokio::time::sleep(delay).await;
      }
      other => return other,
    }
  }
}
