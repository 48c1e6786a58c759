//! The `ArtifactStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `canonry-store-sqlite`).
//! The ingest controller and exporter depend on this abstraction, not on any
//! concrete backend.
//!
//! Ownership of writes is split: the ingest controller drives run, raw and
//! reference-edge creation through the append methods; the curated tables are
//! written exclusively inside [`ArtifactStore::resolve`], which is one atomic
//! unit per document.

use std::future::Future;

use crate::{
  curated::{CuratedId, CuratedResource, DigestHistoryRow, Resolution, Variant},
  digest::Digest,
  identity::{Identity, IdentityKey},
  query::CuratedFilter,
  raw::{BundleId, NewRawDocument, NewSourceBundle, RawAppend, RawDocument, RawId},
  run::{IngestRun, NewRun, RunId, RunOutcome},
};

// ─── Failure classification ──────────────────────────────────────────────────

/// Lets callers classify backend failures without depending on the backend.
///
/// A busy failure is transient lock contention: the ingest controller retries
/// the single document's resolution with backoff instead of aborting the run.
/// Everything else is treated as the store being unavailable.
pub trait StoreFailure: std::error::Error + Send + Sync + 'static {
  fn is_busy(&self) -> bool { false }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Canonry storage backend.
///
/// Raw writes are append-only. Curated state is only ever mutated through
/// [`ArtifactStore::resolve`], whose bookkeeping (variant upsert, conflict
/// flag, current digest, raw-to-curated link) happens in a single
/// transaction that blocks, not fails, against a concurrent resolve for the
/// same identity key — up to the backend's bounded busy timeout.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes.
pub trait ArtifactStore: Send + Sync {
  type Error: StoreFailure;

  // ── Runs ──────────────────────────────────────────────────────────────

  /// Open a run record. `started_ts` is set by the store.
  fn begin_run(
    &self,
    input: NewRun,
  ) -> impl Future<Output = Result<IngestRun, Self::Error>> + Send + '_;

  /// Close a run: set `finished_ts` and the outcome. Recorded for aborted
  /// runs too, for auditability.
  fn finish_run(
    &self,
    run_id: RunId,
    outcome: RunOutcome,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_run(
    &self,
    run_id: RunId,
  ) -> impl Future<Output = Result<Option<IngestRun>, Self::Error>> + Send + '_;

  // ── Raw store — append-only writes ────────────────────────────────────

  /// Store the whole envelope a bundle run was fed.
  fn record_bundle(
    &self,
    input: NewSourceBundle,
  ) -> impl Future<Output = Result<BundleId, Self::Error>> + Send + '_;

  /// Append one raw document.
  ///
  /// Idempotent within a run: if a row with the same `(run_id, sha256)`
  /// already exists, the existing row id is returned with `created = false`
  /// and nothing is written.
  fn append_raw(
    &self,
    input: NewRawDocument,
  ) -> impl Future<Output = Result<RawAppend, Self::Error>> + Send + '_;

  /// A run's raw history in append order — provenance inspection, not a
  /// query surface.
  fn raw_documents_of_run(
    &self,
    run_id: RunId,
  ) -> impl Future<Output = Result<Vec<RawDocument>, Self::Error>> + Send + '_;

  /// Append reference edges found in a raw document. No dedupe.
  fn append_reference_edges(
    &self,
    run_id: RunId,
    from_raw_id: RawId,
    edges: Vec<crate::raw::ReferenceEdge>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Edges recorded by one run, in append order, paired with the raw
  /// document that carried them.
  fn reference_edges_of_run(
    &self,
    run_id: RunId,
  ) -> impl Future<Output = Result<Vec<(RawId, crate::raw::ReferenceEdge)>, Self::Error>>
  + Send
  + '_;

  // ── Curated resolver ──────────────────────────────────────────────────

  /// Find or create the curated record for `key`, update variant
  /// bookkeeping for `digest`, set the conflict flag when a second distinct
  /// variant appears (sticky — never cleared), advance `current_sha256` to
  /// the digest just seen, and link `raw_id` to the curated record.
  ///
  /// One atomic transaction per call.
  fn resolve<'a>(
    &'a self,
    key: &'a IdentityKey,
    identity: &'a Identity,
    digest: &'a Digest,
    raw_id: RawId,
    run_id: RunId,
  ) -> impl Future<Output = Result<Resolution, Self::Error>> + Send + 'a;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Curated listing for UI/CLI display. Deterministic for fixed state and
  /// filter (ties break by curated id ascending).
  fn list_curated<'a>(
    &'a self,
    filter: &'a CuratedFilter,
  ) -> impl Future<Output = Result<Vec<CuratedResource>, Self::Error>> + Send + 'a;

  fn get_curated(
    &self,
    id: CuratedId,
  ) -> impl Future<Output = Result<Option<CuratedResource>, Self::Error>> + Send + '_;

  /// Lookup by display identifier (canonical URL, else logical id), as used
  /// by selection-based export front-ends.
  fn find_curated_by_ident<'a>(
    &'a self,
    ident: &'a str,
  ) -> impl Future<Output = Result<Option<CuratedResource>, Self::Error>> + Send + 'a;

  /// A curated identity's variants, ordered by occurrence count descending,
  /// digest ascending.
  fn variants_of(
    &self,
    id: CuratedId,
  ) -> impl Future<Output = Result<Vec<Variant>, Self::Error>> + Send + '_;

  /// The most recently first-seen raw content carrying `digest`.
  fn latest_content_by_digest<'a>(
    &'a self,
    digest: &'a Digest,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + 'a;

  /// The raw-history digest view: per canonical identity, how many distinct
  /// digests have ever been observed — conflict spotting independent of
  /// curated state.
  fn digest_history(
    &self,
  ) -> impl Future<Output = Result<Vec<DigestHistoryRow>, Self::Error>> + Send + '_;
}
