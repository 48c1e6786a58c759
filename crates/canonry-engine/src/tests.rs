//! End-to-end tests: the ingest controller and exporter running against the
//! in-memory SQLite store.

use std::sync::atomic::{AtomicUsize, Ordering};

use canonry_codec::{Encoding, to_xml};
use canonry_core::{
  curated::{CuratedId, CuratedResource, DigestHistoryRow, Resolution, Variant},
  digest::Digest,
  identity::{Identity, IdentityKey},
  query::CuratedFilter,
  raw::{
    BundleId, NewRawDocument, NewSourceBundle, RawAppend, RawDocument, RawId,
    ReferenceEdge,
  },
  run::{IngestRun, NewRun, RunId, RunOutcome, SourceKind},
  store::ArtifactStore,
};
use canonry_store_sqlite::SqliteStore;
use serde_json::{Value, json};

use crate::{
  DigestPolicy, Error, IncomingDocument, IngestOptions, SkipReason,
  export_by_idents, export_latest, export_selected, ingest, ingest_bundle,
};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn options(name: &str) -> IngestOptions {
  IngestOptions::new(name, SourceKind::Package, "R4")
}

fn doc_json(value: &Value) -> IncomingDocument {
  IncomingDocument::json(value.to_string())
}

fn sd1(name: &str) -> Value {
  json!({
    "resourceType": "StructureDefinition",
    "url": "http://x/sd1",
    "version": "1.0",
    "name": name,
  })
}

async fn only_curated(s: &SqliteStore) -> CuratedResource {
  let all = s.list_curated(&CuratedFilter::default()).await.unwrap();
  assert_eq!(all.len(), 1);
  all.into_iter().next().unwrap()
}

// ─── Ingest scenarios ────────────────────────────────────────────────────────

#[tokio::test]
async fn first_import_creates_one_identity_without_conflict() {
  let s = store().await;

  let summary = ingest(&s, &options("r1"), vec![doc_json(&sd1("B1"))])
    .await
    .unwrap();
  assert_eq!(summary.outcome, RunOutcome::Finished);
  assert_eq!(summary.documents_seen, 1);
  assert_eq!(summary.raw_appended, 1);
  assert_eq!(summary.new_identities, 1);
  assert_eq!(summary.new_conflicts, 0);
  assert!(summary.skipped.is_empty());

  let curated = only_curated(&s).await;
  assert!(!curated.has_conflict);
  assert_eq!(curated.canonical_url.as_deref(), Some("http://x/sd1"));

  let variants = s.variants_of(curated.curated_id).await.unwrap();
  assert_eq!(variants.len(), 1);
  assert_eq!(variants[0].occurrences, 1);
}

#[tokio::test]
async fn reimport_across_runs_dedupes_without_conflict() {
  let s = store().await;

  ingest(&s, &options("r1"), vec![doc_json(&sd1("B1"))])
    .await
    .unwrap();
  let second = ingest(&s, &options("r2"), vec![doc_json(&sd1("B1"))])
    .await
    .unwrap();
  assert_eq!(second.new_identities, 0);
  assert_eq!(second.new_conflicts, 0);
  assert_eq!(second.raw_appended, 1);

  let curated = only_curated(&s).await;
  assert!(!curated.has_conflict);

  let variants = s.variants_of(curated.curated_id).await.unwrap();
  assert_eq!(variants.len(), 1);
  assert_eq!(variants[0].occurrences, 2);
  assert_eq!(variants[0].last_seen_run_id, second.run_id);
}

#[tokio::test]
async fn divergent_content_raises_conflict_and_advances_current() {
  let s = store().await;

  ingest(&s, &options("r1"), vec![doc_json(&sd1("B1"))])
    .await
    .unwrap();
  ingest(&s, &options("r2"), vec![doc_json(&sd1("B1"))])
    .await
    .unwrap();
  let third = ingest(&s, &options("r3"), vec![doc_json(&sd1("B2"))])
    .await
    .unwrap();
  assert_eq!(third.new_conflicts, 1);
  assert_eq!(third.new_identities, 0);

  let curated = only_curated(&s).await;
  assert!(curated.has_conflict);

  // Variant completeness: occurrences sum to the raw rows resolved here.
  let variants = s.variants_of(curated.curated_id).await.unwrap();
  assert_eq!(variants.len(), 2);
  let total: i64 = variants.iter().map(|v| v.occurrences).sum();
  assert_eq!(total, 3);

  // Export hands out the most recently seen content: B2, not B1.
  let exported = export_selected(&s, &[curated.curated_id], Encoding::Json)
    .await
    .unwrap();
  let bundle: Value = serde_json::from_str(&exported).unwrap();
  assert_eq!(bundle["entry"][0]["resource"]["name"], json!("B2"));
}

#[tokio::test]
async fn within_run_duplicate_is_counted_once() {
  let s = store().await;

  let summary = ingest(
    &s,
    &options("r1"),
    vec![doc_json(&sd1("B1")), doc_json(&sd1("B1"))],
  )
  .await
  .unwrap();
  assert_eq!(summary.documents_seen, 2);
  assert_eq!(summary.raw_appended, 1);
  assert_eq!(summary.new_identities, 1);

  let curated = only_curated(&s).await;
  let variants = s.variants_of(curated.curated_id).await.unwrap();
  assert_eq!(variants[0].occurrences, 1);
}

#[tokio::test]
async fn bad_documents_skip_with_distinct_reasons_and_run_finishes() {
  let s = store().await;

  let batch = vec![
    IncomingDocument::json("{not json"),
    // Parseable, but neither canonical url nor logical id.
    doc_json(&json!({"resourceType": "CapabilityStatement"})),
    doc_json(&sd1("B1")),
  ];
  let summary = ingest(&s, &options("r1"), batch).await.unwrap();

  assert_eq!(summary.outcome, RunOutcome::Finished);
  assert_eq!(summary.documents_seen, 3);
  assert_eq!(summary.raw_appended, 1);
  assert_eq!(summary.skipped.len(), 2);
  assert_eq!(summary.skipped[0].index, 0);
  assert!(matches!(summary.skipped[0].reason, SkipReason::Malformed(_)));
  assert_eq!(summary.skipped[1].index, 1);
  assert!(matches!(
    summary.skipped[1].reason,
    SkipReason::Unidentifiable(ref rt) if rt == "CapabilityStatement"
  ));

  let run = s.get_run(summary.run_id).await.unwrap().unwrap();
  assert_eq!(run.outcome, Some(RunOutcome::Finished));
}

#[tokio::test]
async fn reference_edges_are_recorded_when_enabled() {
  let s = store().await;

  let doc = json!({
    "resourceType": "StructureDefinition",
    "id": "sd-1",
    "context": {"reference": "StructureDefinition/base"},
  });

  let summary = ingest(&s, &options("r1"), vec![doc_json(&doc)])
    .await
    .unwrap();
  let edges = s.reference_edges_of_run(summary.run_id).await.unwrap();
  assert_eq!(edges.len(), 1);
  assert_eq!(edges[0].1, ReferenceEdge {
    from_path:    "context".into(),
    to_reference: "StructureDefinition/base".into(),
  });

  let mut opts = options("r2");
  opts.extract_references = false;
  let summary = ingest(&s, &opts, vec![doc_json(&doc)]).await.unwrap();
  assert!(
    s.reference_edges_of_run(summary.run_id)
      .await
      .unwrap()
      .is_empty()
  );
}

#[tokio::test]
async fn partition_key_scopes_identities() {
  let s = store().await;

  let mut tenant_a = options("r1");
  tenant_a.partition_key = Some("tenant-a".into());
  let mut tenant_b = options("r2");
  tenant_b.partition_key = Some("tenant-b".into());

  ingest(&s, &tenant_a, vec![doc_json(&sd1("B1"))]).await.unwrap();
  let second = ingest(&s, &tenant_b, vec![doc_json(&sd1("B1"))])
    .await
    .unwrap();
  assert_eq!(second.new_identities, 1);

  let all = s.list_curated(&CuratedFilter::default()).await.unwrap();
  assert_eq!(all.len(), 2);
}

// ─── Digest policies ─────────────────────────────────────────────────────────

#[tokio::test]
async fn canonical_policy_converges_across_encodings_for_string_fields() {
  let s = store().await;

  let value = sd1("B1");
  let xml = to_xml(&value).unwrap();

  ingest(&s, &options("json"), vec![doc_json(&value)])
    .await
    .unwrap();
  let second = ingest(&s, &options("xml"), vec![IncomingDocument::xml(xml)])
    .await
    .unwrap();
  assert_eq!(second.new_conflicts, 0);

  let curated = only_curated(&s).await;
  assert!(!curated.has_conflict);
  assert_eq!(s.variants_of(curated.curated_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn source_bytes_policy_treats_encodings_as_distinct_variants() {
  let s = store().await;

  let value = sd1("B1");
  let xml = to_xml(&value).unwrap();

  let mut opts = options("json");
  opts.digest_policy = DigestPolicy::SourceBytes;
  ingest(&s, &opts, vec![doc_json(&value)]).await.unwrap();

  let mut opts = options("xml");
  opts.digest_policy = DigestPolicy::SourceBytes;
  let second = ingest(&s, &opts, vec![IncomingDocument::xml(xml)])
    .await
    .unwrap();
  assert_eq!(second.new_conflicts, 1);

  let curated = only_curated(&s).await;
  assert!(curated.has_conflict);
  assert_eq!(s.variants_of(curated.curated_id).await.unwrap().len(), 2);
}

// ─── Bundle ingest ───────────────────────────────────────────────────────────

#[tokio::test]
async fn bundle_ingest_records_envelope_and_splits_entries() {
  let s = store().await;

  let bundle = json!({
    "resourceType": "Bundle",
    "type": "collection",
    "entry": [
      {
        "fullUrl": "urn:uuid:vs-1",
        "resource": {"resourceType": "ValueSet", "url": "http://x/vs1"},
      },
      {
        "resource": {"resourceType": "CodeSystem", "id": "cs-1"},
      },
      {
        "request": {"method": "GET"},
      },
    ],
  })
  .to_string();

  let mut opts = options("bundle-a");
  opts.source_kind = SourceKind::Bundle;
  let summary = ingest_bundle(&s, &opts, &bundle, Encoding::Json)
    .await
    .unwrap();
  assert_eq!(summary.documents_seen, 2);
  assert_eq!(summary.raw_appended, 2);
  assert_eq!(summary.new_identities, 2);

  let rows = s.raw_documents_of_run(summary.run_id).await.unwrap();
  assert_eq!(rows.len(), 2);
  assert!(rows.iter().all(|r| r.bundle_id.is_some()));
  assert_eq!(rows[0].full_url.as_deref(), Some("urn:uuid:vs-1"));
  assert!(rows[1].full_url.is_none());
}

#[tokio::test]
async fn non_bundle_envelope_fails_before_opening_a_run() {
  let s = store().await;

  let text = json!({"resourceType": "ValueSet", "id": "v"}).to_string();
  let err = ingest_bundle(&s, &options("r1"), &text, Encoding::Json)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Codec(_)));
  assert!(s.get_run(1).await.unwrap().is_none());
}

// ─── Export ──────────────────────────────────────────────────────────────────

async fn two_docs(s: &SqliteStore) -> (CuratedId, CuratedId) {
  ingest(
    s,
    &options("r1"),
    vec![
      doc_json(&json!({"resourceType": "ValueSet", "url": "http://x/a", "name": "a"})),
      doc_json(&json!({"resourceType": "ValueSet", "url": "http://x/b", "name": "b"})),
    ],
  )
  .await
  .unwrap();

  let a = s.find_curated_by_ident("http://x/a").await.unwrap().unwrap();
  let b = s.find_curated_by_ident("http://x/b").await.unwrap().unwrap();
  (a.curated_id, b.curated_id)
}

#[tokio::test]
async fn export_preserves_selection_order() {
  let s = store().await;
  let (a, b) = two_docs(&s).await;

  let exported = export_selected(&s, &[b, a], Encoding::Json).await.unwrap();
  let bundle: Value = serde_json::from_str(&exported).unwrap();
  let entries = bundle["entry"].as_array().unwrap();
  assert_eq!(entries.len(), 2);
  assert_eq!(entries[0]["resource"]["name"], json!("b"));
  assert_eq!(entries[1]["resource"]["name"], json!("a"));
}

#[tokio::test]
async fn export_is_all_or_nothing_on_unknown_id() {
  let s = store().await;
  let (a, _) = two_docs(&s).await;

  let err = export_selected(&s, &[a, 999], Encoding::Json)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::UnknownCuratedId(999)));
}

#[tokio::test]
async fn export_by_idents_resolves_display_identifiers() {
  let s = store().await;
  two_docs(&s).await;

  let exported =
    export_by_idents(&s, &["http://x/b".into()], Encoding::Json)
      .await
      .unwrap();
  let bundle: Value = serde_json::from_str(&exported).unwrap();
  assert_eq!(bundle["entry"][0]["resource"]["name"], json!("b"));

  let err = export_by_idents(&s, &["http://x/nope".into()], Encoding::Json)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::UnknownIdent(_)));
}

#[tokio::test]
async fn export_latest_returns_most_recently_seen() {
  let s = store().await;

  for name in ["a", "b", "c"] {
    ingest(
      &s,
      &options(name),
      vec![doc_json(
        &json!({"resourceType": "ValueSet", "url": format!("http://x/{name}"), "name": name}),
      )],
    )
    .await
    .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
  }

  let exported = export_latest(&s, 2, Encoding::Json).await.unwrap();
  let bundle: Value = serde_json::from_str(&exported).unwrap();
  let entries = bundle["entry"].as_array().unwrap();
  assert_eq!(entries.len(), 2);
  assert_eq!(entries[0]["resource"]["name"], json!("c"));
  assert_eq!(entries[1]["resource"]["name"], json!("b"));
}

#[tokio::test]
async fn export_xml_carries_namespace_and_entries() {
  let s = store().await;
  let (a, _) = two_docs(&s).await;

  let exported = export_selected(&s, &[a], Encoding::Xml).await.unwrap();
  assert!(exported.contains(r#"<Bundle xmlns="http://hl7.org/fhir">"#));
  assert!(exported.contains(r#"<url value="http://x/a"/>"#));
}

// ─── Abort path ──────────────────────────────────────────────────────────────

/// Delegates to a real store but injects failures: a per-call fault decision
/// for `resolve` (zero-based call index), and an optional fault on every
/// `record_bundle`. Stands in for lock contention and for the backend going
/// away mid-run.
struct FlakyStore {
  inner:         SqliteStore,
  resolve_calls: AtomicUsize,
  resolve_fault: fn(usize) -> Option<canonry_store_sqlite::Error>,
  bundle_fault:  bool,
}

impl FlakyStore {
  fn new(inner: SqliteStore) -> Self {
    Self {
      inner,
      resolve_calls: AtomicUsize::new(0),
      resolve_fault: |_| None,
      bundle_fault: false,
    }
  }

  /// A fatal, non-retryable failure.
  fn outage() -> canonry_store_sqlite::Error {
    canonry_store_sqlite::Error::DateParse("injected outage".into())
  }

  /// The busy-timeout failure SQLite surfaces under lock contention.
  fn busy() -> canonry_store_sqlite::Error {
    canonry_store_sqlite::Error::Database(tokio_rusqlite::Error::Rusqlite(
      rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
        Some("database is locked".into()),
      ),
    ))
  }
}

impl ArtifactStore for FlakyStore {
  type Error = canonry_store_sqlite::Error;

  async fn begin_run(&self, input: NewRun) -> Result<IngestRun, Self::Error> {
    self.inner.begin_run(input).await
  }

  async fn finish_run(
    &self,
    run_id: RunId,
    outcome: RunOutcome,
  ) -> Result<(), Self::Error> {
    self.inner.finish_run(run_id, outcome).await
  }

  async fn get_run(&self, run_id: RunId) -> Result<Option<IngestRun>, Self::Error> {
    self.inner.get_run(run_id).await
  }

  async fn record_bundle(
    &self,
    input: NewSourceBundle,
  ) -> Result<BundleId, Self::Error> {
    if self.bundle_fault {
      return Err(Self::outage());
    }
    self.inner.record_bundle(input).await
  }

  async fn append_raw(
    &self,
    input: NewRawDocument,
  ) -> Result<RawAppend, Self::Error> {
    self.inner.append_raw(input).await
  }

  async fn raw_documents_of_run(
    &self,
    run_id: RunId,
  ) -> Result<Vec<RawDocument>, Self::Error> {
    self.inner.raw_documents_of_run(run_id).await
  }

  async fn append_reference_edges(
    &self,
    run_id: RunId,
    from_raw_id: RawId,
    edges: Vec<ReferenceEdge>,
  ) -> Result<(), Self::Error> {
    self
      .inner
      .append_reference_edges(run_id, from_raw_id, edges)
      .await
  }

  async fn reference_edges_of_run(
    &self,
    run_id: RunId,
  ) -> Result<Vec<(RawId, ReferenceEdge)>, Self::Error> {
    self.inner.reference_edges_of_run(run_id).await
  }

  async fn resolve<'a>(
    &'a self,
    key: &'a IdentityKey,
    identity: &'a Identity,
    digest: &'a Digest,
    raw_id: RawId,
    run_id: RunId,
  ) -> Result<Resolution, Self::Error> {
    let call = self.resolve_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(err) = (self.resolve_fault)(call) {
      return Err(err);
    }
    self.inner.resolve(key, identity, digest, raw_id, run_id).await
  }

  async fn list_curated<'a>(
    &'a self,
    filter: &'a CuratedFilter,
  ) -> Result<Vec<CuratedResource>, Self::Error> {
    self.inner.list_curated(filter).await
  }

  async fn get_curated(
    &self,
    id: CuratedId,
  ) -> Result<Option<CuratedResource>, Self::Error> {
    self.inner.get_curated(id).await
  }

  async fn find_curated_by_ident(
    &self,
    ident: &str,
  ) -> Result<Option<CuratedResource>, Self::Error> {
    self.inner.find_curated_by_ident(ident).await
  }

  async fn variants_of(&self, id: CuratedId) -> Result<Vec<Variant>, Self::Error> {
    self.inner.variants_of(id).await
  }

  async fn latest_content_by_digest(
    &self,
    digest: &Digest,
  ) -> Result<Option<String>, Self::Error> {
    self.inner.latest_content_by_digest(digest).await
  }

  async fn digest_history(&self) -> Result<Vec<DigestHistoryRow>, Self::Error> {
    self.inner.digest_history().await
  }
}

#[tokio::test]
async fn store_failure_aborts_run_but_keeps_committed_progress() {
  let flaky = FlakyStore {
    resolve_fault: |call| (call >= 1).then(FlakyStore::outage),
    ..FlakyStore::new(store().await)
  };

  let batch = vec![
    doc_json(&json!({"resourceType": "ValueSet", "url": "http://x/a"})),
    doc_json(&json!({"resourceType": "ValueSet", "url": "http://x/b"})),
  ];
  let summary = ingest(&flaky, &options("r1"), batch).await.unwrap();

  assert_eq!(summary.outcome, RunOutcome::Aborted);
  assert_eq!(summary.new_identities, 1);

  // The first document stays committed, and the abort is on the record.
  let run = flaky.inner.get_run(summary.run_id).await.unwrap().unwrap();
  assert_eq!(run.outcome, Some(RunOutcome::Aborted));
  assert!(run.finished_ts.is_some());
  assert!(
    flaky
      .inner
      .find_curated_by_ident("http://x/a")
      .await
      .unwrap()
      .is_some()
  );
  assert!(
    flaky
      .inner
      .find_curated_by_ident("http://x/b")
      .await
      .unwrap()
      .is_none()
  );
}

#[tokio::test]
async fn transient_busy_failures_are_retried_to_completion() {
  let flaky = FlakyStore {
    resolve_fault: |call| (call < 2).then(FlakyStore::busy),
    ..FlakyStore::new(store().await)
  };

  let batch =
    vec![doc_json(&json!({"resourceType": "ValueSet", "url": "http://x/a"}))];
  let summary = ingest(&flaky, &options("r1"), batch).await.unwrap();

  assert_eq!(summary.outcome, RunOutcome::Finished);
  assert_eq!(summary.new_identities, 1);
  assert_eq!(flaky.resolve_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn persistent_busy_failures_exhaust_retries_and_abort() {
  let flaky = FlakyStore {
    resolve_fault: |_| Some(FlakyStore::busy()),
    ..FlakyStore::new(store().await)
  };

  let mut opts = options("r1");
  opts.max_busy_retries = 2;
  let batch =
    vec![doc_json(&json!({"resourceType": "ValueSet", "url": "http://x/a"}))];
  let summary = ingest(&flaky, &opts, batch).await.unwrap();

  assert_eq!(summary.outcome, RunOutcome::Aborted);
  assert_eq!(flaky.resolve_calls.load(Ordering::SeqCst), 3);

  // The raw append committed before the contested resolve; the run closed.
  let run = flaky.inner.get_run(summary.run_id).await.unwrap().unwrap();
  assert_eq!(run.outcome, Some(RunOutcome::Aborted));
  let rows = flaky.inner.raw_documents_of_run(summary.run_id).await.unwrap();
  assert_eq!(rows.len(), 1);
  let all = flaky.inner.list_curated(&CuratedFilter::default()).await.unwrap();
  assert!(all.is_empty());
}

#[tokio::test]
async fn bundle_envelope_failure_closes_the_run_as_aborted() {
  let flaky = FlakyStore {
    bundle_fault: true,
    ..FlakyStore::new(store().await)
  };

  let bundle = json!({
    "resourceType": "Bundle",
    "type": "collection",
    "entry": [
      {"resource": {"resourceType": "ValueSet", "url": "http://x/vs1"}},
    ],
  })
  .to_string();

  let mut opts = options("bundle-a");
  opts.source_kind = SourceKind::Bundle;
  let summary = ingest_bundle(&flaky, &opts, &bundle, Encoding::Json)
    .await
    .unwrap();

  assert_eq!(summary.outcome, RunOutcome::Aborted);
  assert_eq!(summary.documents_seen, 0);

  let run = flaky.inner.get_run(summary.run_id).await.unwrap().unwrap();
  assert_eq!(run.outcome, Some(RunOutcome::Aborted));
  assert!(run.finished_ts.is_some());
}
