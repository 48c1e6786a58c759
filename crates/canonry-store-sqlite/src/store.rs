//! [`SqliteStore`] — the SQLite implementation of [`ArtifactStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, TransactionBehavior};

use canonry_core::{
  curated::{CuratedId, CuratedResource, DigestHistoryRow, Resolution, Variant},
  digest::Digest,
  identity::{Identity, IdentityKey},
  query::{CuratedFilter, SortOrder},
  raw::{
    BundleId, NewRawDocument, NewSourceBundle, RawAppend, RawDocument, RawId,
    ReferenceEdge,
  },
  run::{IngestRun, NewRun, RunId, RunOutcome},
  store::ArtifactStore,
};

use crate::{
  encode::{
    encode_dt, encode_outcome, encode_source_kind, RawCuratedRow,
    RawDocumentRow, RawRunRow, RawVariantRow,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Canonry artefact store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. All writes
/// funnel through one connection thread, so resolver transactions for the
/// same identity serialise instead of deadlocking.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

const CURATED_COLUMNS: &str = "curated_id, resource_type, logical_id, \
   canonical_url, artefact_version, partition_key, current_sha256, \
   has_conflict, first_seen_ts, last_seen_ts";

fn curated_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawCuratedRow> {
  Ok(RawCuratedRow {
    curated_id:       row.get(0)?,
    resource_type:    row.get(1)?,
    logical_id:       row.get(2)?,
    canonical_url:    row.get(3)?,
    artefact_version: row.get(4)?,
    partition_key:    row.get(5)?,
    current_sha256:   row.get(6)?,
    has_conflict:     row.get(7)?,
    first_seen_ts:    row.get(8)?,
    last_seen_ts:     row.get(9)?,
  })
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── ArtifactStore impl ──────────────────────────────────────────────────────

impl ArtifactStore for SqliteStore {
  type Error = Error;

  // ── Runs ──────────────────────────────────────────────────────────────────

  async fn begin_run(&self, input: NewRun) -> Result<IngestRun> {
    let started = Utc::now();
    let started_str = encode_dt(started);
    let source_name = input.source_name.clone();
    let kind_str = encode_source_kind(input.source_kind).to_owned();
    let schema_major = input.schema_major.clone();
    let partition_key = input.partition_key.clone();

    let run_id: i64 = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO ingest_runs
             (started_ts, source_name, source_kind, schema_major, partition_key)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![
            started_str,
            source_name,
            kind_str,
            schema_major,
            partition_key,
          ],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(IngestRun {
      run_id,
      started_ts: started,
      finished_ts: None,
      outcome: None,
      source_name: input.source_name,
      source_kind: input.source_kind,
      schema_major: input.schema_major,
      partition_key: input.partition_key,
    })
  }

  async fn finish_run(&self, run_id: RunId, outcome: RunOutcome) -> Result<()> {
    let finished_str = encode_dt(Utc::now());
    let outcome_str = encode_outcome(outcome).to_owned();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE ingest_runs SET finished_ts = ?1, outcome = ?2
           WHERE run_id = ?3",
          rusqlite::params![finished_str, outcome_str, run_id],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_run(&self, run_id: RunId) -> Result<Option<IngestRun>> {
    let raw: Option<RawRunRow> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT run_id, started_ts, finished_ts, outcome,
                      source_name, source_kind, schema_major, partition_key
               FROM ingest_runs WHERE run_id = ?1",
              rusqlite::params![run_id],
              |row| {
                Ok(RawRunRow {
                  run_id:        row.get(0)?,
                  started_ts:    row.get(1)?,
                  finished_ts:   row.get(2)?,
                  outcome:       row.get(3)?,
                  source_name:   row.get(4)?,
                  source_kind:   row.get(5)?,
                  schema_major:  row.get(6)?,
                  partition_key: row.get(7)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRunRow::into_run).transpose()
  }

  // ── Raw store — append-only writes ────────────────────────────────────────

  async fn record_bundle(&self, input: NewSourceBundle) -> Result<BundleId> {
    let sha = input.sha256.into_hex();

    let bundle_id: i64 = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO source_bundles (run_id, bundle_type, sha256, content)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![input.run_id, input.bundle_type, sha, input.content],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(bundle_id)
  }

  async fn append_raw(&self, input: NewRawDocument) -> Result<RawAppend> {
    let now_str = encode_dt(Utc::now());
    let sha = input.sha256.into_hex();

    let append: RawAppend = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<i64> = tx
          .query_row(
            "SELECT raw_id FROM raw_documents WHERE run_id = ?1 AND sha256 = ?2",
            rusqlite::params![input.run_id, sha],
            |row| row.get(0),
          )
          .optional()?;

        if let Some(raw_id) = existing {
          tx.commit()?;
          return Ok(RawAppend { raw_id, created: false });
        }

        tx.execute(
          "INSERT INTO raw_documents
             (run_id, bundle_id, full_url, resource_type, logical_id,
              canonical_url, artefact_version, meta_version_id,
              meta_last_updated, sha256, content, first_seen_ts)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
          rusqlite::params![
            input.run_id,
            input.bundle_id,
            input.full_url,
            input.identity.resource_type,
            input.identity.logical_id,
            input.identity.canonical_url,
            input.identity.artefact_version,
            input.identity.meta_version_id,
            input.identity.meta_last_updated,
            sha,
            input.content,
            now_str,
          ],
        )?;
        let raw_id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(RawAppend { raw_id, created: true })
      })
      .await?;

    Ok(append)
  }

  async fn raw_documents_of_run(&self, run_id: RunId) -> Result<Vec<RawDocument>> {
    let raws: Vec<RawDocumentRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT raw_id, run_id, bundle_id, full_url, resource_type,
                  logical_id, canonical_url, artefact_version, meta_version_id,
                  meta_last_updated, sha256, content, first_seen_ts
           FROM raw_documents
           WHERE run_id = ?1
           ORDER BY raw_id ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![run_id], |row| {
            Ok(RawDocumentRow {
              raw_id:            row.get(0)?,
              run_id:            row.get(1)?,
              bundle_id:         row.get(2)?,
              full_url:          row.get(3)?,
              resource_type:     row.get(4)?,
              logical_id:        row.get(5)?,
              canonical_url:     row.get(6)?,
              artefact_version:  row.get(7)?,
              meta_version_id:   row.get(8)?,
              meta_last_updated: row.get(9)?,
              sha256:            row.get(10)?,
              content:           row.get(11)?,
              first_seen_ts:     row.get(12)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawDocumentRow::into_document)
      .collect()
  }

  async fn append_reference_edges(
    &self,
    run_id: RunId,
    from_raw_id: RawId,
    edges: Vec<ReferenceEdge>,
  ) -> Result<()> {
    if edges.is_empty() {
      return Ok(());
    }

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO reference_edges (run_id, from_raw_id, from_path, to_reference)
             VALUES (?1, ?2, ?3, ?4)",
          )?;
          for edge in &edges {
            stmt.execute(rusqlite::params![
              run_id,
              from_raw_id,
              edge.from_path,
              edge.to_reference,
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn reference_edges_of_run(
    &self,
    run_id: RunId,
  ) -> Result<Vec<(RawId, ReferenceEdge)>> {
    let rows: Vec<(RawId, ReferenceEdge)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT from_raw_id, from_path, to_reference
           FROM reference_edges
           WHERE run_id = ?1
           ORDER BY edge_id ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![run_id], |row| {
            Ok((
              row.get(0)?,
              ReferenceEdge {
                from_path:    row.get(1)?,
                to_reference: row.get(2)?,
              },
            ))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(rows)
  }

  // ── Curated resolver ──────────────────────────────────────────────────────

  async fn resolve<'a>(
    &'a self,
    key: &'a IdentityKey,
    identity: &'a Identity,
    digest: &'a Digest,
    raw_id: RawId,
    run_id: RunId,
  ) -> Result<Resolution> {
    let key = key.clone();
    let identity = identity.clone();
    let sha = digest.as_hex().to_owned();
    let now_str = encode_dt(Utc::now());

    let resolution: Resolution = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<(i64, bool)> = match &key {
          IdentityKey::Canonical {
            resource_type,
            canonical_url,
            artefact_version,
            partition_key,
          } => tx
            .query_row(
              "SELECT curated_id, has_conflict FROM curated_resources
               WHERE resource_type = ?1
                 AND canonical_url = ?2
                 AND IFNULL(artefact_version, '') = ?3
                 AND IFNULL(partition_key, '') = ?4",
              rusqlite::params![
                resource_type,
                canonical_url,
                artefact_version,
                partition_key,
              ],
              |row| Ok((row.get(0)?, row.get::<_, i64>(1)? != 0)),
            )
            .optional()?,
          IdentityKey::Logical { resource_type, logical_id, partition_key } => {
            tx.query_row(
              "SELECT curated_id, has_conflict FROM curated_resources
               WHERE resource_type = ?1
                 AND canonical_url IS NULL
                 AND logical_id = ?2
                 AND IFNULL(partition_key, '') = ?3",
              rusqlite::params![resource_type, logical_id, partition_key],
              |row| Ok((row.get(0)?, row.get::<_, i64>(1)? != 0)),
            )
            .optional()?
          }
        };

        let resolution = match existing {
          Some((curated_id, had_conflict)) => {
            let touched = tx.execute(
              "UPDATE curated_variants
               SET occurrences = occurrences + 1, last_seen_run_id = ?1
               WHERE curated_id = ?2 AND sha256 = ?3",
              rusqlite::params![run_id, curated_id, sha],
            )?;
            let new_variant = touched == 0;
            if new_variant {
              tx.execute(
                "INSERT INTO curated_variants
                   (curated_id, sha256, occurrences, first_seen_run_id,
                    last_seen_run_id)
                 VALUES (?1, ?2, 1, ?3, ?3)",
                rusqlite::params![curated_id, sha, run_id],
              )?;
            }

            // A second distinct variant sets the flag; nothing clears it.
            let conflict = had_conflict || new_variant;
            tx.execute(
              "UPDATE curated_resources
               SET current_sha256 = ?1, has_conflict = ?2, last_seen_ts = ?3
               WHERE curated_id = ?4",
              rusqlite::params![sha, conflict, now_str, curated_id],
            )?;

            Resolution {
              curated_id,
              new_identity: false,
              new_variant,
              conflict,
              conflict_raised: new_variant && !had_conflict,
            }
          }
          None => {
            let partition = match &key {
              IdentityKey::Canonical { partition_key, .. }
              | IdentityKey::Logical { partition_key, .. } => {
                (!partition_key.is_empty()).then(|| partition_key.clone())
              }
            };
            let canonical_url = match &key {
              IdentityKey::Canonical { canonical_url, .. } => {
                Some(canonical_url.clone())
              }
              IdentityKey::Logical { .. } => None,
            };

            tx.execute(
              "INSERT INTO curated_resources
                 (resource_type, logical_id, canonical_url, artefact_version,
                  partition_key, current_sha256, has_conflict,
                  first_seen_ts, last_seen_ts)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)",
              rusqlite::params![
                identity.resource_type,
                identity.logical_id,
                canonical_url,
                identity.artefact_version,
                partition,
                sha,
                now_str,
              ],
            )?;
            let curated_id = tx.last_insert_rowid();

            tx.execute(
              "INSERT INTO curated_variants
                 (curated_id, sha256, occurrences, first_seen_run_id,
                  last_seen_run_id)
               VALUES (?1, ?2, 1, ?3, ?3)",
              rusqlite::params![curated_id, sha, run_id],
            )?;

            Resolution {
              curated_id,
              new_identity: true,
              new_variant: true,
              conflict: false,
              conflict_raised: false,
            }
          }
        };

        tx.execute(
          "INSERT OR REPLACE INTO raw_to_curated (raw_id, curated_id, linked_ts)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![raw_id, resolution.curated_id, now_str],
        )?;

        tx.commit()?;
        Ok(resolution)
      })
      .await?;

    Ok(resolution)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn list_curated<'a>(
    &'a self,
    filter: &'a CuratedFilter,
  ) -> Result<Vec<CuratedResource>> {
    let type_filter = filter.resource_type.clone();
    let text_pattern = filter
      .text
      .as_deref()
      .map(|t| format!("%{}%", t.to_lowercase()));
    let conflicts_only = filter.conflicts_only;
    let order = match filter.sort {
      SortOrder::LastSeenDesc => "last_seen_ts DESC",
      SortOrder::LastSeenAsc => "last_seen_ts ASC",
    };
    // -1 disables the LIMIT clause.
    let limit_val = filter.limit.map(|n| n as i64).unwrap_or(-1);

    let raws: Vec<RawCuratedRow> = self
      .conn
      .call(move |conn| {
        let mut conds: Vec<&'static str> = vec![];
        if type_filter.is_some() {
          conds.push("resource_type = ?1");
        }
        if text_pattern.is_some() {
          conds.push(
            "(lower(IFNULL(canonical_url, '')) LIKE ?2
              OR lower(IFNULL(logical_id, '')) LIKE ?2)",
          );
        }
        if conflicts_only {
          conds.push("has_conflict = 1");
        }

        let where_clause = if conds.is_empty() {
          String::new()
        } else {
          format!("WHERE {}", conds.join(" AND "))
        };

        // Ties on the sort key break by curated id so repeated queries over
        // unchanged state return identical orderings.
        let sql = format!(
          "SELECT {CURATED_COLUMNS} FROM curated_resources
           {where_clause}
           ORDER BY {order}, curated_id ASC
           LIMIT ?3"
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![
              type_filter.as_deref(),
              text_pattern.as_deref(),
              limit_val,
            ],
            curated_from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCuratedRow::into_curated).collect()
  }

  async fn get_curated(&self, id: CuratedId) -> Result<Option<CuratedResource>> {
    let raw: Option<RawCuratedRow> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {CURATED_COLUMNS} FROM curated_resources
                 WHERE curated_id = ?1"
              ),
              rusqlite::params![id],
              curated_from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawCuratedRow::into_curated).transpose()
  }

  async fn find_curated_by_ident(
    &self,
    ident: &str,
  ) -> Result<Option<CuratedResource>> {
    let ident = ident.to_owned();

    let raw: Option<RawCuratedRow> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {CURATED_COLUMNS} FROM curated_resources
                 WHERE canonical_url = ?1
                    OR (canonical_url IS NULL AND logical_id = ?1)
                 ORDER BY curated_id ASC
                 LIMIT 1"
              ),
              rusqlite::params![ident],
              curated_from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawCuratedRow::into_curated).transpose()
  }

  async fn variants_of(&self, id: CuratedId) -> Result<Vec<Variant>> {
    let raws: Vec<RawVariantRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT curated_id, sha256, occurrences, first_seen_run_id,
                  last_seen_run_id, note
           FROM curated_variants
           WHERE curated_id = ?1
           ORDER BY occurrences DESC, sha256 ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id], |row| {
            Ok(RawVariantRow {
              curated_id:        row.get(0)?,
              sha256:            row.get(1)?,
              occurrences:       row.get(2)?,
              first_seen_run_id: row.get(3)?,
              last_seen_run_id:  row.get(4)?,
              note:              row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(raws.into_iter().map(RawVariantRow::into_variant).collect())
  }

  async fn latest_content_by_digest(
    &self,
    digest: &Digest,
  ) -> Result<Option<String>> {
    let sha = digest.as_hex().to_owned();

    let content: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT content FROM raw_documents
               WHERE sha256 = ?1
               ORDER BY first_seen_ts DESC, raw_id DESC
               LIMIT 1",
              rusqlite::params![sha],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    Ok(content)
  }

  async fn digest_history(&self) -> Result<Vec<DigestHistoryRow>> {
    let rows: Vec<DigestHistoryRow> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT resource_type, canonical_url, artefact_version, distinct_digests
           FROM canonical_digest_history
           ORDER BY resource_type ASC, canonical_url ASC,
                    IFNULL(artefact_version, '') ASC",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(DigestHistoryRow {
              resource_type:    row.get(0)?,
              canonical_url:    row.get(1)?,
              artefact_version: row.get(2)?,
              distinct_digests: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(rows)
  }
}
