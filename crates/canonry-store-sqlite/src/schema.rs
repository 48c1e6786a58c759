//! SQL schema for the Canonry SQLite store.
//!
//! Applied once at connection startup; idempotent thanks to
//! `CREATE ... IF NOT EXISTS`. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS ingest_runs (
    run_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    started_ts    TEXT NOT NULL,
    finished_ts   TEXT,
    outcome       TEXT,              -- 'finished' | 'aborted'
    source_name   TEXT NOT NULL,
    source_kind   TEXT NOT NULL,     -- 'bundle' | 'package'
    schema_major  TEXT NOT NULL,
    partition_key TEXT
);

-- The whole envelope a bundle run was fed, stored once for provenance.
CREATE TABLE IF NOT EXISTS source_bundles (
    bundle_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id      INTEGER NOT NULL REFERENCES ingest_runs(run_id) ON DELETE CASCADE,
    bundle_type TEXT,
    sha256      TEXT NOT NULL,
    content     TEXT NOT NULL
);

-- Raw documents are strictly append-only: no UPDATE is ever issued, and
-- rows only disappear through a run cascade. The same run never stores the
-- same bytes twice; different runs may.
CREATE TABLE IF NOT EXISTS raw_documents (
    raw_id            INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id            INTEGER NOT NULL REFERENCES ingest_runs(run_id) ON DELETE CASCADE,
    bundle_id         INTEGER REFERENCES source_bundles(bundle_id),
    full_url          TEXT,
    resource_type     TEXT NOT NULL,
    logical_id        TEXT,
    canonical_url     TEXT,
    artefact_version  TEXT,
    meta_version_id   TEXT,
    meta_last_updated TEXT,
    sha256            TEXT NOT NULL,
    content           TEXT NOT NULL,   -- canonical JSON text
    first_seen_ts     TEXT NOT NULL,
    UNIQUE (run_id, sha256)
);

-- One row per identity key. Never deleted during normal operation.
CREATE TABLE IF NOT EXISTS curated_resources (
    curated_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    resource_type    TEXT NOT NULL,
    logical_id       TEXT,
    canonical_url    TEXT,
    artefact_version TEXT,
    partition_key    TEXT,
    current_sha256   TEXT NOT NULL,
    has_conflict     INTEGER NOT NULL DEFAULT 0,
    first_seen_ts    TEXT NOT NULL,
    last_seen_ts     TEXT NOT NULL,
    CHECK (canonical_url IS NOT NULL OR logical_id IS NOT NULL)
);

CREATE UNIQUE INDEX IF NOT EXISTS curated_canonical_key
    ON curated_resources (resource_type, canonical_url,
                          IFNULL(artefact_version, ''), IFNULL(partition_key, ''))
    WHERE canonical_url IS NOT NULL;

CREATE UNIQUE INDEX IF NOT EXISTS curated_logical_key
    ON curated_resources (resource_type, logical_id, IFNULL(partition_key, ''))
    WHERE canonical_url IS NULL;

-- One row per distinct byte-content ever seen under a curated identity.
CREATE TABLE IF NOT EXISTS curated_variants (
    curated_id        INTEGER NOT NULL REFERENCES curated_resources(curated_id),
    sha256            TEXT NOT NULL,
    occurrences       INTEGER NOT NULL DEFAULT 1,
    first_seen_run_id INTEGER NOT NULL REFERENCES ingest_runs(run_id),
    last_seen_run_id  INTEGER NOT NULL REFERENCES ingest_runs(run_id),
    note              TEXT,
    PRIMARY KEY (curated_id, sha256)
);

CREATE TABLE IF NOT EXISTS raw_to_curated (
    raw_id     INTEGER PRIMARY KEY REFERENCES raw_documents(raw_id) ON DELETE CASCADE,
    curated_id INTEGER NOT NULL REFERENCES curated_resources(curated_id),
    linked_ts  TEXT NOT NULL
);

-- Observational only: no dedupe, never resolved.
CREATE TABLE IF NOT EXISTS reference_edges (
    edge_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id       INTEGER NOT NULL REFERENCES ingest_runs(run_id) ON DELETE CASCADE,
    from_raw_id  INTEGER NOT NULL REFERENCES raw_documents(raw_id) ON DELETE CASCADE,
    from_path    TEXT NOT NULL,
    to_reference TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS raw_sha_idx          ON raw_documents(sha256);
CREATE INDEX IF NOT EXISTS raw_run_idx          ON raw_documents(run_id);
CREATE INDEX IF NOT EXISTS curated_type_idx     ON curated_resources(resource_type);
CREATE INDEX IF NOT EXISTS curated_seen_idx     ON curated_resources(last_seen_ts);
CREATE INDEX IF NOT EXISTS edges_raw_idx        ON reference_edges(from_raw_id);

-- Distinct digests per canonical identity across all raw history —
-- conflict spotting independent of curated state.
CREATE VIEW IF NOT EXISTS canonical_digest_history AS
    SELECT resource_type,
           canonical_url,
           artefact_version,
           COUNT(DISTINCT sha256) AS distinct_digests
      FROM raw_documents
     WHERE canonical_url IS NOT NULL
  GROUP BY resource_type, canonical_url, artefact_version;

PRAGMA user_version = 1;
";
