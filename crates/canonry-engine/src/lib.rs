//! The Canonry ingest controller and bundle exporter.
//!
//! Generic over any [`ArtifactStore`](canonry_core::store::ArtifactStore):
//! the controller drives one import end to end (decode, identity, digest,
//! raw append, curated resolve, reference edges) with per-document failure
//! recovery, and the exporter reassembles document collections from curated
//! selections.

mod export;
mod ingest;

pub mod error;

pub use error::{Error, Result};
pub use export::{export_by_idents, export_latest, export_selected};
pub use ingest::{
  DigestPolicy, IncomingDocument, IngestOptions, RunSummary, SkipReason,
  Skipped, ingest, ingest_bundle,
};

#[cfg(test)]
mod tests;
