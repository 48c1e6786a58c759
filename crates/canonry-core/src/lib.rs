//! Core types and trait definitions for the Canonry artefact repository.
//!
//! Canonry ingests batches of machine-readable conformance documents,
//! preserves every byte ever seen in an immutable raw store, deduplicates
//! identical content per logical identity, and surfaces conflicting content
//! explicitly instead of letting a later import silently win.
//!
//! This crate is deliberately free of database and wire-format dependencies;
//! every other crate in the workspace depends on it.

pub mod curated;
pub mod digest;
pub mod document;
pub mod error;
pub mod identity;
pub mod query;
pub mod raw;
pub mod run;
pub mod store;

pub use error::{Error, Result};
