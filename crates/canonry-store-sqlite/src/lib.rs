//! SQLite backend for the Canonry artefact store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every resolver call is one immediate
//! transaction; lock contention waits up to the configured busy timeout and
//! then surfaces as a retryable busy error.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
