//! The bundle exporter.
//!
//! Reassembles a collection bundle from curated selections. The content
//! exported for each identity is its `current_sha256` variant — the most
//! recently seen one; other variants stay retrievable from the raw store
//! but are not what export hands out.

use canonry_codec::{Encoding, bundle::assemble_collection, encode};
use canonry_core::{
  curated::{CuratedId, CuratedResource},
  query::CuratedFilter,
  store::ArtifactStore,
};
use serde_json::Value;
use tracing::info;

use crate::{Error, Result};

/// Export the documents for `curated_ids`, preserving selection order.
///
/// All-or-nothing: an unknown id fails the whole request and nothing is
/// produced.
pub async fn export_selected<S: ArtifactStore>(
  store: &S,
  curated_ids: &[CuratedId],
  encoding: Encoding,
) -> Result<String> {
  let mut records = Vec::with_capacity(curated_ids.len());
  for &id in curated_ids {
    let record = store
      .get_curated(id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::UnknownCuratedId(id))?;
    records.push(record);
  }

  assemble(store, records, encoding).await
}

/// Export by display identifier (canonical URL, else logical id), as a
/// selection front-end hands them over. All-or-nothing like
/// [`export_selected`].
pub async fn export_by_idents<S: ArtifactStore>(
  store: &S,
  idents: &[String],
  encoding: Encoding,
) -> Result<String> {
  let mut records = Vec::with_capacity(idents.len());
  for ident in idents {
    let record = store
      .find_curated_by_ident(ident)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::UnknownIdent(ident.clone()))?;
    records.push(record);
  }

  assemble(store, records, encoding).await
}

/// Export the `limit` most recently seen curated records.
pub async fn export_latest<S: ArtifactStore>(
  store: &S,
  limit: usize,
  encoding: Encoding,
) -> Result<String> {
  let filter = CuratedFilter {
    limit: Some(limit),
    ..Default::default()
  };
  let records = store.list_curated(&filter).await.map_err(Error::store)?;

  assemble(store, records, encoding).await
}

async fn assemble<S: ArtifactStore>(
  store: &S,
  records: Vec<CuratedResource>,
  encoding: Encoding,
) -> Result<String> {
  let mut resources: Vec<Value> = Vec::with_capacity(records.len());
  for record in &records {
    let content = store
      .latest_content_by_digest(&record.current_sha256)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::MissingContent(record.current_sha256.clone()))?;
    resources.push(serde_json::from_str(&content)?);
  }

  info!(documents = resources.len(), "assembled export collection");
  Ok(encode(&assemble_collection(resources), encoding)?)
}
