//! Identity extraction — deriving the addressable identity of a document
//! from its structured content.
//!
//! Conformance documents carry up to two identities: a canonical URL plus
//! artefact version (preferred), and a logical id. The curated layer groups
//! raw content under whichever is available; a document with neither cannot
//! be resolved and is rejected by the ingest controller.

use serde::{Deserialize, Serialize};

use crate::document::Document;

// ─── Identity ────────────────────────────────────────────────────────────────

/// The identity fields extracted from one document, plus the embedded
/// metadata the raw store records verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  pub resource_type:     String,
  pub logical_id:        Option<String>,
  pub canonical_url:     Option<String>,
  pub artefact_version:  Option<String>,
  /// `meta.versionId` as found in the document, uninterpreted.
  pub meta_version_id:   Option<String>,
  /// `meta.lastUpdated` as found in the document, uninterpreted.
  pub meta_last_updated: Option<String>,
}

impl Identity {
  /// Derive an identity from a canonical document.
  ///
  /// Infallible: a [`Document`] always has a resource type, and every other
  /// field is optional. Whether the identity is *usable* is decided by
  /// [`Identity::key`].
  pub fn extract(doc: &Document) -> Self {
    Self {
      resource_type:     doc.resource_type().to_owned(),
      logical_id:        doc.str_field("id").map(str::to_owned),
      canonical_url:     doc.str_field("url").map(str::to_owned),
      artefact_version:  doc.str_field("version").map(str::to_owned),
      meta_version_id:   doc
        .nested_str_field("meta", "versionId")
        .map(str::to_owned),
      meta_last_updated: doc
        .nested_str_field("meta", "lastUpdated")
        .map(str::to_owned),
    }
  }

  /// The key that groups raw content under one curated record.
  ///
  /// Prefers (type, canonical url, version) when a canonical URL is present,
  /// else (type, logical id). `None` when the document carries neither —
  /// the caller must reject it rather than store something unresolvable.
  pub fn key(&self, partition_key: Option<&str>) -> Option<IdentityKey> {
    let partition = partition_key.unwrap_or("").to_owned();

    if let Some(url) = &self.canonical_url {
      return Some(IdentityKey::Canonical {
        resource_type:    self.resource_type.clone(),
        canonical_url:    url.clone(),
        artefact_version: self.artefact_version.clone().unwrap_or_default(),
        partition_key:    partition,
      });
    }

    self.logical_id.as_ref().map(|id| IdentityKey::Logical {
      resource_type: self.resource_type.clone(),
      logical_id:    id.clone(),
      partition_key: partition,
    })
  }

  /// The identifier shown to curators: canonical URL, else logical id.
  pub fn display_ident(&self) -> Option<&str> {
    self
      .canonical_url
      .as_deref()
      .or(self.logical_id.as_deref())
  }
}

// ─── Identity key ────────────────────────────────────────────────────────────

/// The lookup key for a curated record. Absent versions and partitions
/// normalise to the empty string so lookups are total.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
  Canonical {
    resource_type:    String,
    canonical_url:    String,
    artefact_version: String,
    partition_key:    String,
  },
  Logical {
    resource_type: String,
    logical_id:    String,
    partition_key: String,
  },
}

impl IdentityKey {
  pub fn resource_type(&self) -> &str {
    match self {
      Self::Canonical { resource_type, .. }
      | Self::Logical { resource_type, .. } => resource_type,
    }
  }
}
