//! Query parameters for the curated read path.

use serde::{Deserialize, Serialize};

/// Sort order for curated listings.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
  #[default]
  LastSeenDesc,
  LastSeenAsc,
}

/// Parameters for [`crate::store::ArtifactStore::list_curated`].
///
/// All filters compose with AND semantics; an absent filter means no
/// restriction. Results are deterministic: ties on the sort key break by
/// curated id ascending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CuratedFilter {
  /// Exact resource type match.
  pub resource_type:  Option<String>,
  /// Case-insensitive substring over canonical URL and logical id.
  pub text:           Option<String>,
  /// Only identities whose conflict flag is set.
  pub conflicts_only: bool,
  pub sort:           SortOrder,
  /// Result-count cap for responsiveness. `None` means unlimited.
  pub limit:          Option<usize>,
}
