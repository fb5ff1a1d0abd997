//! The `CatalogSource` trait: anything that can deliver a collection's raw
//! objects (the TAXII client in production, fakes in tests).

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::CatalogDomain;

/// The complete, unpaginated contents of one collection fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionFetch {
  pub collection_id: String,
  /// Records in first-seen order across all pages.
  pub objects:       Vec<serde_json::Value>,
  pub pages:         usize,
}

pub trait CatalogSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Fetch every object of `domain`'s collection, following continuation
  /// cursors until exhausted.
  ///
  /// With `added_after` set only objects added after that watermark are
  /// requested; `None` requests the full collection. Either the whole fetch
  /// succeeds or nothing is returned.
  fn fetch_collection_objects(
    &self,
    domain: CatalogDomain,
    added_after: Option<String>,
  ) -> impl Future<Output = Result<CollectionFetch, Self::Error>> + Send + '_;
}
