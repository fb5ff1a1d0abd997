//! Per-domain synchronisation state.
//!
//! One row per [`CatalogDomain`]. Written only by the orchestrator, at the end
//! of every run, success or failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CatalogDomain;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
  pub domain:                     CatalogDomain,
  pub last_successful_sync_at:    Option<DateTime<Utc>>,
  /// Opaque `added_after` value for the next delta run.
  pub last_added_after_watermark: Option<String>,
  pub last_full_sync_at:          Option<DateTime<Utc>>,
  /// Message of the most recent failure; cleared by the next success.
  pub last_error:                 Option<String>,
  pub updated_at:                 DateTime<Utc>,
}

impl SyncState {
  /// A domain is delta-ready once a full sync has completed and left a
  /// watermark behind.
  pub fn is_delta_ready(&self) -> bool {
    self.last_full_sync_at.is_some() && self.last_added_after_watermark.is_some()
  }
}

/// What a successful run hands to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSuccess {
  pub completed_at: DateTime<Utc>,
  pub watermark:    String,
  /// Stamp `last_full_sync_at` with `completed_at`.
  pub full_sync:    bool,
}
