//! The `CatalogStore` trait.
//!
//! Implemented by storage backends (e.g. `attack-store-sqlite`). The
//! orchestrator depends on this abstraction, not on any concrete backend.

use std::future::Future;

use crate::{
  CatalogDomain,
  catalog::{
    CatalogCounts, DataComponent, DataSource, NormalizedBundle, Technique, TechniqueLink,
    TechniqueTactic, UpsertReport,
  },
  relationship::TechniqueEdge,
  sync_state::{SyncState, SyncSuccess},
};

/// Abstraction over a catalog store backend.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes.
pub trait CatalogStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Merge a normalised bundle into storage in a single transaction.
  ///
  /// Typed rows are upserted on `(domain, object_id)` with last-writer-wins
  /// semantics. The derived technique joins of the bundle's domain are then
  /// deleted and rebuilt: from the bundle alone when it is a full sync,
  /// otherwise from all stored relationships and phase tags of the domain.
  /// An empty bundle is a no-op. On any error nothing is written.
  fn upsert_attack_data(
    &self,
    bundle: NormalizedBundle,
  ) -> impl Future<Output = Result<UpsertReport, Self::Error>> + Send + '_;

  // ── Sync state ────────────────────────────────────────────────────────

  fn get_sync_state(
    &self,
    domain: CatalogDomain,
  ) -> impl Future<Output = Result<Option<SyncState>, Self::Error>> + Send + '_;

  fn list_sync_states(
    &self,
  ) -> impl Future<Output = Result<Vec<SyncState>, Self::Error>> + Send + '_;

  /// Advance the watermark, clear `last_error`, and stamp the success times.
  fn record_sync_success(
    &self,
    domain: CatalogDomain,
    success: SyncSuccess,
  ) -> impl Future<Output = Result<SyncState, Self::Error>> + Send + '_;

  /// Store `message` as `last_error`, leaving the watermark untouched.
  fn record_sync_failure(
    &self,
    domain: CatalogDomain,
    message: String,
  ) -> impl Future<Output = Result<SyncState, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn catalog_counts(
    &self,
    domain: CatalogDomain,
  ) -> impl Future<Output = Result<CatalogCounts, Self::Error>> + Send + '_;

  /// All techniques of `domain`, ordered by short code.
  fn list_techniques(
    &self,
    domain: CatalogDomain,
  ) -> impl Future<Output = Result<Vec<Technique>, Self::Error>> + Send + '_;

  fn list_data_sources(
    &self,
    domain: CatalogDomain,
  ) -> impl Future<Output = Result<Vec<DataSource>, Self::Error>> + Send + '_;

  /// All data components of `domain`, each with its owning data source ref.
  fn list_data_components(
    &self,
    domain: CatalogDomain,
  ) -> impl Future<Output = Result<Vec<DataComponent>, Self::Error>> + Send + '_;

  /// Rows of one derived relationship join, ordered.
  fn technique_links(
    &self,
    domain: CatalogDomain,
    edge: TechniqueEdge,
  ) -> impl Future<Output = Result<Vec<TechniqueLink>, Self::Error>> + Send + '_;

  /// Rows of the technique–tactic membership join, ordered.
  fn technique_tactics(
    &self,
    domain: CatalogDomain,
  ) -> impl Future<Output = Result<Vec<TechniqueTactic>, Self::Error>> + Send + '_;
}
