//! Sync orchestrator for the ATT&CK catalog.
//!
//! Drives one run per domain through the pipeline
//! [`CatalogSource`] → [`attack_stix::parse_bundle`] → [`CatalogStore`] and
//! records the outcome in the domain's sync state.
//!
//! [`CatalogSource`]: attack_core::source::CatalogSource
//! [`CatalogStore`]: attack_core::store::CatalogStore

pub mod error;
pub mod lock;
pub mod settings;
mod syncer;

pub use error::{Error, Result};
pub use lock::{DomainLocks, DomainPermit};
pub use settings::SyncConfig;
pub use syncer::{SyncOptions, SyncSummary, Syncer, format_watermark, select_watermark};
