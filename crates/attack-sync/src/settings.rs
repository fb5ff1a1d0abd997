//! Sync configuration, layered from an optional TOML file and the
//! environment.
//!
//! ```toml
//! store_path   = "~/.local/share/attack-sync/catalog.db"
//! timeout_secs = 900
//!
//! [taxii]
//! base_url  = "https://attack-taxii.mitre.org/api/v21"
//! max_pages = 100
//!
//! [taxii.collections]
//! enterprise = "x-mitre-collection--1f5f1533-f617-4ca8-9ab4-6a02367fa019"
//! ```
//!
//! Environment variables use the `ATTACK_SYNC_` prefix and `__` between
//! nested keys, e.g. `ATTACK_SYNC_TAXII__BASE_URL`.

use std::path::{Path, PathBuf};

use attack_taxii::TaxiiConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// SQLite database file; a leading `~/` is expanded.
  pub store_path:   PathBuf,
  /// Deadline for a whole run; none by default.
  pub timeout_secs: Option<u64>,
  pub taxii:        TaxiiConfig,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      store_path:   PathBuf::from("attack-catalog.db"),
      timeout_secs: None,
      taxii:        TaxiiConfig::default(),
    }
  }
}

impl SyncConfig {
  /// Read `path` (if it exists) and overlay `ATTACK_SYNC_*` variables.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("ATTACK_SYNC")
          .prefix_separator("_")
          .separator("__"),
      )
      .build()?
      .try_deserialize()
  }

  /// `store_path` with a leading `~` expanded to the user's home directory.
  pub fn resolved_store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }
}

fn expand_tilde(path: &Path) -> PathBuf {
  match (path.strip_prefix("~"), std::env::var_os("HOME")) {
    (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
    _ => path.to_path_buf(),
  }
}
