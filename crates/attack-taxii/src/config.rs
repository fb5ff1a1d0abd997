//! Connection settings for the TAXII server.

use std::collections::BTreeMap;

use attack_core::CatalogDomain;
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://attack-taxii.mitre.org/api/v21";

/// Runtime client configuration, usually the `[taxii]` table of the sync
/// config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaxiiConfig {
  /// API root; collection paths are appended to it.
  pub base_url:     String,
  /// Collection identifier per catalog domain.
  pub collections:  BTreeMap<CatalogDomain, String>,
  /// Hard ceiling on pages per fetch.
  pub max_pages:    usize,
  pub timeout_secs: u64,
  pub username:     Option<String>,
  pub password:     Option<String>,
}

impl Default for TaxiiConfig {
  fn default() -> Self {
    Self {
      base_url:     DEFAULT_BASE_URL.to_owned(),
      collections:  default_collections(),
      max_pages:    100,
      timeout_secs: 60,
      username:     None,
      password:     None,
    }
  }
}

/// The public ATT&CK collections.
pub fn default_collections() -> BTreeMap<CatalogDomain, String> {
  BTreeMap::from([
    (CatalogDomain::Enterprise, "x-mitre-collection--1f5f1533-f617-4ca8-9ab4-6a02367fa019".to_owned()),
    (CatalogDomain::Mobile, "x-mitre-collection--dac0d2d7-8653-445c-9bff-82f934c1e858".to_owned()),
    (CatalogDomain::Ics, "x-mitre-collection--90c00720-636b-4485-b342-8751d232bf09".to_owned()),
  ])
}
