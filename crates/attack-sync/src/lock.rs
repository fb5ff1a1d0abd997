//! Caller-side guard against running the same domain twice at once.
//!
//! Runs for different domains touch disjoint rows and may overlap freely; two
//! runs for one domain would race on the derived-join rebuild.

use std::{collections::HashSet, sync::Arc};

use attack_core::CatalogDomain;
use parking_lot::Mutex;

/// Set of domains with a run in flight. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct DomainLocks {
  active: Arc<Mutex<HashSet<CatalogDomain>>>,
}

impl DomainLocks {
  pub fn new() -> Self { Self::default() }

  /// Claim `domain`, or `None` if a run for it is already in flight.
  pub fn try_acquire(&self, domain: CatalogDomain) -> Option<DomainPermit> {
    if !self.active.lock().insert(domain) {
      return None;
    }
    Some(DomainPermit {
      domain,
      active: Arc::clone(&self.active),
    })
  }

  pub fn is_syncing(&self, domain: CatalogDomain) -> bool { self.active.lock().contains(&domain) }
}

/// Releases its domain on drop.
#[derive(Debug)]
pub struct DomainPermit {
  domain: CatalogDomain,
  active: Arc<Mutex<HashSet<CatalogDomain>>>,
}

impl DomainPermit {
  pub fn domain(&self) -> CatalogDomain { self.domain }
}

impl Drop for DomainPermit {
  fn drop(&mut self) { self.active.lock().remove(&self.domain); }
}
