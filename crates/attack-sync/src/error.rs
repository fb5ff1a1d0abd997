//! Error type for `attack-sync`.

use std::time::Duration;

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Every stage's failure converges here; the `Display` text is what gets
/// persisted as `last_error`.
#[derive(Debug, Error)]
pub enum Error {
  /// Configuration, transport or pagination failure from the catalog source.
  #[error("catalog fetch failed: {0}")]
  Source(#[source] BoxError),

  /// Read, write or transaction failure from the store.
  #[error("catalog store failed: {0}")]
  Store(#[source] BoxError),

  #[error("sync timed out after {0:?}")]
  TimedOut(Duration),
}

impl Error {
  pub(crate) fn from_source<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Self::Source(Box::new(e))
  }

  pub(crate) fn from_store<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
