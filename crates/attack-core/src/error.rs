//! Error types for `attack-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown catalog domain: {0:?}")]
  UnknownDomain(String),

  #[error("malformed object identifier: {0:?}")]
  InvalidObjectId(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
