//! Error type for `attack-taxii`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Unknown domain, missing collection mapping or unusable base URL. Raised
  /// before any request is sent.
  #[error("configuration error: {0}")]
  Configuration(String),

  #[error("request to {url} failed: {source}")]
  Transport {
    url:    String,
    #[source]
    source: reqwest::Error,
  },

  #[error("GET {url} → {status}")]
  Status { url: String, status: reqwest::StatusCode },

  #[error("malformed TAXII envelope from {url}: {source}")]
  Malformed {
    url:    String,
    #[source]
    source: serde_json::Error,
  },

  /// The server kept reporting more pages past the configured ceiling.
  #[error("pagination runaway: collection {collection_id} exceeded {limit} pages")]
  PaginationRunaway { collection_id: String, limit: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
