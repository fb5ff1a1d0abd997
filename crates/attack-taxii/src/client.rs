//! [`TaxiiClient`]: async HTTP client for a TAXII 2.1 collection endpoint.

use std::time::Duration;

use attack_core::{
  CatalogDomain,
  source::{CatalogSource, CollectionFetch},
};
use reqwest::{Client, Url, header::ACCEPT};
use serde::Deserialize;

use crate::{Error, Result, TaxiiConfig};

/// `Accept` header value required by TAXII 2.1 servers.
pub const TAXII_MEDIA_TYPE: &str = "application/taxii+json;version=2.1";

/// One page of a `GET …/objects/` response.
#[derive(Debug, Default, Deserialize)]
struct Envelope {
  #[serde(default)]
  more:    bool,
  next:    Option<String>,
  #[serde(default)]
  objects: Vec<serde_json::Value>,
}

/// Async TAXII 2.1 client.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct TaxiiClient {
  client: Client,
  config: TaxiiConfig,
}

impl TaxiiClient {
  pub fn new(config: TaxiiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;
    Ok(Self { client, config })
  }

  pub fn config(&self) -> &TaxiiConfig { &self.config }

  /// The collection configured for `domain`.
  pub fn collection_id(&self, domain: CatalogDomain) -> Result<&str> {
    self
      .config
      .collections
      .get(&domain)
      .map(String::as_str)
      .filter(|id| !id.is_empty())
      .ok_or_else(|| Error::Configuration(format!("no collection configured for domain {domain}")))
  }

  /// `{base}/collections/{collection_id}/objects/`
  fn objects_url(&self, collection_id: &str) -> Result<Url> {
    let raw = format!(
      "{}/collections/{}/objects/",
      self.config.base_url.trim_end_matches('/'),
      collection_id
    );
    Url::parse(&raw).map_err(|e| Error::Configuration(format!("invalid collection URL {raw:?}: {e}")))
  }

  /// `GET /collections/{id}/objects/[?added_after=…]`, then `?next=…` until
  /// the server reports no more pages.
  ///
  /// `added_after` is sent on the first request only. Any failed page aborts
  /// the whole fetch; nothing fetched so far is returned.
  pub async fn fetch_objects(
    &self,
    domain: CatalogDomain,
    added_after: Option<&str>,
  ) -> Result<CollectionFetch> {
    let collection_id = self.collection_id(domain)?.to_owned();
    let base = self.objects_url(&collection_id)?;
    let limit = self.config.max_pages;

    let mut objects = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
      if pages >= limit {
        return Err(Error::PaginationRunaway { collection_id, limit });
      }

      let mut url = base.clone();
      match (&cursor, added_after) {
        (Some(next), _) => {
          url.query_pairs_mut().append_pair("next", next);
        }
        (None, Some(watermark)) => {
          url.query_pairs_mut().append_pair("added_after", watermark);
        }
        (None, None) => {}
      }

      let page = self.fetch_page(url).await?;
      pages += 1;
      tracing::debug!(
        %domain,
        page = pages,
        objects = page.objects.len(),
        more = page.more,
        "fetched TAXII page"
      );
      objects.extend(page.objects);

      match (page.more, page.next) {
        (true, Some(next)) => cursor = Some(next),
        (true, None) => {
          tracing::warn!(%domain, page = pages, "server reported more pages without a cursor");
          break;
        }
        (false, _) => break,
      }
    }

    tracing::info!(
      %domain,
      collection_id = %collection_id,
      pages,
      objects = objects.len(),
      added_after = added_after.unwrap_or("-"),
      "fetched collection"
    );
    Ok(CollectionFetch { collection_id, objects, pages })
  }

  async fn fetch_page(&self, url: Url) -> Result<Envelope> {
    let url_str = url.to_string();

    let mut req = self.client.get(url).header(ACCEPT, TAXII_MEDIA_TYPE);
    if let Some(username) = &self.config.username {
      req = req.basic_auth(username, self.config.password.as_deref());
    }

    let resp = req.send().await.map_err(|source| Error::Transport {
      url: url_str.clone(),
      source,
    })?;

    let status = resp.status();
    if !status.is_success() {
      return Err(Error::Status { url: url_str, status });
    }

    let body = resp.bytes().await.map_err(|source| Error::Transport {
      url: url_str.clone(),
      source,
    })?;
    // Some servers answer an empty delta with an empty body.
    if body.iter().all(u8::is_ascii_whitespace) {
      return Ok(Envelope::default());
    }
    serde_json::from_slice(&body).map_err(|source| Error::Malformed { url: url_str, source })
  }
}

impl CatalogSource for TaxiiClient {
  type Error = Error;

  async fn fetch_collection_objects(
    &self,
    domain: CatalogDomain,
    added_after: Option<String>,
  ) -> Result<CollectionFetch> {
    self.fetch_objects(domain, added_after.as_deref()).await
  }
}
