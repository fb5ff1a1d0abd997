//! The sync orchestrator.

use std::time::Duration;

use attack_core::{
  CatalogDomain,
  catalog::UpsertReport,
  source::CatalogSource,
  store::CatalogStore,
  sync_state::{SyncState, SyncSuccess},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::{Error, Result};

/// Per-run knobs.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
  /// Ignore the stored watermark and fetch the whole collection.
  pub full:  bool,
  /// Use this `added_after` instead of the stored watermark. Only honoured
  /// once the domain has completed a full sync.
  pub since: Option<String>,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncSummary {
  pub domain:               CatalogDomain,
  pub collection_id:        String,
  pub fetched_object_count: usize,
  /// `added_after` sent to the server; `None` for a full fetch.
  pub watermark_used:       Option<String>,
  /// Watermark persisted for the next delta run.
  pub next_watermark:       String,
  pub full_sync:            bool,
  /// Records dropped by the parser for lacking a usable envelope.
  pub rejected:             usize,
  pub report:               UpsertReport,
}

/// Pick the `added_after` for a run: `None` (full fetch) when a full run is
/// requested or the domain has never completed one, otherwise the override
/// or the stored watermark.
pub fn select_watermark(state: Option<&SyncState>, options: &SyncOptions) -> Option<String> {
  if options.full {
    return None;
  }
  let state = state.filter(|s| s.last_full_sync_at.is_some())?;
  options
    .since
    .clone()
    .or_else(|| state.last_added_after_watermark.clone())
}

/// Render a run's start time as a watermark, e.g. `2024-05-01T12:00:00.000Z`.
pub fn format_watermark(at: DateTime<Utc>) -> String {
  at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// What a run moved into the store, before the outcome is recorded.
struct Transferred {
  collection_id:        String,
  fetched_object_count: usize,
  pages:                usize,
  watermark:            Option<String>,
  full_sync:            bool,
  rejected:             usize,
  report:               UpsertReport,
}

/// Drives fetch → parse → upsert for one domain and records the outcome.
///
/// Holds no per-domain state of its own; concurrent runs for the same domain
/// must be prevented by the caller (see [`crate::DomainLocks`]).
pub struct Syncer<S, C> {
  store:  S,
  source: C,
}

impl<S: CatalogStore, C: CatalogSource> Syncer<S, C> {
  pub fn new(store: S, source: C) -> Self { Self { store, source } }

  pub fn store(&self) -> &S { &self.store }

  pub fn source(&self) -> &C { &self.source }

  /// Run one sync. On failure the error message is stored as `last_error`
  /// (the watermark is left alone) and the error is returned.
  pub async fn run_sync(
    &self,
    domain: CatalogDomain,
    options: SyncOptions,
  ) -> Result<SyncSummary> {
    self.run(domain, &options, None).await
  }

  /// [`run_sync`](Self::run_sync) with the fetch and upsert under a
  /// deadline. An elapsed deadline is recorded as a failed run.
  ///
  /// The closing sync-state write is outside the deadline, so a run whose
  /// data landed always records its new watermark. An upsert already handed
  /// to the store when the deadline fires may still commit; the watermark is
  /// not advanced then, so the next run refetches.
  pub async fn run_sync_with_deadline(
    &self,
    domain: CatalogDomain,
    options: SyncOptions,
    deadline: Duration,
  ) -> Result<SyncSummary> {
    self.run(domain, &options, Some(deadline)).await
  }

  async fn run(
    &self,
    domain: CatalogDomain,
    options: &SyncOptions,
    deadline: Option<Duration>,
  ) -> Result<SyncSummary> {
    let started_at = Utc::now();
    let transfer = self.transfer(domain, options);
    let transferred = match deadline {
      Some(deadline) => tokio::time::timeout(deadline, transfer)
        .await
        .unwrap_or(Err(Error::TimedOut(deadline))),
      None => transfer.await,
    };

    let outcome = match transferred {
      Ok(transferred) => self.finish(domain, started_at, transferred).await,
      Err(error) => Err(error),
    };
    if let Err(error) = &outcome {
      self.record_failure(domain, error).await;
    }
    outcome
  }

  /// State read, fetch, parse and upsert.
  async fn transfer(&self, domain: CatalogDomain, options: &SyncOptions) -> Result<Transferred> {
    let state = self
      .store
      .get_sync_state(domain)
      .await
      .map_err(Error::from_store)?;

    let watermark = select_watermark(state.as_ref(), options);
    // No watermark means either a requested full run or no full run yet.
    let full_sync = watermark.is_none();
    tracing::info!(
      %domain,
      full_sync,
      added_after = watermark.as_deref().unwrap_or("-"),
      "starting sync"
    );

    let fetch = self
      .source
      .fetch_collection_objects(domain, watermark.clone())
      .await
      .map_err(Error::from_source)?;

    let mut bundle = attack_stix::parse_bundle(&fetch.objects, domain);
    bundle.full_sync = full_sync;
    let rejected = bundle.rejected;

    let report = self
      .store
      .upsert_attack_data(bundle)
      .await
      .map_err(Error::from_store)?;

    Ok(Transferred {
      fetched_object_count: fetch.objects.len(),
      pages: fetch.pages,
      collection_id: fetch.collection_id,
      watermark,
      full_sync,
      rejected,
      report,
    })
  }

  /// Record the success and build the summary.
  async fn finish(
    &self,
    domain: CatalogDomain,
    started_at: DateTime<Utc>,
    transferred: Transferred,
  ) -> Result<SyncSummary> {
    let next_watermark = format_watermark(started_at);
    self
      .store
      .record_sync_success(domain, SyncSuccess {
        completed_at: Utc::now(),
        watermark:    next_watermark.clone(),
        full_sync:    transferred.full_sync,
      })
      .await
      .map_err(Error::from_store)?;

    tracing::info!(
      %domain,
      objects = transferred.fetched_object_count,
      pages = transferred.pages,
      rejected = transferred.rejected,
      next_watermark = %next_watermark,
      "sync complete"
    );

    Ok(SyncSummary {
      domain,
      collection_id: transferred.collection_id,
      fetched_object_count: transferred.fetched_object_count,
      watermark_used: transferred.watermark,
      next_watermark,
      full_sync: transferred.full_sync,
      rejected: transferred.rejected,
      report: transferred.report,
    })
  }

  async fn record_failure(&self, domain: CatalogDomain, error: &Error) {
    tracing::error!(%domain, %error, "sync failed");
    if let Err(record_error) = self.store.record_sync_failure(domain, error.to_string()).await {
      tracing::error!(%domain, error = %record_error, "could not record sync failure");
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn state(full_at: Option<DateTime<Utc>>, watermark: Option<&str>) -> SyncState {
    SyncState {
      domain:                     CatalogDomain::Enterprise,
      last_successful_sync_at:    full_at,
      last_added_after_watermark: watermark.map(str::to_owned),
      last_full_sync_at:          full_at,
      last_error:                 None,
      updated_at:                 Utc::now(),
    }
  }

  fn since(s: &str) -> SyncOptions {
    SyncOptions {
      full:  false,
      since: Some(s.to_owned()),
    }
  }

  #[test]
  fn never_synced_domain_gets_a_full_fetch() {
    assert_eq!(select_watermark(None, &SyncOptions::default()), None);
    assert_eq!(select_watermark(None, &since("2024-01-01T00:00:00.000Z")), None);
  }

  #[test]
  fn failed_first_run_still_means_full() {
    let mut s = state(None, None);
    s.last_error = Some("boom".into());
    assert_eq!(select_watermark(Some(&s), &since("2024-01-01T00:00:00.000Z")), None);
  }

  #[test]
  fn delta_uses_the_stored_watermark() {
    let s = state(Some(Utc::now()), Some("2024-05-01T00:00:00.000Z"));
    assert_eq!(
      select_watermark(Some(&s), &SyncOptions::default()).as_deref(),
      Some("2024-05-01T00:00:00.000Z")
    );
  }

  #[test]
  fn since_overrides_the_stored_watermark() {
    let s = state(Some(Utc::now()), Some("2024-05-01T00:00:00.000Z"));
    assert_eq!(
      select_watermark(Some(&s), &since("2023-01-01T00:00:00.000Z")).as_deref(),
      Some("2023-01-01T00:00:00.000Z")
    );
  }

  #[test]
  fn full_flag_wins_over_everything() {
    let s = state(Some(Utc::now()), Some("2024-05-01T00:00:00.000Z"));
    let options = SyncOptions {
      full:  true,
      since: Some("2023-01-01T00:00:00.000Z".into()),
    };
    assert_eq!(select_watermark(Some(&s), &options), None);
  }

  #[test]
  fn watermark_has_millis_and_zulu_suffix() {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
    assert_eq!(format_watermark(at), "2024-05-01T12:30:00.000Z");
  }
}
