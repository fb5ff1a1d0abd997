//! [`SqliteStore`], the SQLite implementation of [`CatalogStore`].

use std::path::Path;

use attack_core::{
  CatalogDomain,
  catalog::{
    CatalogCounts, DataComponent, DataSource, NormalizedBundle, Technique, TechniqueLink,
    TechniqueTactic, UpsertReport,
  },
  relationship::TechniqueEdge,
  store::CatalogStore,
  sync_state::{SyncState, SyncSuccess},
};
use chrono::Utc;
use rusqlite::{OptionalExtension as _, TransactionBehavior, params};

use crate::{
  Result,
  encode::{RawEntry, RawSyncState, RawTechnique, encode_domain, encode_dt},
  schema::SCHEMA,
  upsert,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A catalog store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Rows of `table` ordered by short code, as [`RawEntry`] with `extra`
  /// taken from `extra_column`.
  async fn load_entries(
    &self,
    domain: CatalogDomain,
    table: &'static str,
    extra_column: &'static str,
  ) -> Result<Vec<RawEntry>> {
    let domain_str = encode_domain(domain);
    let sql = format!(
      "SELECT {}, {extra_column} FROM {table} WHERE domain = ?1 ORDER BY short_code, object_id",
      RawEntry::META_COLUMNS
    );
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params![domain_str], RawEntry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  /// Read back one sync-state row after writing it.
  async fn load_sync_state(&self, domain: CatalogDomain) -> Result<SyncState> {
    let domain_str = encode_domain(domain);
    let sql = format!(
      "SELECT {} FROM attack_sync_state WHERE domain = ?1",
      RawSyncState::COLUMNS
    );
    let raw = self
      .conn
      .call(move |conn| Ok(conn.query_row(&sql, params![domain_str], RawSyncState::from_row)?))
      .await?;
    raw.into_state()
  }
}

// ─── CatalogStore impl ───────────────────────────────────────────────────────

impl CatalogStore for SqliteStore {
  type Error = crate::Error;

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn upsert_attack_data(&self, bundle: NormalizedBundle) -> Result<UpsertReport> {
    let domain = bundle.domain;
    if bundle.is_empty() {
      tracing::debug!(%domain, "empty bundle; nothing to upsert");
      return Ok(UpsertReport::default());
    }

    let report = self
      .conn
      .call(move |conn| {
        // Write lock up front: the join rebuild reads tactics mid-transaction.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let report = upsert::apply(&tx, &bundle)?;
        tx.commit()?;
        Ok(report)
      })
      .await?;

    tracing::info!(
      %domain,
      raw_objects = report.raw_objects,
      techniques = report.techniques,
      relationships = report.relationships,
      technique_tactics = report.technique_tactics,
      group_techniques = report.group_techniques,
      software_techniques = report.software_techniques,
      mitigation_techniques = report.mitigation_techniques,
      "upserted catalog data"
    );
    Ok(report)
  }

  // ── Sync state ────────────────────────────────────────────────────────────

  async fn get_sync_state(&self, domain: CatalogDomain) -> Result<Option<SyncState>> {
    let domain_str = encode_domain(domain);
    let sql = format!(
      "SELECT {} FROM attack_sync_state WHERE domain = ?1",
      RawSyncState::COLUMNS
    );

    let raw: Option<RawSyncState> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, params![domain_str], RawSyncState::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSyncState::into_state).transpose()
  }

  async fn list_sync_states(&self) -> Result<Vec<SyncState>> {
    let sql = format!(
      "SELECT {} FROM attack_sync_state ORDER BY domain",
      RawSyncState::COLUMNS
    );

    let raws: Vec<RawSyncState> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], RawSyncState::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSyncState::into_state).collect()
  }

  async fn record_sync_success(
    &self,
    domain: CatalogDomain,
    success: SyncSuccess,
  ) -> Result<SyncState> {
    let domain_str = encode_domain(domain);
    let completed_at = encode_dt(success.completed_at);
    let full_sync_at = success.full_sync.then(|| completed_at.clone());
    let updated_at = encode_dt(Utc::now());
    let watermark = success.watermark;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO attack_sync_state (
             domain, last_successful_sync_at, last_added_after_watermark,
             last_full_sync_at, last_error, updated_at
           ) VALUES (?1, ?2, ?3, ?4, NULL, ?5)
           ON CONFLICT (domain) DO UPDATE SET
             last_successful_sync_at    = excluded.last_successful_sync_at,
             last_added_after_watermark = excluded.last_added_after_watermark,
             last_full_sync_at          = COALESCE(excluded.last_full_sync_at,
                                                   attack_sync_state.last_full_sync_at),
             last_error                 = NULL,
             updated_at                 = excluded.updated_at",
          params![domain_str, completed_at, watermark, full_sync_at, updated_at],
        )?;
        Ok(())
      })
      .await?;

    self.load_sync_state(domain).await
  }

  async fn record_sync_failure(&self, domain: CatalogDomain, message: String) -> Result<SyncState> {
    let domain_str = encode_domain(domain);
    let updated_at = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO attack_sync_state (domain, last_error, updated_at)
           VALUES (?1, ?2, ?3)
           ON CONFLICT (domain) DO UPDATE SET
             last_error = excluded.last_error,
             updated_at = excluded.updated_at",
          params![domain_str, message, updated_at],
        )?;
        Ok(())
      })
      .await?;

    self.load_sync_state(domain).await
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn catalog_counts(&self, domain: CatalogDomain) -> Result<CatalogCounts> {
    let domain_str = encode_domain(domain);

    let counts = self
      .conn
      .call(move |conn| {
        let count = |table: &str| -> rusqlite::Result<u64> {
          conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE domain = ?1"),
            params![domain_str],
            |row| row.get::<_, i64>(0).map(|n| n as u64),
          )
        };
        Ok(CatalogCounts {
          raw_objects:       count("attack_raw_objects")?,
          tactics:           count("attack_tactics")?,
          techniques:        count("attack_techniques")?,
          groups:            count("attack_groups")?,
          software:          count("attack_software")?,
          mitigations:       count("attack_mitigations")?,
          data_sources:      count("attack_data_sources")?,
          data_components:   count("attack_data_components")?,
          relationships:     count("attack_relationships")?,
          technique_tactics: count("attack_technique_tactics")?,
        })
      })
      .await?;

    Ok(counts)
  }

  async fn list_techniques(&self, domain: CatalogDomain) -> Result<Vec<Technique>> {
    let domain_str = encode_domain(domain);
    let sql = format!(
      "SELECT {} FROM attack_techniques WHERE domain = ?1 ORDER BY short_code, object_id",
      RawTechnique::COLUMNS
    );

    let raws: Vec<RawTechnique> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params![domain_str], RawTechnique::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTechnique::into_technique).collect()
  }

  async fn list_data_sources(&self, domain: CatalogDomain) -> Result<Vec<DataSource>> {
    self
      .load_entries(domain, "attack_data_sources", "platforms")
      .await?
      .into_iter()
      .map(RawEntry::into_data_source)
      .collect()
  }

  async fn list_data_components(&self, domain: CatalogDomain) -> Result<Vec<DataComponent>> {
    self
      .load_entries(domain, "attack_data_components", "data_source_ref")
      .await?
      .into_iter()
      .map(RawEntry::into_data_component)
      .collect()
  }

  async fn technique_links(
    &self,
    domain: CatalogDomain,
    edge: TechniqueEdge,
  ) -> Result<Vec<TechniqueLink>> {
    let domain_str = encode_domain(domain);
    let (table, column) = upsert::link_table(edge);
    let sql = format!(
      "SELECT {column}, technique_id FROM {table} WHERE domain = ?1 ORDER BY 1, 2"
    );

    let links = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params![domain_str], |row| {
            Ok(TechniqueLink {
              source_id:    row.get(0)?,
              technique_id: row.get(1)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(links)
  }

  async fn technique_tactics(&self, domain: CatalogDomain) -> Result<Vec<TechniqueTactic>> {
    let domain_str = encode_domain(domain);

    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT technique_id, tactic_id FROM attack_technique_tactics
           WHERE domain = ?1 ORDER BY 1, 2",
        )?;
        let rows = stmt
          .query_map(params![domain_str], |row| {
            Ok(TechniqueTactic {
              technique_id: row.get(0)?,
              tactic_id:    row.get(1)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(rows)
  }
}
