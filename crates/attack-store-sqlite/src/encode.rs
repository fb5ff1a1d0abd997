//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. List fields (platforms,
//! aliases, …) are stored as compact JSON arrays.

use attack_core::{
  CatalogDomain,
  catalog::{DataComponent, DataSource, EntryMeta, Technique},
  sync_state::SyncState,
};
use chrono::{DateTime, Utc};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── CatalogDomain ───────────────────────────────────────────────────────────

pub fn encode_domain(d: CatalogDomain) -> &'static str { d.as_str() }

pub fn decode_domain(s: &str) -> Result<CatalogDomain> { Ok(s.parse::<CatalogDomain>()?) }

// ─── Lists ───────────────────────────────────────────────────────────────────

pub fn encode_list(items: &[String]) -> serde_json::Result<String> {
  serde_json::to_string(items)
}

pub fn decode_list(s: &str) -> Result<Vec<String>> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from an `attack_sync_state` row.
pub struct RawSyncState {
  pub domain:                     String,
  pub last_successful_sync_at:    Option<String>,
  pub last_added_after_watermark: Option<String>,
  pub last_full_sync_at:          Option<String>,
  pub last_error:                 Option<String>,
  pub updated_at:                 String,
}

impl RawSyncState {
  pub const COLUMNS: &'static str = "domain, last_successful_sync_at, \
     last_added_after_watermark, last_full_sync_at, last_error, updated_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      domain:                     row.get(0)?,
      last_successful_sync_at:    row.get(1)?,
      last_added_after_watermark: row.get(2)?,
      last_full_sync_at:          row.get(3)?,
      last_error:                 row.get(4)?,
      updated_at:                 row.get(5)?,
    })
  }

  pub fn into_state(self) -> Result<SyncState> {
    Ok(SyncState {
      domain:                     decode_domain(&self.domain)?,
      last_successful_sync_at:    decode_opt_dt(self.last_successful_sync_at)?,
      last_added_after_watermark: self.last_added_after_watermark,
      last_full_sync_at:          decode_opt_dt(self.last_full_sync_at)?,
      last_error:                 self.last_error,
      updated_at:                 decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read directly from an `attack_techniques` row.
pub struct RawTechnique {
  pub object_id:            String,
  pub short_code:           String,
  pub name:                 String,
  pub description:          Option<String>,
  pub is_subtechnique:      bool,
  pub parent_short_code:    Option<String>,
  pub platforms:            String,
  pub required_permissions: String,
  pub detection_guidance:   Option<String>,
  pub data_source_names:    String,
  pub last_modified:        Option<String>,
  pub is_revoked:           bool,
}

impl RawTechnique {
  pub const COLUMNS: &'static str = "object_id, short_code, name, description, \
     is_subtechnique, parent_short_code, platforms, required_permissions, \
     detection_guidance, data_source_names, last_modified, is_revoked";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      object_id:            row.get(0)?,
      short_code:           row.get(1)?,
      name:                 row.get(2)?,
      description:          row.get(3)?,
      is_subtechnique:      row.get(4)?,
      parent_short_code:    row.get(5)?,
      platforms:            row.get(6)?,
      required_permissions: row.get(7)?,
      detection_guidance:   row.get(8)?,
      data_source_names:    row.get(9)?,
      last_modified:        row.get(10)?,
      is_revoked:           row.get(11)?,
    })
  }

  pub fn into_technique(self) -> Result<Technique> {
    Ok(Technique {
      meta:                 EntryMeta {
        object_id:     self.object_id,
        short_code:    self.short_code,
        name:          self.name,
        description:   self.description,
        last_modified: decode_opt_dt(self.last_modified)?,
        is_revoked:    self.is_revoked,
      },
      is_subtechnique:      self.is_subtechnique,
      parent_short_code:    self.parent_short_code,
      platforms:            decode_list(&self.platforms)?,
      required_permissions: decode_list(&self.required_permissions)?,
      detection_guidance:   self.detection_guidance,
      data_source_names:    decode_list(&self.data_source_names)?,
    })
  }
}

/// `EntryMeta` columns shared by the data-source and data-component tables,
/// followed by one table-specific column.
pub struct RawEntry {
  pub object_id:     String,
  pub short_code:    String,
  pub name:          String,
  pub description:   Option<String>,
  pub last_modified: Option<String>,
  pub is_revoked:    bool,
  pub extra:         Option<String>,
}

impl RawEntry {
  pub const META_COLUMNS: &'static str =
    "object_id, short_code, name, description, last_modified, is_revoked";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      object_id:     row.get(0)?,
      short_code:    row.get(1)?,
      name:          row.get(2)?,
      description:   row.get(3)?,
      last_modified: row.get(4)?,
      is_revoked:    row.get(5)?,
      extra:         row.get(6)?,
    })
  }

  fn into_meta(self) -> Result<(EntryMeta, Option<String>)> {
    let meta = EntryMeta {
      object_id:     self.object_id,
      short_code:    self.short_code,
      name:          self.name,
      description:   self.description,
      last_modified: decode_opt_dt(self.last_modified)?,
      is_revoked:    self.is_revoked,
    };
    Ok((meta, self.extra))
  }

  /// `extra` holds the `platforms` JSON list.
  pub fn into_data_source(self) -> Result<DataSource> {
    let (meta, platforms) = self.into_meta()?;
    Ok(DataSource {
      meta,
      platforms: platforms.as_deref().map(decode_list).transpose()?.unwrap_or_default(),
    })
  }

  /// `extra` holds `data_source_ref`.
  pub fn into_data_component(self) -> Result<DataComponent> {
    let (meta, data_source_ref) = self.into_meta()?;
    Ok(DataComponent { meta, data_source_ref })
  }
}
