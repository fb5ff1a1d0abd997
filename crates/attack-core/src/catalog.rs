//! Normalised catalog records: the typed output of the object parser and the
//! input of the upsert engine.
//!
//! Every record is implicitly scoped to the [`CatalogDomain`] of the
//! [`NormalizedBundle`] that carries it. Object identifiers are copied
//! verbatim from the upstream catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CatalogDomain;

// ─── Raw audit trail ─────────────────────────────────────────────────────────

/// Every fetched record, whatever its type, as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObject {
  pub object_id:     String,
  pub object_type:   String,
  pub spec_version:  Option<String>,
  pub created:       Option<DateTime<Utc>>,
  pub last_modified: Option<DateTime<Utc>>,
  pub is_revoked:    bool,
  /// The record exactly as delivered, serialised as compact JSON.
  pub raw_payload:   String,
}

// ─── Typed records ───────────────────────────────────────────────────────────

/// Columns shared by every typed record that carries a short code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMeta {
  pub object_id:     String,
  /// External identifier such as `TA0002`, `T1059.001` or `G0007`.
  pub short_code:    String,
  pub name:          String,
  pub description:   Option<String>,
  pub last_modified: Option<DateTime<Utc>>,
  /// Set for revoked and deprecated records; they are stored, not dropped.
  pub is_revoked:    bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tactic {
  pub meta:       EntryMeta,
  /// Phase identifier (e.g. `execution`) that techniques reference.
  pub short_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technique {
  pub meta:                 EntryMeta,
  pub is_subtechnique:      bool,
  pub parent_short_code:    Option<String>,
  pub platforms:            Vec<String>,
  pub required_permissions: Vec<String>,
  pub detection_guidance:   Option<String>,
  pub data_source_names:    Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
  pub meta:    EntryMeta,
  pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoftwareKind {
  Malware,
  Tool,
}

impl SoftwareKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Malware => "malware",
      Self::Tool => "tool",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Software {
  pub meta:      EntryMeta,
  pub kind:      SoftwareKind,
  pub aliases:   Vec<String>,
  pub platforms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mitigation {
  pub meta: EntryMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
  pub meta:      EntryMeta,
  pub platforms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataComponent {
  pub meta:            EntryMeta,
  /// Object identifier of the owning data source.
  pub data_source_ref: Option<String>,
}

/// An untyped graph edge between two object identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
  pub object_id:         String,
  pub relationship_kind: String,
  pub source_ref:        String,
  pub target_ref:        String,
  pub last_modified:     Option<DateTime<Utc>>,
  /// Revoked edges are kept but contribute nothing to derived joins.
  pub is_revoked:        bool,
}

/// A technique's phase tag, to be resolved against tactic short names at
/// write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTechniqueTactic {
  pub technique_id:      String,
  pub tactic_short_name: String,
}

// ─── Bundle ──────────────────────────────────────────────────────────────────

/// One sync run's worth of normalised records for a single domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBundle {
  pub domain:            CatalogDomain,
  pub raw_objects:       Vec<RawObject>,
  pub tactics:           Vec<Tactic>,
  pub techniques:        Vec<Technique>,
  pub groups:            Vec<Group>,
  pub software:          Vec<Software>,
  pub mitigations:       Vec<Mitigation>,
  pub data_sources:      Vec<DataSource>,
  pub data_components:   Vec<DataComponent>,
  pub relationships:     Vec<Relationship>,
  pub technique_tactics: Vec<PendingTechniqueTactic>,
  /// Records dropped because they had no usable `id` or `type`.
  pub rejected:          usize,
  /// The batch is the domain's whole collection. Derived joins are then
  /// rebuilt from the batch alone; otherwise from every stored relationship
  /// and technique phase tag.
  pub full_sync:         bool,
}

impl NormalizedBundle {
  pub fn empty(domain: CatalogDomain) -> Self {
    Self {
      domain,
      raw_objects: Vec::new(),
      tactics: Vec::new(),
      techniques: Vec::new(),
      groups: Vec::new(),
      software: Vec::new(),
      mitigations: Vec::new(),
      data_sources: Vec::new(),
      data_components: Vec::new(),
      relationships: Vec::new(),
      technique_tactics: Vec::new(),
      rejected: 0,
      full_sync: false,
    }
  }

  /// `true` when there is nothing to write. Every typed record also has a raw
  /// object, so the raw bucket alone decides.
  pub fn is_empty(&self) -> bool { self.raw_objects.is_empty() }
}

// ─── Write and read summaries ────────────────────────────────────────────────

/// Rows written by one upsert, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertReport {
  pub raw_objects:               usize,
  pub tactics:                   usize,
  pub techniques:                usize,
  pub groups:                    usize,
  pub software:                  usize,
  pub mitigations:               usize,
  pub data_sources:              usize,
  pub data_components:           usize,
  pub relationships:             usize,
  pub technique_tactics:         usize,
  pub group_techniques:          usize,
  pub software_techniques:       usize,
  pub mitigation_techniques:     usize,
  pub data_component_techniques: usize,
}

/// Stored row counts for one domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogCounts {
  pub raw_objects:       u64,
  pub tactics:           u64,
  pub techniques:        u64,
  pub groups:            u64,
  pub software:          u64,
  pub mitigations:       u64,
  pub data_sources:      u64,
  pub data_components:   u64,
  pub relationships:     u64,
  pub technique_tactics: u64,
}

/// One row of a derived technique join.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TechniqueLink {
  pub source_id:    String,
  pub technique_id: String,
}

/// One row of the technique–tactic membership join.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TechniqueTactic {
  pub technique_id: String,
  pub tactic_id:    String,
}
