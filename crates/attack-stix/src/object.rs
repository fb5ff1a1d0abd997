//! Serde views over STIX objects.
//!
//! Every record is first read through [`Envelope`], which only needs `id` and
//! `type`. The type-specific structs below are then deserialised from the same
//! JSON value; any of them failing leaves the record in the raw bucket only.

use attack_core::catalog::SoftwareKind;
use serde::Deserialize;

// ─── Shared fields ───────────────────────────────────────────────────────────

/// Fields present on every STIX object. Timestamps are kept as strings and
/// parsed leniently so a malformed date never loses the record.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
  pub id:                 String,
  #[serde(rename = "type")]
  pub object_type:        String,
  pub spec_version:       Option<String>,
  pub created:            Option<String>,
  pub modified:           Option<String>,
  pub revoked:            Option<bool>,
  pub x_mitre_deprecated: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalReference {
  #[serde(default)]
  pub source_name: String,
  pub external_id: Option<String>,
  pub url:         Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KillChainPhase {
  pub kill_chain_name: String,
  pub phase_name:      String,
}

/// Descriptive fields common to all SDOs with a short code.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Described {
  #[serde(default)]
  pub name:                String,
  pub description:         Option<String>,
  #[serde(default)]
  pub external_references: Vec<ExternalReference>,
}

// ─── Type-specific views ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct TacticFields {
  #[serde(flatten)]
  pub described:         Described,
  pub x_mitre_shortname: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TechniqueFields {
  #[serde(flatten)]
  pub described:                    Described,
  #[serde(default)]
  pub kill_chain_phases:            Vec<KillChainPhase>,
  #[serde(default)]
  pub x_mitre_platforms:            Vec<String>,
  #[serde(default)]
  pub x_mitre_permissions_required: Vec<String>,
  pub x_mitre_detection:            Option<String>,
  #[serde(default)]
  pub x_mitre_data_sources:         Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupFields {
  #[serde(flatten)]
  pub described: Described,
  #[serde(default)]
  pub aliases:   Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SoftwareFields {
  #[serde(flatten)]
  pub described:         Described,
  #[serde(default)]
  pub x_mitre_aliases:   Vec<String>,
  #[serde(default)]
  pub x_mitre_platforms: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataSourceFields {
  #[serde(flatten)]
  pub described:         Described,
  #[serde(default)]
  pub x_mitre_platforms: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataComponentFields {
  #[serde(flatten)]
  pub described:               Described,
  pub x_mitre_data_source_ref: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationshipFields {
  pub relationship_type: String,
  pub source_ref:        String,
  pub target_ref:        String,
}

// ─── Tagged variants ─────────────────────────────────────────────────────────

/// A STIX object classified by its declared `type`.
#[derive(Debug, Clone)]
pub enum StixObject {
  Tactic(TacticFields),
  Technique(TechniqueFields),
  Group(GroupFields),
  Software(SoftwareKind, SoftwareFields),
  Mitigation(Described),
  DataSource(DataSourceFields),
  DataComponent(DataComponentFields),
  Relationship(RelationshipFields),
  /// Any other type (identities, marking definitions, matrices, …). Kept in
  /// the raw bucket only.
  Unrecognized,
}

impl StixObject {
  /// The variant name, for logging.
  pub fn label(&self) -> &'static str {
    match self {
      Self::Tactic(_) => "tactic",
      Self::Technique(_) => "technique",
      Self::Group(_) => "group",
      Self::Software(..) => "software",
      Self::Mitigation(_) => "mitigation",
      Self::DataSource(_) => "data-source",
      Self::DataComponent(_) => "data-component",
      Self::Relationship(_) => "relationship",
      Self::Unrecognized => "unrecognized",
    }
  }
}
