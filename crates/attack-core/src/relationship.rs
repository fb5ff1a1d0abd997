//! Classification of relationship edges into derived technique joins.
//!
//! A single `uses` kind covers both "group uses technique" and "software uses
//! technique"; the two are told apart only by the identifier prefix of the
//! source object. All of that logic lives in [`classify_relationship`].

use serde::{Deserialize, Serialize};

use crate::object_id::{self, type_prefix};

/// The derived join a relationship contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechniqueEdge {
  /// `intrusion-set --uses--> attack-pattern`
  GroupUses,
  /// `malware|tool --uses--> attack-pattern`
  SoftwareUses,
  /// `course-of-action --mitigates--> attack-pattern`
  Mitigates,
  /// `x-mitre-data-component --detects--> attack-pattern`
  Detects,
}

impl TechniqueEdge {
  pub const ALL: [TechniqueEdge; 4] =
    [Self::GroupUses, Self::SoftwareUses, Self::Mitigates, Self::Detects];
}

/// Decide which derived join, if any, an edge belongs to.
///
/// Edges whose target is not a technique, whose kind is not one of `uses`,
/// `mitigates` or `detects`, or whose source prefix does not fit the kind are
/// ignored (`None`). Unknown object kinds therefore never raise an error.
pub fn classify_relationship(
  kind: &str,
  source_ref: &str,
  target_ref: &str,
) -> Option<TechniqueEdge> {
  if type_prefix(target_ref)? != object_id::ATTACK_PATTERN {
    return None;
  }
  let source = type_prefix(source_ref)?;

  match (kind, source) {
    ("uses", object_id::INTRUSION_SET) => Some(TechniqueEdge::GroupUses),
    ("uses", object_id::MALWARE | object_id::TOOL) => Some(TechniqueEdge::SoftwareUses),
    ("mitigates", object_id::COURSE_OF_ACTION) => Some(TechniqueEdge::Mitigates),
    ("detects", object_id::DATA_COMPONENT) => Some(TechniqueEdge::Detects),
    _ => None,
  }
}
