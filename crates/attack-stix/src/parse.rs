//! Bundle normalisation.
//!
//! Pipeline:
//!   &[serde_json::Value]
//!     └─ Envelope            → raw object (every record with an id and type)
//!          └─ classify()      → StixObject
//!               └─ push_typed() → typed bucket + pending technique→tactic tags

use attack_core::{
  CatalogDomain,
  catalog::{
    DataComponent, DataSource, EntryMeta, Group, Mitigation, NormalizedBundle,
    PendingTechniqueTactic, RawObject, Relationship, Software, SoftwareKind, Tactic, Technique,
  },
  object_id,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::object::{
  DataComponentFields, DataSourceFields, Described, Envelope, ExternalReference, GroupFields,
  KillChainPhase, RelationshipFields, SoftwareFields, StixObject, TacticFields, TechniqueFields,
};

/// Separator between a technique's short code and its sub-technique suffix.
const SUBTECHNIQUE_SEPARATOR: char = '.';

// ─── Public API ──────────────────────────────────────────────────────────────

/// Classify a record by its declared STIX `type`.
///
/// Unknown types yield [`StixObject::Unrecognized`]; an error means the type is
/// known but the record's fields do not have the expected shape.
pub fn classify(object_type: &str, value: &Value) -> Result<StixObject, serde_json::Error> {
  Ok(match object_type {
    "x-mitre-tactic" => StixObject::Tactic(TacticFields::deserialize(value)?),
    "attack-pattern" => StixObject::Technique(TechniqueFields::deserialize(value)?),
    "intrusion-set" => StixObject::Group(GroupFields::deserialize(value)?),
    "malware" => StixObject::Software(SoftwareKind::Malware, SoftwareFields::deserialize(value)?),
    "tool" => StixObject::Software(SoftwareKind::Tool, SoftwareFields::deserialize(value)?),
    "course-of-action" => StixObject::Mitigation(Described::deserialize(value)?),
    "x-mitre-data-source" => StixObject::DataSource(DataSourceFields::deserialize(value)?),
    "x-mitre-data-component" => {
      StixObject::DataComponent(DataComponentFields::deserialize(value)?)
    }
    "relationship" => StixObject::Relationship(RelationshipFields::deserialize(value)?),
    _ => StixObject::Unrecognized,
  })
}

/// Normalise a fetched object stream for `domain`.
///
/// Never fails: records without a usable `id`/`type` are counted in
/// [`NormalizedBundle::rejected`], records of unknown type or unexpected shape
/// are kept as raw objects only, and typed records without a short code for
/// this domain are kept as raw objects only.
pub fn parse_bundle(objects: &[Value], domain: CatalogDomain) -> NormalizedBundle {
  let mut bundle = NormalizedBundle::empty(domain);

  for value in objects {
    let envelope = match Envelope::deserialize(value) {
      Ok(envelope) => envelope,
      Err(error) => {
        tracing::warn!(%domain, %error, "rejecting object without usable id/type");
        bundle.rejected += 1;
        continue;
      }
    };
    if let Err(error) = object_id::split(&envelope.id) {
      tracing::warn!(%domain, %error, "rejecting object");
      bundle.rejected += 1;
      continue;
    }

    let header = Header {
      object_id:     envelope.id.clone(),
      last_modified: envelope
        .modified
        .as_deref()
        .or(envelope.created.as_deref())
        .and_then(parse_timestamp),
      is_revoked:    envelope.revoked.unwrap_or(false)
        || envelope.x_mitre_deprecated.unwrap_or(false),
    };

    bundle.raw_objects.push(RawObject {
      object_id:     envelope.id,
      object_type:   envelope.object_type.clone(),
      spec_version:  envelope.spec_version,
      created:       envelope.created.as_deref().and_then(parse_timestamp),
      last_modified: header.last_modified,
      is_revoked:    header.is_revoked,
      raw_payload:   value.to_string(),
    });

    match classify(&envelope.object_type, value) {
      Ok(object) => push_typed(&mut bundle, header, object),
      Err(error) => tracing::warn!(
        %domain,
        object_id = %header.object_id,
        object_type = %envelope.object_type,
        %error,
        "keeping object as raw only"
      ),
    }
  }

  tracing::debug!(
    %domain,
    raw = bundle.raw_objects.len(),
    techniques = bundle.techniques.len(),
    relationships = bundle.relationships.len(),
    rejected = bundle.rejected,
    "parsed bundle"
  );
  bundle
}

// ─── Normalisation ───────────────────────────────────────────────────────────

/// Envelope-derived columns shared by every typed record.
struct Header {
  object_id:     String,
  last_modified: Option<DateTime<Utc>>,
  is_revoked:    bool,
}

fn push_typed(bundle: &mut NormalizedBundle, header: Header, object: StixObject) {
  let domain = bundle.domain;

  if let StixObject::Relationship(rel) = object {
    bundle.relationships.push(Relationship {
      object_id:         header.object_id,
      relationship_kind: rel.relationship_type,
      source_ref:        rel.source_ref,
      target_ref:        rel.target_ref,
      last_modified:     header.last_modified,
      is_revoked:        header.is_revoked,
    });
    return;
  }

  let described = match &object {
    StixObject::Tactic(f) => &f.described,
    StixObject::Technique(f) => &f.described,
    StixObject::Group(f) => &f.described,
    StixObject::Software(_, f) => &f.described,
    StixObject::Mitigation(d) => d,
    StixObject::DataSource(f) => &f.described,
    StixObject::DataComponent(f) => &f.described,
    StixObject::Relationship(_) | StixObject::Unrecognized => return,
  };

  let Some(short_code) = short_code(&described.external_references, domain) else {
    tracing::debug!(
      %domain,
      object_id = %header.object_id,
      kind = object.label(),
      "no short code; keeping as raw only"
    );
    return;
  };

  let meta = EntryMeta {
    object_id: header.object_id,
    short_code,
    name: described.name.clone(),
    description: described.description.clone(),
    last_modified: header.last_modified,
    is_revoked: header.is_revoked,
  };

  match object {
    StixObject::Tactic(f) => bundle.tactics.push(Tactic {
      meta,
      short_name: f.x_mitre_shortname,
    }),
    StixObject::Technique(f) => {
      for short_name in tactic_short_names(&f.kill_chain_phases, domain) {
        bundle.technique_tactics.push(PendingTechniqueTactic {
          technique_id:      meta.object_id.clone(),
          tactic_short_name: short_name,
        });
      }
      let (is_subtechnique, parent_short_code) = subtechnique_parts(&meta.short_code);
      bundle.techniques.push(Technique {
        meta,
        is_subtechnique,
        parent_short_code,
        platforms: f.x_mitre_platforms,
        required_permissions: f.x_mitre_permissions_required,
        detection_guidance: f.x_mitre_detection,
        data_source_names: f.x_mitre_data_sources,
      });
    }
    StixObject::Group(f) => bundle.groups.push(Group { meta, aliases: f.aliases }),
    StixObject::Software(kind, f) => bundle.software.push(Software {
      meta,
      kind,
      aliases: f.x_mitre_aliases,
      platforms: f.x_mitre_platforms,
    }),
    StixObject::Mitigation(_) => bundle.mitigations.push(Mitigation { meta }),
    StixObject::DataSource(f) => bundle.data_sources.push(DataSource {
      meta,
      platforms: f.x_mitre_platforms,
    }),
    StixObject::DataComponent(f) => bundle.data_components.push(DataComponent {
      meta,
      data_source_ref: f.x_mitre_data_source_ref,
    }),
    StixObject::Relationship(_) | StixObject::Unrecognized => {}
  }
}

// ─── Field helpers ───────────────────────────────────────────────────────────

/// The external id from the first reference whose source matches one of the
/// domain's authority tags, in tag priority order.
fn short_code(refs: &[ExternalReference], domain: CatalogDomain) -> Option<String> {
  domain.authority_tags().iter().find_map(|tag| {
    refs
      .iter()
      .find(|r| r.source_name == *tag)
      .and_then(|r| r.external_id.clone())
  })
}

/// `T1059.001` → `(true, Some("T1059"))`; `T1059` → `(false, None)`.
pub(crate) fn subtechnique_parts(short_code: &str) -> (bool, Option<String>) {
  match short_code.split_once(SUBTECHNIQUE_SEPARATOR) {
    Some((parent, _)) => (true, Some(parent.to_owned())),
    None => (false, None),
  }
}

/// Phase names declared under this domain's kill chains, deduplicated.
fn tactic_short_names(phases: &[KillChainPhase], domain: CatalogDomain) -> Vec<String> {
  let chains = domain.kill_chain_names();
  let mut names: Vec<String> = Vec::new();
  for phase in phases {
    if chains.contains(&phase.kill_chain_name.as_str()) && !names.contains(&phase.phase_name) {
      names.push(phase.phase_name.clone());
    }
  }
  names
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .ok()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
