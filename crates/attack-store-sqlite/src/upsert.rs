//! The body of the upsert transaction.
//!
//! Everything here runs synchronously on the database thread inside a single
//! transaction opened by [`SqliteStore::upsert_attack_data`]. Any error
//! propagates out before `commit`, so the transaction rolls back as a whole.
//!
//! [`SqliteStore::upsert_attack_data`]: attack_core::store::CatalogStore::upsert_attack_data

use std::collections::HashMap;

use attack_core::{
  catalog::{
    DataComponent, DataSource, Group, Mitigation, NormalizedBundle, PendingTechniqueTactic,
    RawObject, Relationship, Software, Tactic, Technique, UpsertReport,
  },
  relationship::{TechniqueEdge, classify_relationship},
};
use rusqlite::{Transaction, params};

use crate::encode::{encode_domain, encode_dt, encode_list};

/// Table and source column of a derived relationship join.
pub(crate) fn link_table(edge: TechniqueEdge) -> (&'static str, &'static str) {
  match edge {
    TechniqueEdge::GroupUses => ("group_technique_map", "group_id"),
    TechniqueEdge::SoftwareUses => ("software_technique_map", "software_id"),
    TechniqueEdge::Mitigates => ("mitigation_technique_map", "mitigation_id"),
    TechniqueEdge::Detects => ("data_component_technique_map", "data_component_id"),
  }
}

/// Upsert every bucket, then rebuild the domain's derived joins.
pub(crate) fn apply(tx: &Transaction<'_>, bundle: &NormalizedBundle) -> rusqlite::Result<UpsertReport> {
  let domain = encode_domain(bundle.domain);

  let raw_objects = upsert_raw_objects(tx, domain, &bundle.raw_objects)?;
  let tactics = upsert_tactics(tx, domain, &bundle.tactics)?;
  let techniques = upsert_techniques(tx, domain, &bundle.techniques, &bundle.technique_tactics)?;
  let groups = upsert_groups(tx, domain, &bundle.groups)?;
  let software = upsert_software(tx, domain, &bundle.software)?;
  let mitigations = upsert_mitigations(tx, domain, &bundle.mitigations)?;
  let data_sources = upsert_data_sources(tx, domain, &bundle.data_sources)?;
  let data_components = upsert_data_components(tx, domain, &bundle.data_components)?;
  let relationships = upsert_relationships(tx, domain, &bundle.relationships)?;

  let (phase_tags, edges) = if bundle.full_sync {
    (bundle.technique_tactics.clone(), batch_edges(&bundle.relationships))
  } else {
    (stored_phase_tags(tx, domain)?, stored_edges(tx, domain)?)
  };
  let technique_tactics = rebuild_technique_tactics(tx, domain, &phase_tags)?;
  let links = rebuild_technique_links(tx, domain, &edges)?;
  let linked = |edge: TechniqueEdge| links.get(&edge).copied().unwrap_or(0);

  Ok(UpsertReport {
    raw_objects,
    tactics,
    techniques,
    groups,
    software,
    mitigations,
    data_sources,
    data_components,
    relationships,
    technique_tactics,
    group_techniques: linked(TechniqueEdge::GroupUses),
    software_techniques: linked(TechniqueEdge::SoftwareUses),
    mitigation_techniques: linked(TechniqueEdge::Mitigates),
    data_component_techniques: linked(TechniqueEdge::Detects),
  })
}

fn json_list(items: &[String]) -> rusqlite::Result<String> {
  encode_list(items).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn phase_tags_by_technique(pending: &[PendingTechniqueTactic]) -> HashMap<&str, Vec<String>> {
  let mut by_technique: HashMap<&str, Vec<String>> = HashMap::new();
  for p in pending {
    by_technique
      .entry(p.technique_id.as_str())
      .or_default()
      .push(p.tactic_short_name.clone());
  }
  by_technique
}

// ─── Typed buckets ───────────────────────────────────────────────────────────
//
// Every statement is `INSERT … ON CONFLICT (domain, object_id) DO UPDATE` with
// all non-key columns taken from the incoming row.

fn upsert_raw_objects(tx: &Transaction<'_>, domain: &str, rows: &[RawObject]) -> rusqlite::Result<usize> {
  let mut stmt = tx.prepare_cached(
    "INSERT INTO attack_raw_objects (
       domain, object_id, object_type, spec_version, created,
       last_modified, is_revoked, raw_payload
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
     ON CONFLICT (domain, object_id) DO UPDATE SET
       object_type   = excluded.object_type,
       spec_version  = excluded.spec_version,
       created       = excluded.created,
       last_modified = excluded.last_modified,
       is_revoked    = excluded.is_revoked,
       raw_payload   = excluded.raw_payload",
  )?;
  for r in rows {
    stmt.execute(params![
      domain,
      r.object_id,
      r.object_type,
      r.spec_version,
      r.created.map(encode_dt),
      r.last_modified.map(encode_dt),
      r.is_revoked,
      r.raw_payload,
    ])?;
  }
  Ok(rows.len())
}

fn upsert_tactics(tx: &Transaction<'_>, domain: &str, rows: &[Tactic]) -> rusqlite::Result<usize> {
  let mut stmt = tx.prepare_cached(
    "INSERT INTO attack_tactics (
       domain, object_id, short_code, name, short_name, description,
       last_modified, is_revoked
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
     ON CONFLICT (domain, object_id) DO UPDATE SET
       short_code    = excluded.short_code,
       name          = excluded.name,
       short_name    = excluded.short_name,
       description   = excluded.description,
       last_modified = excluded.last_modified,
       is_revoked    = excluded.is_revoked",
  )?;
  for t in rows {
    stmt.execute(params![
      domain,
      t.meta.object_id,
      t.meta.short_code,
      t.meta.name,
      t.short_name,
      t.meta.description,
      t.meta.last_modified.map(encode_dt),
      t.meta.is_revoked,
    ])?;
  }
  Ok(rows.len())
}

fn upsert_techniques(
  tx: &Transaction<'_>,
  domain: &str,
  rows: &[Technique],
  pending: &[PendingTechniqueTactic],
) -> rusqlite::Result<usize> {
  let phase_tags = phase_tags_by_technique(pending);
  let mut stmt = tx.prepare_cached(
    "INSERT INTO attack_techniques (
       domain, object_id, short_code, name, description,
       is_subtechnique, parent_short_code, platforms, required_permissions,
       detection_guidance, data_source_names, tactic_short_names,
       last_modified, is_revoked
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
     ON CONFLICT (domain, object_id) DO UPDATE SET
       short_code           = excluded.short_code,
       name                 = excluded.name,
       description          = excluded.description,
       is_subtechnique      = excluded.is_subtechnique,
       parent_short_code    = excluded.parent_short_code,
       platforms            = excluded.platforms,
       required_permissions = excluded.required_permissions,
       detection_guidance   = excluded.detection_guidance,
       data_source_names    = excluded.data_source_names,
       tactic_short_names   = excluded.tactic_short_names,
       last_modified        = excluded.last_modified,
       is_revoked           = excluded.is_revoked",
  )?;
  for t in rows {
    stmt.execute(params![
      domain,
      t.meta.object_id,
      t.meta.short_code,
      t.meta.name,
      t.meta.description,
      t.is_subtechnique,
      t.parent_short_code,
      json_list(&t.platforms)?,
      json_list(&t.required_permissions)?,
      t.detection_guidance,
      json_list(&t.data_source_names)?,
      json_list(phase_tags.get(t.meta.object_id.as_str()).map_or(&[][..], Vec::as_slice))?,
      t.meta.last_modified.map(encode_dt),
      t.meta.is_revoked,
    ])?;
  }
  Ok(rows.len())
}

fn upsert_groups(tx: &Transaction<'_>, domain: &str, rows: &[Group]) -> rusqlite::Result<usize> {
  let mut stmt = tx.prepare_cached(
    "INSERT INTO attack_groups (
       domain, object_id, short_code, name, description, aliases,
       last_modified, is_revoked
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
     ON CONFLICT (domain, object_id) DO UPDATE SET
       short_code    = excluded.short_code,
       name          = excluded.name,
       description   = excluded.description,
       aliases       = excluded.aliases,
       last_modified = excluded.last_modified,
       is_revoked    = excluded.is_revoked",
  )?;
  for g in rows {
    stmt.execute(params![
      domain,
      g.meta.object_id,
      g.meta.short_code,
      g.meta.name,
      g.meta.description,
      json_list(&g.aliases)?,
      g.meta.last_modified.map(encode_dt),
      g.meta.is_revoked,
    ])?;
  }
  Ok(rows.len())
}

fn upsert_software(tx: &Transaction<'_>, domain: &str, rows: &[Software]) -> rusqlite::Result<usize> {
  let mut stmt = tx.prepare_cached(
    "INSERT INTO attack_software (
       domain, object_id, short_code, name, description, software_kind,
       aliases, platforms, last_modified, is_revoked
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
     ON CONFLICT (domain, object_id) DO UPDATE SET
       short_code    = excluded.short_code,
       name          = excluded.name,
       description   = excluded.description,
       software_kind = excluded.software_kind,
       aliases       = excluded.aliases,
       platforms     = excluded.platforms,
       last_modified = excluded.last_modified,
       is_revoked    = excluded.is_revoked",
  )?;
  for s in rows {
    stmt.execute(params![
      domain,
      s.meta.object_id,
      s.meta.short_code,
      s.meta.name,
      s.meta.description,
      s.kind.as_str(),
      json_list(&s.aliases)?,
      json_list(&s.platforms)?,
      s.meta.last_modified.map(encode_dt),
      s.meta.is_revoked,
    ])?;
  }
  Ok(rows.len())
}

fn upsert_mitigations(tx: &Transaction<'_>, domain: &str, rows: &[Mitigation]) -> rusqlite::Result<usize> {
  let mut stmt = tx.prepare_cached(
    "INSERT INTO attack_mitigations (
       domain, object_id, short_code, name, description, last_modified, is_revoked
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
     ON CONFLICT (domain, object_id) DO UPDATE SET
       short_code    = excluded.short_code,
       name          = excluded.name,
       description   = excluded.description,
       last_modified = excluded.last_modified,
       is_revoked    = excluded.is_revoked",
  )?;
  for m in rows {
    stmt.execute(params![
      domain,
      m.meta.object_id,
      m.meta.short_code,
      m.meta.name,
      m.meta.description,
      m.meta.last_modified.map(encode_dt),
      m.meta.is_revoked,
    ])?;
  }
  Ok(rows.len())
}

fn upsert_data_sources(tx: &Transaction<'_>, domain: &str, rows: &[DataSource]) -> rusqlite::Result<usize> {
  let mut stmt = tx.prepare_cached(
    "INSERT INTO attack_data_sources (
       domain, object_id, short_code, name, description, platforms,
       last_modified, is_revoked
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
     ON CONFLICT (domain, object_id) DO UPDATE SET
       short_code    = excluded.short_code,
       name          = excluded.name,
       description   = excluded.description,
       platforms     = excluded.platforms,
       last_modified = excluded.last_modified,
       is_revoked    = excluded.is_revoked",
  )?;
  for d in rows {
    stmt.execute(params![
      domain,
      d.meta.object_id,
      d.meta.short_code,
      d.meta.name,
      d.meta.description,
      json_list(&d.platforms)?,
      d.meta.last_modified.map(encode_dt),
      d.meta.is_revoked,
    ])?;
  }
  Ok(rows.len())
}

fn upsert_data_components(
  tx: &Transaction<'_>,
  domain: &str,
  rows: &[DataComponent],
) -> rusqlite::Result<usize> {
  let mut stmt = tx.prepare_cached(
    "INSERT INTO attack_data_components (
       domain, object_id, short_code, name, description, data_source_ref,
       last_modified, is_revoked
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
     ON CONFLICT (domain, object_id) DO UPDATE SET
       short_code      = excluded.short_code,
       name            = excluded.name,
       description     = excluded.description,
       data_source_ref = excluded.data_source_ref,
       last_modified   = excluded.last_modified,
       is_revoked      = excluded.is_revoked",
  )?;
  for d in rows {
    stmt.execute(params![
      domain,
      d.meta.object_id,
      d.meta.short_code,
      d.meta.name,
      d.meta.description,
      d.data_source_ref,
      d.meta.last_modified.map(encode_dt),
      d.meta.is_revoked,
    ])?;
  }
  Ok(rows.len())
}

fn upsert_relationships(
  tx: &Transaction<'_>,
  domain: &str,
  rows: &[Relationship],
) -> rusqlite::Result<usize> {
  let mut stmt = tx.prepare_cached(
    "INSERT INTO attack_relationships (
       domain, object_id, relationship_kind, source_ref, target_ref,
       last_modified, is_revoked
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
     ON CONFLICT (domain, object_id) DO UPDATE SET
       relationship_kind = excluded.relationship_kind,
       source_ref        = excluded.source_ref,
       target_ref        = excluded.target_ref,
       last_modified     = excluded.last_modified,
       is_revoked        = excluded.is_revoked",
  )?;
  for r in rows {
    stmt.execute(params![
      domain,
      r.object_id,
      r.relationship_kind,
      r.source_ref,
      r.target_ref,
      r.last_modified.map(encode_dt),
      r.is_revoked,
    ])?;
  }
  Ok(rows.len())
}

// ─── Derived joins ───────────────────────────────────────────────────────────

/// `(relationship_kind, source_ref, target_ref)` of a non-revoked edge.
type Edge = (String, String, String);

fn batch_edges(relationships: &[Relationship]) -> Vec<Edge> {
  relationships
    .iter()
    .filter(|r| !r.is_revoked)
    .map(|r| (r.relationship_kind.clone(), r.source_ref.clone(), r.target_ref.clone()))
    .collect()
}

/// Every non-revoked relationship stored for the domain, the current batch
/// included.
fn stored_edges(tx: &Transaction<'_>, domain: &str) -> rusqlite::Result<Vec<Edge>> {
  let mut stmt = tx.prepare_cached(
    "SELECT relationship_kind, source_ref, target_ref FROM attack_relationships
     WHERE domain = ?1 AND is_revoked = 0",
  )?;
  let rows = stmt.query_map(params![domain], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
  rows.collect()
}

/// Phase tags of every stored technique of the domain.
fn stored_phase_tags(
  tx: &Transaction<'_>,
  domain: &str,
) -> rusqlite::Result<Vec<PendingTechniqueTactic>> {
  let mut stmt = tx.prepare_cached(
    "SELECT object_id, tactic_short_names FROM attack_techniques WHERE domain = ?1",
  )?;
  let rows = stmt.query_map(params![domain], |row| {
    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
  })?;

  let mut pending = Vec::new();
  for row in rows {
    let (technique_id, tags) = row?;
    let short_names: Vec<String> = serde_json::from_str(&tags).map_err(|e| {
      rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    pending.extend(short_names.into_iter().map(|tactic_short_name| PendingTechniqueTactic {
      technique_id: technique_id.clone(),
      tactic_short_name,
    }));
  }
  Ok(pending)
}

/// Replace the domain's technique–tactic membership.
///
/// Phase tags resolve against every stored tactic of the domain, which at this
/// point includes the tactics upserted from the current bundle. When several
/// tactics share a short name the non-revoked one wins.
fn rebuild_technique_tactics(
  tx: &Transaction<'_>,
  domain: &str,
  pending: &[PendingTechniqueTactic],
) -> rusqlite::Result<usize> {
  tx.execute("DELETE FROM attack_technique_tactics WHERE domain = ?1", params![domain])?;

  let mut by_short_name: HashMap<String, String> = HashMap::new();
  {
    let mut stmt = tx.prepare(
      "SELECT short_name, object_id FROM attack_tactics
       WHERE domain = ?1 AND short_name IS NOT NULL
       ORDER BY is_revoked DESC, object_id",
    )?;
    let rows = stmt.query_map(params![domain], |row| {
      Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
      let (short_name, tactic_id) = row?;
      by_short_name.insert(short_name, tactic_id);
    }
  }

  let mut insert = tx.prepare_cached(
    "INSERT OR IGNORE INTO attack_technique_tactics (domain, technique_id, tactic_id)
     VALUES (?1, ?2, ?3)",
  )?;
  let mut written = 0;
  for p in pending {
    match by_short_name.get(&p.tactic_short_name) {
      Some(tactic_id) => written += insert.execute(params![domain, p.technique_id, tactic_id])?,
      None => tracing::debug!(
        domain,
        technique_id = %p.technique_id,
        short_name = %p.tactic_short_name,
        "no tactic with this short name"
      ),
    }
  }
  Ok(written)
}

/// Replace the domain's group/software/mitigation/data-component technique
/// maps with the classified `edges`.
fn rebuild_technique_links(
  tx: &Transaction<'_>,
  domain: &str,
  edges: &[Edge],
) -> rusqlite::Result<HashMap<TechniqueEdge, usize>> {
  for edge in TechniqueEdge::ALL {
    let (table, _) = link_table(edge);
    tx.execute(&format!("DELETE FROM {table} WHERE domain = ?1"), params![domain])?;
  }

  let mut written: HashMap<TechniqueEdge, usize> = HashMap::new();
  for (kind, source_ref, target_ref) in edges {
    let Some(edge) = classify_relationship(kind, source_ref, target_ref) else {
      continue;
    };
    let (table, column) = link_table(edge);
    let mut stmt = tx.prepare_cached(&format!(
      "INSERT OR IGNORE INTO {table} (domain, {column}, technique_id) VALUES (?1, ?2, ?3)"
    ))?;
    *written.entry(edge).or_default() += stmt.execute(params![domain, source_ref, target_ref])?;
  }
  Ok(written)
}
