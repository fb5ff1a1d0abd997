//! Integration tests for `SqliteStore` against an in-memory database.

use attack_core::{
  CatalogDomain,
  catalog::{
    DataComponent, DataSource, EntryMeta, Group, Mitigation, NormalizedBundle,
    PendingTechniqueTactic, RawObject, Relationship, Software, SoftwareKind, Tactic, Technique,
    TechniqueLink, TechniqueTactic,
  },
  relationship::TechniqueEdge,
  store::CatalogStore,
  sync_state::SyncSuccess,
};
use chrono::{TimeZone, Utc};

use crate::{Error, SqliteStore};

const ENTERPRISE: CatalogDomain = CatalogDomain::Enterprise;
const MOBILE: CatalogDomain = CatalogDomain::Mobile;

const T1: &str = "attack-pattern--t1";
const T2: &str = "attack-pattern--t2";
const G1: &str = "intrusion-set--g1";
const S1: &str = "malware--s1";
const M1: &str = "course-of-action--m1";
const DS1: &str = "x-mitre-data-source--ds1";
const DC1: &str = "x-mitre-data-component--dc1";
const TA_EXEC: &str = "x-mitre-tactic--execution";

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

fn meta(id: &str, code: &str) -> EntryMeta {
  EntryMeta {
    object_id:     id.into(),
    short_code:    code.into(),
    name:          format!("{code} name"),
    description:   Some(format!("{code} description")),
    last_modified: Some(Utc.with_ymd_and_hms(2024, 4, 10, 22, 37, 36).unwrap()),
    is_revoked:    false,
  }
}

fn technique(id: &str, code: &str) -> Technique {
  Technique {
    meta:                 meta(id, code),
    is_subtechnique:      false,
    parent_short_code:    None,
    platforms:            vec!["Windows".into(), "Linux".into()],
    required_permissions: vec!["User".into()],
    detection_guidance:   Some("Watch process creation.".into()),
    data_source_names:    vec!["Process: Process Creation".into()],
  }
}

fn tactic(id: &str, code: &str, short_name: &str) -> Tactic {
  Tactic { meta: meta(id, code), short_name: Some(short_name.into()) }
}

fn rel(id: &str, kind: &str, source: &str, target: &str) -> Relationship {
  Relationship {
    object_id:         id.into(),
    relationship_kind: kind.into(),
    source_ref:        source.into(),
    target_ref:        target.into(),
    last_modified:     None,
    is_revoked:        false,
  }
}

fn pending(technique_id: &str, short_name: &str) -> PendingTechniqueTactic {
  PendingTechniqueTactic {
    technique_id:      technique_id.into(),
    tactic_short_name: short_name.into(),
  }
}

fn raw_object(
  id: &str,
  ty: &str,
  last_modified: Option<chrono::DateTime<Utc>>,
  is_revoked: bool,
) -> RawObject {
  RawObject {
    object_id: id.into(),
    object_type: ty.into(),
    spec_version: Some("2.1".into()),
    created: None,
    last_modified,
    is_revoked,
    raw_payload: format!(r#"{{"id":"{id}","type":"{ty}"}}"#),
  }
}

/// Fill in a raw object for every typed record, as the parser would.
fn with_raw(mut b: NormalizedBundle) -> NormalizedBundle {
  let metas: Vec<(EntryMeta, &str)> = b
    .tactics
    .iter()
    .map(|t| (t.meta.clone(), "x-mitre-tactic"))
    .chain(b.techniques.iter().map(|t| (t.meta.clone(), "attack-pattern")))
    .chain(b.groups.iter().map(|g| (g.meta.clone(), "intrusion-set")))
    .chain(b.software.iter().map(|s| (s.meta.clone(), s.kind.as_str())))
    .chain(b.mitigations.iter().map(|m| (m.meta.clone(), "course-of-action")))
    .chain(b.data_sources.iter().map(|d| (d.meta.clone(), "x-mitre-data-source")))
    .chain(b.data_components.iter().map(|d| (d.meta.clone(), "x-mitre-data-component")))
    .collect();
  let mut raws: Vec<RawObject> = metas
    .iter()
    .map(|(m, ty)| raw_object(&m.object_id, ty, m.last_modified, m.is_revoked))
    .collect();
  raws.extend(
    b.relationships
      .iter()
      .map(|r| raw_object(&r.object_id, "relationship", r.last_modified, r.is_revoked)),
  );
  b.raw_objects.extend(raws);
  b
}

fn data_source() -> DataSource {
  DataSource {
    meta:      meta(DS1, "DS0009"),
    platforms: vec!["Windows".into(), "macOS".into()],
  }
}

fn data_component() -> DataComponent {
  DataComponent {
    meta:            meta(DC1, "DC0032"),
    data_source_ref: Some(DS1.into()),
  }
}

fn link(source: &str, technique: &str) -> TechniqueLink {
  TechniqueLink { source_id: source.into(), technique_id: technique.into() }
}

/// A small but complete enterprise bundle, delivered by a full sync.
fn enterprise_bundle() -> NormalizedBundle {
  let mut b = NormalizedBundle::empty(ENTERPRISE);
  b.full_sync = true;
  b.tactics.push(tactic(TA_EXEC, "TA0002", "execution"));
  b.techniques.push(technique(T1, "T1059"));
  b.techniques.push(technique(T2, "T1106"));
  b.groups.push(Group { meta: meta(G1, "G0007"), aliases: vec!["APT28".into()] });
  b.software.push(Software {
    meta:      meta(S1, "S0002"),
    kind:      SoftwareKind::Malware,
    aliases:   vec![],
    platforms: vec!["Windows".into()],
  });
  b.mitigations.push(Mitigation { meta: meta(M1, "M1038") });
  b.data_sources.push(data_source());
  b.data_components.push(data_component());
  b.relationships.push(rel("relationship--r1", "uses", G1, T1));
  b.relationships.push(rel("relationship--r2", "uses", G1, T2));
  b.relationships.push(rel("relationship--r3", "uses", S1, T1));
  b.relationships.push(rel("relationship--r4", "mitigates", M1, T1));
  b.relationships.push(rel("relationship--r5", "detects", DC1, T2));
  b.relationships.push(rel("relationship--r6", "uses", G1, S1));
  b.technique_tactics.push(pending(T1, "execution"));
  b.technique_tactics.push(pending(T2, "execution"));
  with_raw(b)
}

// ─── Upsert ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_writes_every_bucket_and_join() {
  let s = store().await;
  let report = s.upsert_attack_data(enterprise_bundle()).await.unwrap();

  assert_eq!(report.techniques, 2);
  assert_eq!(report.relationships, 6);
  assert_eq!(report.group_techniques, 2);
  assert_eq!(report.software_techniques, 1);
  assert_eq!(report.mitigation_techniques, 1);
  assert_eq!(report.data_component_techniques, 1);
  assert_eq!(report.technique_tactics, 2);

  assert_eq!(report.data_sources, 1);
  assert_eq!(report.data_components, 1);

  let counts = s.catalog_counts(ENTERPRISE).await.unwrap();
  assert_eq!(counts.raw_objects, 14);
  assert_eq!(counts.techniques, 2);
  assert_eq!(counts.groups, 1);
  assert_eq!(counts.software, 1);
  assert_eq!(counts.mitigations, 1);
  assert_eq!(counts.data_sources, 1);
  assert_eq!(counts.data_components, 1);

  assert_eq!(
    s.technique_links(ENTERPRISE, TechniqueEdge::GroupUses).await.unwrap(),
    vec![link(G1, T1), link(G1, T2)]
  );
  assert_eq!(
    s.technique_links(ENTERPRISE, TechniqueEdge::SoftwareUses).await.unwrap(),
    vec![link(S1, T1)]
  );
  assert_eq!(
    s.technique_links(ENTERPRISE, TechniqueEdge::Mitigates).await.unwrap(),
    vec![link(M1, T1)]
  );
  assert_eq!(
    s.technique_links(ENTERPRISE, TechniqueEdge::Detects).await.unwrap(),
    vec![link(DC1, T2)]
  );
}

#[tokio::test]
async fn stored_technique_round_trips() {
  let s = store().await;
  s.upsert_attack_data(enterprise_bundle()).await.unwrap();

  let techniques = s.list_techniques(ENTERPRISE).await.unwrap();
  assert_eq!(techniques.len(), 2);
  assert_eq!(techniques[0], technique(T1, "T1059"));
}

#[tokio::test]
async fn upsert_is_idempotent() {
  let s = store().await;
  s.upsert_attack_data(enterprise_bundle()).await.unwrap();
  let counts_once = s.catalog_counts(ENTERPRISE).await.unwrap();
  let techniques_once = s.list_techniques(ENTERPRISE).await.unwrap();
  let tactics_once = s.technique_tactics(ENTERPRISE).await.unwrap();
  let mut links_once = Vec::new();
  for edge in TechniqueEdge::ALL {
    links_once.push(s.technique_links(ENTERPRISE, edge).await.unwrap());
  }

  s.upsert_attack_data(enterprise_bundle()).await.unwrap();
  assert_eq!(s.catalog_counts(ENTERPRISE).await.unwrap(), counts_once);
  assert_eq!(s.list_techniques(ENTERPRISE).await.unwrap(), techniques_once);
  assert_eq!(s.technique_tactics(ENTERPRISE).await.unwrap(), tactics_once);
  for (edge, once) in TechniqueEdge::ALL.into_iter().zip(links_once) {
    assert_eq!(s.technique_links(ENTERPRISE, edge).await.unwrap(), once);
  }
}

#[tokio::test]
async fn last_writer_wins_on_conflict() {
  let s = store().await;
  s.upsert_attack_data(enterprise_bundle()).await.unwrap();

  let mut b = NormalizedBundle::empty(ENTERPRISE);
  let mut renamed = technique(T1, "T1059");
  renamed.meta.name = "Renamed".into();
  renamed.platforms = vec!["macOS".into()];
  renamed.detection_guidance = None;
  b.techniques.push(renamed.clone());
  s.upsert_attack_data(with_raw(b)).await.unwrap();

  let techniques = s.list_techniques(ENTERPRISE).await.unwrap();
  let stored = techniques.iter().find(|t| t.meta.object_id == T1).unwrap();
  assert_eq!(stored, &renamed);
  assert_eq!(s.catalog_counts(ENTERPRISE).await.unwrap().techniques, 2);
}

#[tokio::test]
async fn data_sources_and_components_round_trip() {
  let s = store().await;
  s.upsert_attack_data(enterprise_bundle()).await.unwrap();

  assert_eq!(s.list_data_sources(ENTERPRISE).await.unwrap(), vec![data_source()]);
  let components = s.list_data_components(ENTERPRISE).await.unwrap();
  assert_eq!(components, vec![data_component()]);
  assert_eq!(components[0].data_source_ref.as_deref(), Some(DS1));

  // A later version re-parents the component and changes the platforms.
  let mut b = NormalizedBundle::empty(ENTERPRISE);
  let mut source = data_source();
  source.platforms = vec!["Linux".into()];
  let mut component = data_component();
  component.meta.name = "Process Creation".into();
  component.data_source_ref = Some("x-mitre-data-source--ds2".into());
  b.data_sources.push(source.clone());
  b.data_components.push(component.clone());
  s.upsert_attack_data(with_raw(b)).await.unwrap();

  assert_eq!(s.list_data_sources(ENTERPRISE).await.unwrap(), vec![source]);
  assert_eq!(s.list_data_components(ENTERPRISE).await.unwrap(), vec![component]);
  let counts = s.catalog_counts(ENTERPRISE).await.unwrap();
  assert_eq!(counts.data_sources, 1);
  assert_eq!(counts.data_components, 1);
}

#[tokio::test]
async fn revoked_records_are_kept() {
  let s = store().await;
  let mut b = NormalizedBundle::empty(ENTERPRISE);
  let mut revoked = technique(T1, "T1059");
  revoked.meta.is_revoked = true;
  b.techniques.push(revoked);
  s.upsert_attack_data(with_raw(b)).await.unwrap();

  let techniques = s.list_techniques(ENTERPRISE).await.unwrap();
  assert_eq!(techniques.len(), 1);
  assert!(techniques[0].meta.is_revoked);
}

#[tokio::test]
async fn empty_bundle_is_a_noop() {
  let s = store().await;
  s.upsert_attack_data(enterprise_bundle()).await.unwrap();

  let report = s
    .upsert_attack_data(NormalizedBundle::empty(ENTERPRISE))
    .await
    .unwrap();
  assert_eq!(report, Default::default());
  assert_eq!(
    s.technique_links(ENTERPRISE, TechniqueEdge::GroupUses).await.unwrap().len(),
    2
  );
  assert_eq!(s.technique_tactics(ENTERPRISE).await.unwrap().len(), 2);
}

// ─── Derived joins ───────────────────────────────────────────────────────────

#[tokio::test]
async fn join_rebuild_drops_edges_missing_from_the_new_batch() {
  let s = store().await;
  s.upsert_attack_data(enterprise_bundle()).await.unwrap();

  // Same graph in another domain.
  let mut mobile = enterprise_bundle();
  mobile.domain = MOBILE;
  s.upsert_attack_data(mobile).await.unwrap();

  // A row no relationship justifies.
  s.conn
    .call(|conn| {
      conn.execute(
        "INSERT INTO group_technique_map (domain, group_id, technique_id)
         VALUES ('enterprise', 'intrusion-set--stale', 'attack-pattern--stale')",
        [],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  // Fresh full enterprise sync without the G1 → T1 edge.
  let mut b = NormalizedBundle::empty(ENTERPRISE);
  b.full_sync = true;
  b.relationships.push(rel("relationship--r2", "uses", G1, T2));
  s.upsert_attack_data(with_raw(b)).await.unwrap();

  assert_eq!(
    s.technique_links(ENTERPRISE, TechniqueEdge::GroupUses).await.unwrap(),
    vec![link(G1, T2)]
  );
  assert!(s.technique_links(ENTERPRISE, TechniqueEdge::SoftwareUses).await.unwrap().is_empty());
  assert_eq!(
    s.technique_links(MOBILE, TechniqueEdge::GroupUses).await.unwrap(),
    vec![link(G1, T1), link(G1, T2)]
  );
  // Relationship rows themselves are never deleted.
  assert_eq!(s.catalog_counts(ENTERPRISE).await.unwrap().relationships, 6);
}

#[tokio::test]
async fn delta_rebuild_keeps_links_justified_by_stored_relationships() {
  let s = store().await;
  s.upsert_attack_data(enterprise_bundle()).await.unwrap();
  let mut before = Vec::new();
  for edge in TechniqueEdge::ALL {
    before.push(s.technique_links(ENTERPRISE, edge).await.unwrap());
  }

  s.conn
    .call(|conn| {
      conn.execute(
        "INSERT INTO group_technique_map (domain, group_id, technique_id)
         VALUES ('enterprise', 'intrusion-set--stale', 'attack-pattern--stale')",
        [],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  // Delta carrying one new technique and nothing else.
  let mut delta = NormalizedBundle::empty(ENTERPRISE);
  delta.techniques.push(technique("attack-pattern--t3", "T1204"));
  delta.technique_tactics.push(pending("attack-pattern--t3", "execution"));
  let report = s.upsert_attack_data(with_raw(delta)).await.unwrap();

  assert_eq!(report.group_techniques, 2);
  assert_eq!(report.technique_tactics, 3);
  for (edge, links) in TechniqueEdge::ALL.into_iter().zip(before) {
    assert_eq!(s.technique_links(ENTERPRISE, edge).await.unwrap(), links);
  }
  let tactic_of = |technique_id: &str| TechniqueTactic {
    technique_id: technique_id.into(),
    tactic_id:    TA_EXEC.into(),
  };
  assert_eq!(
    s.technique_tactics(ENTERPRISE).await.unwrap(),
    vec![tactic_of(T1), tactic_of(T2), tactic_of("attack-pattern--t3")]
  );
}

#[tokio::test]
async fn delta_revocation_removes_the_link() {
  let s = store().await;
  s.upsert_attack_data(enterprise_bundle()).await.unwrap();

  let mut delta = NormalizedBundle::empty(ENTERPRISE);
  let mut revoked = rel("relationship--r1", "uses", G1, T1);
  revoked.is_revoked = true;
  delta.relationships.push(revoked);
  s.upsert_attack_data(with_raw(delta)).await.unwrap();

  assert_eq!(
    s.technique_links(ENTERPRISE, TechniqueEdge::GroupUses).await.unwrap(),
    vec![link(G1, T2)]
  );
  assert_eq!(
    s.technique_links(ENTERPRISE, TechniqueEdge::SoftwareUses).await.unwrap(),
    vec![link(S1, T1)]
  );
}

#[tokio::test]
async fn revoked_relationships_add_no_links() {
  let s = store().await;
  let mut b = NormalizedBundle::empty(ENTERPRISE);
  let mut revoked = rel("relationship--r1", "uses", G1, T1);
  revoked.is_revoked = true;
  b.relationships.push(revoked);
  b.relationships.push(rel("relationship--r2", "uses", G1, T2));
  s.upsert_attack_data(with_raw(b)).await.unwrap();

  assert_eq!(
    s.technique_links(ENTERPRISE, TechniqueEdge::GroupUses).await.unwrap(),
    vec![link(G1, T2)]
  );
  assert_eq!(s.catalog_counts(ENTERPRISE).await.unwrap().relationships, 2);
}

#[tokio::test]
async fn phase_tags_resolve_against_previously_stored_tactics() {
  let s = store().await;
  let mut first = NormalizedBundle::empty(ENTERPRISE);
  first.tactics.push(tactic(TA_EXEC, "TA0002", "execution"));
  s.upsert_attack_data(with_raw(first)).await.unwrap();

  // Delta carrying the technique but not its tactic.
  let mut delta = NormalizedBundle::empty(ENTERPRISE);
  delta.techniques.push(technique(T1, "T1059"));
  delta.technique_tactics.push(pending(T1, "execution"));
  delta.technique_tactics.push(pending(T1, "no-such-phase"));
  let report = s.upsert_attack_data(with_raw(delta)).await.unwrap();

  assert_eq!(report.technique_tactics, 1);
  assert_eq!(
    s.technique_tactics(ENTERPRISE).await.unwrap(),
    vec![TechniqueTactic { technique_id: T1.into(), tactic_id: TA_EXEC.into() }]
  );
}

#[tokio::test]
async fn non_revoked_tactic_wins_a_short_name_clash() {
  let s = store().await;
  let mut b = NormalizedBundle::empty(ENTERPRISE);
  let mut old = tactic("x-mitre-tactic--old", "TA0002", "execution");
  old.meta.is_revoked = true;
  b.tactics.push(old);
  b.tactics.push(tactic(TA_EXEC, "TA0002", "execution"));
  b.techniques.push(technique(T1, "T1059"));
  b.technique_tactics.push(pending(T1, "execution"));
  s.upsert_attack_data(with_raw(b)).await.unwrap();

  let rows = s.technique_tactics(ENTERPRISE).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].tactic_id, TA_EXEC);
}

#[tokio::test]
async fn failed_upsert_rolls_back_everything() {
  let s = store().await;
  s.conn
    .call(|conn| {
      conn.execute_batch(
        "CREATE TRIGGER reject_links BEFORE INSERT ON group_technique_map
         BEGIN SELECT RAISE(ABORT, 'link rejected'); END;",
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let err = s.upsert_attack_data(enterprise_bundle()).await.unwrap_err();
  assert!(matches!(err, Error::Database(_)), "got {err:?}");

  let counts = s.catalog_counts(ENTERPRISE).await.unwrap();
  assert_eq!(counts, Default::default());
}

// ─── Sync state ──────────────────────────────────────────────────────────────

fn success(hour: u32, full_sync: bool) -> SyncSuccess {
  let at = Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap();
  SyncSuccess {
    completed_at: at,
    watermark: format!("2024-05-01T{hour:02}:00:00.000Z"),
    full_sync,
  }
}

#[tokio::test]
async fn missing_sync_state_is_none() {
  let s = store().await;
  assert!(s.get_sync_state(ENTERPRISE).await.unwrap().is_none());
  assert!(s.list_sync_states().await.unwrap().is_empty());
}

#[tokio::test]
async fn success_then_failure_then_success() {
  let s = store().await;

  let state = s.record_sync_success(ENTERPRISE, success(1, true)).await.unwrap();
  assert!(state.is_delta_ready());
  assert_eq!(state.last_added_after_watermark.as_deref(), Some("2024-05-01T01:00:00.000Z"));
  assert_eq!(state.last_full_sync_at, Some(Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap()));
  assert_eq!(state.last_error, None);

  let failed = s
    .record_sync_failure(ENTERPRISE, "GET … → 503".into())
    .await
    .unwrap();
  assert_eq!(failed.last_error.as_deref(), Some("GET … → 503"));
  assert_eq!(failed.last_added_after_watermark, state.last_added_after_watermark);
  assert_eq!(failed.last_successful_sync_at, state.last_successful_sync_at);
  assert_eq!(failed.last_full_sync_at, state.last_full_sync_at);

  let delta = s.record_sync_success(ENTERPRISE, success(2, false)).await.unwrap();
  assert_eq!(delta.last_error, None);
  assert_eq!(delta.last_added_after_watermark.as_deref(), Some("2024-05-01T02:00:00.000Z"));
  // A delta run leaves the last full sync time alone.
  assert_eq!(delta.last_full_sync_at, state.last_full_sync_at);
  assert_eq!(
    delta.last_successful_sync_at,
    Some(Utc.with_ymd_and_hms(2024, 5, 1, 2, 0, 0).unwrap())
  );
}

#[tokio::test]
async fn unknown_domain_in_a_stored_row_is_a_core_error() {
  let s = store().await;
  s.conn
    .call(|conn| {
      conn.execute(
        "INSERT INTO attack_sync_state (domain, updated_at)
         VALUES ('pre-attack', '2024-05-01T00:00:00Z')",
        [],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let err = s.list_sync_states().await.unwrap_err();
  assert!(
    matches!(err, Error::Core(attack_core::Error::UnknownDomain(ref d)) if d == "pre-attack"),
    "got {err:?}"
  );
}

#[tokio::test]
async fn failure_before_any_success_creates_an_error_row() {
  let s = store().await;
  let state = s.record_sync_failure(MOBILE, "boom".into()).await.unwrap();
  assert_eq!(state.domain, MOBILE);
  assert_eq!(state.last_error.as_deref(), Some("boom"));
  assert!(!state.is_delta_ready());

  let all = s.list_sync_states().await.unwrap();
  assert_eq!(all.len(), 1);
  assert!(s.get_sync_state(ENTERPRISE).await.unwrap().is_none());
}
