//! SQL schema for the catalog store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Every fetched record, whatever its type.
CREATE TABLE IF NOT EXISTS attack_raw_objects (
    domain        TEXT NOT NULL,
    object_id     TEXT NOT NULL,
    object_type   TEXT NOT NULL,
    spec_version  TEXT,
    created       TEXT,
    last_modified TEXT,
    is_revoked    INTEGER NOT NULL DEFAULT 0,
    raw_payload   TEXT NOT NULL,    -- compact JSON, as received
    PRIMARY KEY (domain, object_id)
);

CREATE TABLE IF NOT EXISTS attack_tactics (
    domain        TEXT NOT NULL,
    object_id     TEXT NOT NULL,
    short_code    TEXT NOT NULL,
    name          TEXT NOT NULL,
    short_name    TEXT,             -- phase name techniques join on
    description   TEXT,
    last_modified TEXT,
    is_revoked    INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (domain, object_id)
);

CREATE TABLE IF NOT EXISTS attack_techniques (
    domain               TEXT NOT NULL,
    object_id            TEXT NOT NULL,
    short_code           TEXT NOT NULL,
    name                 TEXT NOT NULL,
    description          TEXT,
    is_subtechnique      INTEGER NOT NULL DEFAULT 0,
    parent_short_code    TEXT,
    platforms            TEXT NOT NULL DEFAULT '[]',
    required_permissions TEXT NOT NULL DEFAULT '[]',
    detection_guidance   TEXT,
    data_source_names    TEXT NOT NULL DEFAULT '[]',
    tactic_short_names   TEXT NOT NULL DEFAULT '[]',    -- phase tags, resolved on delta rebuilds
    last_modified        TEXT,
    is_revoked           INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (domain, object_id)
);

CREATE TABLE IF NOT EXISTS attack_groups (
    domain        TEXT NOT NULL,
    object_id     TEXT NOT NULL,
    short_code    TEXT NOT NULL,
    name          TEXT NOT NULL,
    description   TEXT,
    aliases       TEXT NOT NULL DEFAULT '[]',
    last_modified TEXT,
    is_revoked    INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (domain, object_id)
);

CREATE TABLE IF NOT EXISTS attack_software (
    domain        TEXT NOT NULL,
    object_id     TEXT NOT NULL,
    short_code    TEXT NOT NULL,
    name          TEXT NOT NULL,
    description   TEXT,
    software_kind TEXT NOT NULL,    -- 'malware' | 'tool'
    aliases       TEXT NOT NULL DEFAULT '[]',
    platforms     TEXT NOT NULL DEFAULT '[]',
    last_modified TEXT,
    is_revoked    INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (domain, object_id)
);

CREATE TABLE IF NOT EXISTS attack_mitigations (
    domain        TEXT NOT NULL,
    object_id     TEXT NOT NULL,
    short_code    TEXT NOT NULL,
    name          TEXT NOT NULL,
    description   TEXT,
    last_modified TEXT,
    is_revoked    INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (domain, object_id)
);

CREATE TABLE IF NOT EXISTS attack_data_sources (
    domain        TEXT NOT NULL,
    object_id     TEXT NOT NULL,
    short_code    TEXT NOT NULL,
    name          TEXT NOT NULL,
    description   TEXT,
    platforms     TEXT NOT NULL DEFAULT '[]',
    last_modified TEXT,
    is_revoked    INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (domain, object_id)
);

CREATE TABLE IF NOT EXISTS attack_data_components (
    domain          TEXT NOT NULL,
    object_id       TEXT NOT NULL,
    short_code      TEXT NOT NULL,
    name            TEXT NOT NULL,
    description     TEXT,
    data_source_ref TEXT,
    last_modified   TEXT,
    is_revoked      INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (domain, object_id)
);

-- Upserted, never deleted.
CREATE TABLE IF NOT EXISTS attack_relationships (
    domain            TEXT NOT NULL,
    object_id         TEXT NOT NULL,
    relationship_kind TEXT NOT NULL,
    source_ref        TEXT NOT NULL,
    target_ref        TEXT NOT NULL,
    last_modified     TEXT,
    is_revoked        INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (domain, object_id)
);

-- Derived joins: deleted and rebuilt per domain on every non-empty sync,
-- from the batch on a full sync and from stored rows on a delta sync.
CREATE TABLE IF NOT EXISTS attack_technique_tactics (
    domain       TEXT NOT NULL,
    technique_id TEXT NOT NULL,
    tactic_id    TEXT NOT NULL,
    PRIMARY KEY (domain, technique_id, tactic_id)
);

CREATE TABLE IF NOT EXISTS group_technique_map (
    domain       TEXT NOT NULL,
    group_id     TEXT NOT NULL,
    technique_id TEXT NOT NULL,
    PRIMARY KEY (domain, group_id, technique_id)
);

CREATE TABLE IF NOT EXISTS software_technique_map (
    domain       TEXT NOT NULL,
    software_id  TEXT NOT NULL,
    technique_id TEXT NOT NULL,
    PRIMARY KEY (domain, software_id, technique_id)
);

CREATE TABLE IF NOT EXISTS mitigation_technique_map (
    domain        TEXT NOT NULL,
    mitigation_id TEXT NOT NULL,
    technique_id  TEXT NOT NULL,
    PRIMARY KEY (domain, mitigation_id, technique_id)
);

CREATE TABLE IF NOT EXISTS data_component_technique_map (
    domain            TEXT NOT NULL,
    data_component_id TEXT NOT NULL,
    technique_id      TEXT NOT NULL,
    PRIMARY KEY (domain, data_component_id, technique_id)
);

-- One row per domain, owned by the orchestrator.
CREATE TABLE IF NOT EXISTS attack_sync_state (
    domain                     TEXT PRIMARY KEY,
    last_successful_sync_at    TEXT,
    last_added_after_watermark TEXT,
    last_full_sync_at          TEXT,
    last_error                 TEXT,
    updated_at                 TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS techniques_short_code_idx ON attack_techniques(domain, short_code);
CREATE INDEX IF NOT EXISTS tactics_short_name_idx    ON attack_tactics(domain, short_name);
CREATE INDEX IF NOT EXISTS relationships_kind_idx    ON attack_relationships(domain, relationship_kind);

PRAGMA user_version = 1;
";
