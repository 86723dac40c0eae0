//! SQL schema for the quill SQLite store.
//!
//! Executed once at connection startup. Uniqueness and partial-uniqueness
//! constraints are the principal integrity mechanism: concurrent writers
//! that would violate a chain invariant get a clean constraint error, never
//! a silent double-write.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS document_versions (
    id                    TEXT PRIMARY KEY,
    chain_id              TEXT NOT NULL,
    version_number        INTEGER NOT NULL,
    issue_state           TEXT NOT NULL,   -- 'draft' | 'issued' | 'superseded'
    superseded_by         TEXT REFERENCES document_versions(id),
    title                 TEXT NOT NULL,
    document_type         TEXT NOT NULL,
    scope                 TEXT,
    created_at            TEXT NOT NULL,   -- ISO 8601 UTC
    created_by            TEXT NOT NULL,
    issued_at             TEXT,
    issued_by             TEXT,
    requires_approval     INTEGER NOT NULL DEFAULT 0,
    approved_at           TEXT,
    approved_by           TEXT,
    artifact_ref          TEXT,            -- opaque blob pointer
    artifact_checksum     TEXT,            -- SHA-256 hex
    artifact_size         INTEGER,
    artifact_generated_at TEXT,
    issue_error           TEXT,
    UNIQUE (chain_id, version_number),
    CHECK  (version_number > 0)
);

-- At most one draft per chain.
CREATE UNIQUE INDEX IF NOT EXISTS one_draft_per_chain
    ON document_versions(chain_id) WHERE issue_state = 'draft';

-- At most one issued version per chain.
CREATE UNIQUE INDEX IF NOT EXISTS one_issued_per_chain
    ON document_versions(chain_id) WHERE issue_state = 'issued';

-- Reference-number allocator, scoped per chain. Read-then-reserve happens
-- inside the same transaction as the action insert.
CREATE TABLE IF NOT EXISTS chain_counters (
    chain_id       TEXT PRIMARY KEY,
    next_reference INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS actions (
    id                TEXT PRIMARY KEY,
    version_id        TEXT NOT NULL REFERENCES document_versions(id),
    source_version_id TEXT NOT NULL,
    origin_action_id  TEXT REFERENCES actions(id),
    reference_number  TEXT NOT NULL,
    title             TEXT NOT NULL,
    description       TEXT,
    status            TEXT NOT NULL,
    created_at        TEXT NOT NULL,
    created_by        TEXT NOT NULL,
    closed_at         TEXT,
    closed_by         TEXT,
    closure_note      TEXT,
    reopened_at       TEXT,
    reopened_by       TEXT,
    reopen_note       TEXT,
    deleted_at        TEXT,
    deleted_by        TEXT
);

-- Carry-forward is idempotent: one copy per origin per version.
CREATE UNIQUE INDEX IF NOT EXISTS one_carry_per_origin
    ON actions(version_id, origin_action_id) WHERE origin_action_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS answers (
    version_id  TEXT NOT NULL REFERENCES document_versions(id),
    section_key TEXT NOT NULL,
    field_key   TEXT NOT NULL,
    value_json  TEXT NOT NULL,
    rating      TEXT,            -- normalised lower-case
    updated_at  TEXT NOT NULL,
    updated_by  TEXT NOT NULL,
    PRIMARY KEY (version_id, section_key, field_key)
);

CREATE TABLE IF NOT EXISTS recommendation_triggers (
    id           TEXT PRIMARY KEY,
    section_key  TEXT NOT NULL,
    field_key    TEXT NOT NULL,
    rating_value TEXT NOT NULL,  -- stored lower-case
    template_id  TEXT NOT NULL,
    priority     INTEGER NOT NULL DEFAULT 0,
    is_active    INTEGER NOT NULL DEFAULT 1,
    UNIQUE (section_key, field_key, rating_value, template_id)
);

-- Instances are retained forever; improvement soft-retracts via
-- include_in_report rather than deleting.
CREATE TABLE IF NOT EXISTS recommendation_instances (
    id                TEXT PRIMARY KEY,
    version_id        TEXT NOT NULL REFERENCES document_versions(id),
    section_key       TEXT NOT NULL,
    field_key         TEXT NOT NULL,
    rating_value      TEXT NOT NULL,
    template_id       TEXT NOT NULL,
    trigger_key       TEXT NOT NULL,
    include_in_report INTEGER NOT NULL DEFAULT 1,
    created_at        TEXT NOT NULL,
    UNIQUE (version_id, trigger_key, template_id)
);

-- Append-only; regeneration inserts a new row, readers take the latest.
CREATE TABLE IF NOT EXISTS change_summaries (
    id                   TEXT PRIMARY KEY,
    new_version_id       TEXT NOT NULL REFERENCES document_versions(id),
    previous_version_id  TEXT NOT NULL REFERENCES document_versions(id),
    new_actions_count    INTEGER NOT NULL,
    closed_actions_count INTEGER NOT NULL,
    outstanding_count    INTEGER NOT NULL,
    delta_json           TEXT NOT NULL,
    created_at           TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS versions_chain_idx     ON document_versions(chain_id);
CREATE INDEX IF NOT EXISTS actions_version_idx    ON actions(version_id);
CREATE INDEX IF NOT EXISTS instances_version_idx  ON recommendation_instances(version_id);
CREATE INDEX IF NOT EXISTS triggers_field_idx     ON recommendation_triggers(section_key, field_key);
CREATE INDEX IF NOT EXISTS summaries_version_idx  ON change_summaries(new_version_id);

PRAGMA user_version = 1;
";
