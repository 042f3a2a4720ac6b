// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Schema bootstrap.  One table per entity; `CREATE TABLE IF NOT EXISTS`
//! makes startup idempotent.  Cascading deletes exist only where the child
//! has no life of its own (warnings, broadcast recipients, memento keywords);
//! agent names inside queue/message rows are plain strings so deleting an
//! agent preserves history.

pub(crate) const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS agents (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL UNIQUE COLLATE NOCASE,
    key_hash      TEXT NOT NULL,
    key_prefix    TEXT NOT NULL,
    bio           TEXT,
    webhook_url   TEXT,
    webhook_token TEXT,
    enabled       INTEGER NOT NULL DEFAULT 1,
    raw_results   INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS credentials (
    service      TEXT NOT NULL,
    account_name TEXT NOT NULL,
    data         TEXT NOT NULL,
    PRIMARY KEY (service, account_name)
);

CREATE TABLE IF NOT EXISTS access_policies (
    service      TEXT NOT NULL,
    account_name TEXT NOT NULL,
    mode         TEXT NOT NULL DEFAULT 'all',
    agents       TEXT NOT NULL DEFAULT '[]',
    PRIMARY KEY (service, account_name)
);

CREATE TABLE IF NOT EXISTS agent_bypass (
    service      TEXT NOT NULL,
    account_name TEXT NOT NULL,
    agent_name   TEXT NOT NULL COLLATE NOCASE,
    bypass_auth  INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (service, account_name, agent_name)
);

CREATE TABLE IF NOT EXISTS queue_entries (
    id               TEXT PRIMARY KEY,
    service          TEXT NOT NULL,
    account_name     TEXT NOT NULL,
    requests         TEXT NOT NULL,
    comment          TEXT NOT NULL,
    submitted_by     TEXT NOT NULL COLLATE NOCASE,
    submitted_at     TEXT NOT NULL,
    status           TEXT NOT NULL DEFAULT 'pending',
    reviewed_at      TEXT,
    rejection_reason TEXT,
    completed_at     TEXT,
    results          TEXT,
    auto_approved    INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_queue_status ON queue_entries (status);
CREATE INDEX IF NOT EXISTS idx_queue_submitter ON queue_entries (submitted_by);

CREATE TABLE IF NOT EXISTS queue_warnings (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    queue_id   TEXT NOT NULL REFERENCES queue_entries (id) ON DELETE CASCADE,
    warned_by  TEXT NOT NULL,
    message    TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS agent_messages (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    from_agent       TEXT NOT NULL COLLATE NOCASE,
    to_agent         TEXT NOT NULL COLLATE NOCASE,
    body             TEXT NOT NULL,
    status           TEXT NOT NULL,
    rejection_reason TEXT,
    created_at       TEXT NOT NULL,
    delivered_at     TEXT,
    read_at          TEXT
);
CREATE INDEX IF NOT EXISTS idx_messages_to ON agent_messages (to_agent, status);

CREATE TABLE IF NOT EXISTS broadcasts (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    from_agent       TEXT NOT NULL COLLATE NOCASE,
    body             TEXT NOT NULL,
    total_recipients INTEGER NOT NULL,
    created_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS broadcast_recipients (
    broadcast_id INTEGER NOT NULL REFERENCES broadcasts (id) ON DELETE CASCADE,
    to_agent     TEXT NOT NULL,
    status       TEXT NOT NULL,
    error        TEXT,
    PRIMARY KEY (broadcast_id, to_agent)
);

CREATE TABLE IF NOT EXISTS mementos (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_id   INTEGER NOT NULL,
    model      TEXT,
    role       TEXT,
    content    TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_mementos_agent ON mementos (agent_id);

CREATE TABLE IF NOT EXISTS memento_keywords (
    memento_id   INTEGER NOT NULL REFERENCES mementos (id) ON DELETE CASCADE,
    keyword_stem TEXT NOT NULL,
    PRIMARY KEY (memento_id, keyword_stem)
);
CREATE INDEX IF NOT EXISTS idx_keyword_stem ON memento_keywords (keyword_stem);

CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    agent_name TEXT NOT NULL COLLATE NOCASE,
    created_at TEXT NOT NULL,
    last_seen  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS settings (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS webhook_log (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    source      TEXT NOT NULL,
    event       TEXT NOT NULL,
    delivery_id TEXT,
    status      TEXT NOT NULL,
    detail      TEXT,
    created_at  TEXT NOT NULL
);
"#;
