//! SQL migration definitions for the newsdigest database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: channels, subscribers",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Source channels, refreshed by the registry each cycle
CREATE TABLE IF NOT EXISTS channels (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    handle          TEXT NOT NULL UNIQUE,
    title           TEXT NOT NULL,
    added_at        TEXT NOT NULL,
    last_checked_at TEXT
);

-- Digest recipients
CREATE TABLE IF NOT EXISTS subscribers (
    user_id             INTEGER PRIMARY KEY,
    username            TEXT,
    status              TEXT NOT NULL DEFAULT 'active',
    added_at            TEXT NOT NULL,
    last_interaction_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_subscribers_status ON subscribers(status);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Digest archive and per-recipient delivery records",
            sql: r#"
CREATE TABLE IF NOT EXISTS digests (
    id          TEXT PRIMARY KEY,
    digest_date TEXT NOT NULL UNIQUE,
    content     TEXT NOT NULL,
    item_count  INTEGER NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS delivery_records (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    digest_id   TEXT NOT NULL REFERENCES digests(id) ON DELETE CASCADE,
    digest_date TEXT NOT NULL,
    user_id     INTEGER NOT NULL,
    outcome     TEXT NOT NULL,
    chunks_sent INTEGER NOT NULL DEFAULT 0,
    error       TEXT,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_delivery_records_date ON delivery_records(digest_date);
CREATE INDEX IF NOT EXISTS idx_delivery_records_user ON delivery_records(user_id);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
