//! SQL schema for the global rights SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per (central user, global group). Rows past their expiry are
-- invisible to reads and deleted by the purge sweep.
CREATE TABLE IF NOT EXISTS global_user_groups (
    gug_user    INTEGER NOT NULL,   -- central user id, always > 0
    gug_group   TEXT    NOT NULL,
    gug_expiry  TEXT,               -- YYYY-MM-DDTHH:MM:SSZ, NULL = permanent
    PRIMARY KEY (gug_user, gug_group)
);

CREATE INDEX IF NOT EXISTS gug_group_idx  ON global_user_groups(gug_group);
CREATE INDEX IF NOT EXISTS gug_expiry_idx ON global_user_groups(gug_expiry);

-- Append-only rights log. No UPDATE or DELETE is ever issued against it.
CREATE TABLE IF NOT EXISTS global_rights_log (
    log_id        TEXT PRIMARY KEY,
    subject       INTEGER NOT NULL,
    performer     TEXT    NOT NULL,
    recorded_at   TEXT    NOT NULL,   -- RFC 3339 UTC, nanosecond precision
    old_groups    TEXT    NOT NULL,   -- JSON array of group names
    new_groups    TEXT    NOT NULL,
    old_metadata  TEXT    NOT NULL,   -- JSON array aligned with old_groups
    new_metadata  TEXT    NOT NULL,
    reason        TEXT    NOT NULL DEFAULT '',
    tags          TEXT    NOT NULL DEFAULT '[]'
);

CREATE INDEX IF NOT EXISTS rights_log_subject_idx
    ON global_rights_log(subject, recorded_at);

PRAGMA user_version = 1;
";
