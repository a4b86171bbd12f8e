//! DDL for the cache store.

/// Bookkeeping table, never dropped by migrations.
pub const META_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS store_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Cached items and their pagination keys.
///
/// Any edit to this text changes its fingerprint, which wipes and recreates
/// both tables on next open.
pub const SCHEMA: &str = r#"
-- Cached items (payload is serialized JSON)
CREATE TABLE IF NOT EXISTS items (
    identity TEXT PRIMARY KEY,
    payload BLOB NOT NULL,
    sort_key TEXT,
    bookmarked INTEGER NOT NULL DEFAULT 0,
    inserted_at INTEGER NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_items_inserted ON items(inserted_at);
CREATE INDEX IF NOT EXISTS idx_items_bookmarked ON items(bookmarked, sort_key);

-- Pagination cursors, one row per item
CREATE TABLE IF NOT EXISTS page_keys (
    identity TEXT PRIMARY KEY,
    prev_key INTEGER,
    next_key INTEGER,
    FOREIGN KEY (identity) REFERENCES items(identity) ON DELETE CASCADE
);
"#;

/// Drops everything [`SCHEMA`] creates.
pub const DROP_SCHEMA: &str = r#"
DROP TABLE IF EXISTS page_keys;
DROP TABLE IF EXISTS items;
"#;
