pub mod schema;

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Database connection wrapper for the cache store
pub struct Database {
  conn: Connection,
}

impl Database {
  /// Open or create the database at the default location
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open or create the database at an explicit path
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    Self::init(conn)
  }

  /// Private in-memory database, used by tests
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::init(conn)
  }

  fn init(conn: Connection) -> Result<Self> {
    conn
      .execute_batch("PRAGMA foreign_keys = ON;")
      .map_err(|e| eyre!("Failed to enable foreign keys: {}", e))?;

    let db = Self { conn };
    db.run_migrations()?;
    Ok(db)
  }

  /// Get the default database path
  pub fn default_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("cache.db"))
  }

  /// Run database migrations.
  ///
  /// The schema is versioned by fingerprint. A mismatch (or a store that
  /// predates fingerprinting) is handled by dropping and recreating all cache
  /// tables; there are no incremental migrations.
  fn run_migrations(&self) -> Result<()> {
    self
      .conn
      .execute_batch(schema::META_SCHEMA)
      .map_err(|e| eyre!("Failed to create store metadata: {}", e))?;

    let expected = schema_fingerprint();
    let stored: Option<String> = self
      .conn
      .query_row(
        "SELECT value FROM store_meta WHERE key = 'schema'",
        [],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read schema version: {}", e))?;

    if stored.as_deref() == Some(expected.as_str()) {
      debug!(fingerprint = %expected, "cache schema up to date");
      return Ok(());
    }

    if stored.is_some() {
      warn!("cache schema changed, discarding cached data");
    }

    self
      .conn
      .execute_batch(schema::DROP_SCHEMA)
      .map_err(|e| eyre!("Failed to drop old cache tables: {}", e))?;
    self
      .conn
      .execute_batch(schema::SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
    self
      .conn
      .execute(
        "INSERT OR REPLACE INTO store_meta (key, value) VALUES ('schema', ?)",
        params![expected],
      )
      .map_err(|e| eyre!("Failed to record schema version: {}", e))?;

    Ok(())
  }

  pub fn into_connection(self) -> Connection {
    self.conn
  }
}

/// Application data directory ($XDG_DATA_HOME/newsflow).
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("newsflow"))
}

/// SHA256 of the cache DDL, hex encoded.
fn schema_fingerprint() -> String {
  let mut hasher = Sha256::new();
  hasher.update(schema::SCHEMA.as_bytes());
  hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn table_count(conn: &Connection) -> i64 {
    conn
      .query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('items', 'page_keys')",
        [],
        |row| row.get(0),
      )
      .unwrap()
  }

  #[test]
  fn test_fresh_database_has_tables() {
    let conn = Database::open_in_memory().unwrap().into_connection();
    assert_eq!(table_count(&conn), 2);
  }

  #[test]
  fn test_reopen_keeps_data_when_schema_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    {
      let conn = Database::open_at(&path).unwrap().into_connection();
      conn
        .execute(
          "INSERT INTO items (identity, payload, inserted_at) VALUES ('a', x'00', 1)",
          [],
        )
        .unwrap();
    }

    let conn = Database::open_at(&path).unwrap().into_connection();
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))
      .unwrap();
    assert_eq!(count, 1);
  }

  #[test]
  fn test_fingerprint_mismatch_wipes_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    {
      let conn = Database::open_at(&path).unwrap().into_connection();
      conn
        .execute(
          "INSERT INTO items (identity, payload, inserted_at) VALUES ('a', x'00', 1)",
          [],
        )
        .unwrap();
      conn
        .execute("UPDATE store_meta SET value = 'stale' WHERE key = 'schema'", [])
        .unwrap();
    }

    let conn = Database::open_at(&path).unwrap().into_connection();
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))
      .unwrap();
    assert_eq!(count, 0);
    assert_eq!(table_count(&conn), 2);
  }
}
