//! Cache store trait and SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::observer::{ObserverRegistry, Subscription};
use super::traits::{CachedItem, Cacheable, ItemFilter, PageKey};
use crate::db::Database;

/// Durable ordered item table plus its page key table.
///
/// Every write is a single transaction covering both tables, and every
/// committed write is pushed to subscribers of the ordered views.
pub trait CacheStore<T: Cacheable>: Send + Sync {
  /// Number of cached items.
  fn count(&self) -> Result<usize>;

  /// Get a single item by identity.
  fn get(&self, identity: &str) -> Result<Option<CachedItem<T>>>;

  /// Get the page key recorded for an identity.
  fn page_key(&self, identity: &str) -> Result<Option<PageKey>>;

  /// Upsert items and their page keys atomically.
  ///
  /// New identities go after every cached row. Existing identities get their
  /// payload replaced; their bookmark flag and insertion position are kept.
  fn bulk_insert(&self, items: &[T], keys: &[PageKey]) -> Result<()>;

  /// Like `bulk_insert`, but new identities go before every cached row,
  /// keeping their batch order.
  fn bulk_insert_front(&self, items: &[T], keys: &[PageKey]) -> Result<()>;

  /// Upsert a batch fetched outside the paging flow. New identities go to
  /// the front with their keys; cached identities keep their position and
  /// their page keys, only the payload is replaced.
  fn merge_front(&self, items: &[T], keys: &[PageKey]) -> Result<()>;

  /// Clear both tables and insert a new batch, in one transaction.
  fn replace_all(&self, items: &[T], keys: &[PageKey]) -> Result<()>;

  /// Atomic wipe of both tables.
  fn clear_all(&self) -> Result<()>;

  /// Set the bookmark flag. Returns false if the identity is not cached.
  fn set_bookmark(&self, identity: &str, bookmarked: bool) -> Result<bool>;

  /// Current contents of an ordered view.
  fn ordered(&self, filter: ItemFilter) -> Result<Vec<CachedItem<T>>>;

  /// Live ordered view, re-delivered after every committed write.
  fn observe(&self, filter: ItemFilter) -> Result<Subscription<T>>;
}

/// SQLite-based cache store implementation.
pub struct SqliteStore<T> {
  conn: Mutex<Connection>,
  observers: ObserverRegistry<T>,
  _item: PhantomData<fn() -> T>,
}

impl<T: Cacheable> SqliteStore<T> {
  /// Create a store over an already-migrated database.
  pub fn new(db: Database) -> Self {
    Self {
      conn: Mutex::new(db.into_connection()),
      observers: ObserverRegistry::default(),
      _item: PhantomData,
    }
  }

  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    Ok(Self::new(Database::open()?))
  }

  /// Private in-memory store.
  pub fn in_memory() -> Result<Self> {
    Ok(Self::new(Database::open_in_memory()?))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Write a batch in one transaction.
  fn write_batch(&self, mode: BatchMode, items: &[T], keys: &[PageKey]) -> Result<()> {
    check_keys(items, keys)?;

    {
      let mut conn = self.lock()?;
      let tx = conn
        .transaction()
        .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

      if mode.clear_first {
        clear_tables(&tx)?;
      }
      upsert_items(&tx, items, mode.placement)?;
      upsert_keys(&tx, keys, mode.replace_keys)?;

      tx.commit()
        .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    }

    debug!(
      items = items.len(),
      keys = keys.len(),
      ?mode,
      "committed cache batch"
    );
    self.notify_observers();
    Ok(())
  }

  /// Re-query every view that has subscribers and push it.
  fn notify_observers(&self) {
    for filter in self.observers.active_filters() {
      match self.ordered(filter) {
        Ok(snapshot) => self.observers.publish(filter, &snapshot),
        Err(e) => warn!(?filter, "failed to refresh observed view: {}", e),
      }
    }
  }
}

/// Where previously unseen identities land in the insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
  Back,
  Front,
}

#[derive(Debug, Clone, Copy)]
struct BatchMode {
  clear_first: bool,
  placement: Placement,
  /// Overwrite page keys of identities that already have one.
  replace_keys: bool,
}

impl BatchMode {
  const APPEND: Self = Self {
    clear_first: false,
    placement: Placement::Back,
    replace_keys: true,
  };
  const PREPEND: Self = Self {
    clear_first: false,
    placement: Placement::Front,
    replace_keys: true,
  };
  const MERGE: Self = Self {
    clear_first: false,
    placement: Placement::Front,
    replace_keys: false,
  };
  const REPLACE: Self = Self {
    clear_first: true,
    placement: Placement::Back,
    replace_keys: true,
  };
}

/// Every page key must belong to an item in the same batch.
fn check_keys<T: Cacheable>(items: &[T], keys: &[PageKey]) -> Result<()> {
  let identities: HashSet<String> = items.iter().map(T::cache_key).collect();
  match keys.iter().find(|k| !identities.contains(&k.identity)) {
    Some(orphan) => Err(eyre!(
      "Page key for {} has no matching item in the batch",
      orphan.identity
    )),
    None => Ok(()),
  }
}

fn clear_tables(tx: &Transaction<'_>) -> Result<()> {
  tx.execute("DELETE FROM page_keys", [])
    .map_err(|e| eyre!("Failed to clear page keys: {}", e))?;
  tx.execute("DELETE FROM items", [])
    .map_err(|e| eyre!("Failed to clear items: {}", e))?;
  Ok(())
}

/// New rows are numbered past the current maximum (back) or below the
/// current minimum (front). Either way the batch keeps its own order, and
/// rows that already exist keep their number.
fn upsert_items<T: Cacheable>(tx: &Transaction<'_>, items: &[T], placement: Placement) -> Result<()> {
  let sql = match placement {
    Placement::Back => "SELECT COALESCE(MAX(inserted_at), 0) FROM items",
    Placement::Front => "SELECT COALESCE(MIN(inserted_at), 1) FROM items",
  };
  let edge: i64 = tx
    .query_row(sql, [], |row| row.get(0))
    .map_err(|e| eyre!("Failed to read insertion sequence: {}", e))?;
  let base = match placement {
    Placement::Back => edge,
    Placement::Front => edge - items.len() as i64 - 1,
  };

  let mut stmt = tx
    .prepare_cached(
      "INSERT INTO items (identity, payload, sort_key, bookmarked, inserted_at, cached_at)
       VALUES (?, ?, ?, 0, ?, datetime('now'))
       ON CONFLICT(identity) DO UPDATE SET
         payload = excluded.payload,
         sort_key = excluded.sort_key,
         cached_at = excluded.cached_at",
    )
    .map_err(|e| eyre!("Failed to prepare item upsert: {}", e))?;

  for (offset, item) in items.iter().enumerate() {
    let data = serde_json::to_vec(item).map_err(|e| eyre!("Failed to serialize item: {}", e))?;
    stmt
      .execute(params![
        item.cache_key(),
        data,
        item.sort_key(),
        base + offset as i64 + 1
      ])
      .map_err(|e| eyre!("Failed to store item: {}", e))?;
  }

  Ok(())
}

fn upsert_keys(tx: &Transaction<'_>, keys: &[PageKey], replace: bool) -> Result<()> {
  let sql = if replace {
    "INSERT OR REPLACE INTO page_keys (identity, prev_key, next_key) VALUES (?, ?, ?)"
  } else {
    "INSERT OR IGNORE INTO page_keys (identity, prev_key, next_key) VALUES (?, ?, ?)"
  };
  let mut stmt = tx
    .prepare_cached(sql)
    .map_err(|e| eyre!("Failed to prepare page key insert: {}", e))?;

  for key in keys {
    stmt
      .execute(params![key.identity, key.prev_key, key.next_key])
      .map_err(|e| eyre!("Failed to store page key: {}", e))?;
  }

  Ok(())
}

fn read_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Vec<u8>, bool, i64)> {
  Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn decode<T: Cacheable>((data, bookmarked, inserted_at): (Vec<u8>, bool, i64)) -> Result<CachedItem<T>> {
  let item: T =
    serde_json::from_slice(&data).map_err(|e| eyre!("Failed to deserialize item: {}", e))?;
  Ok(CachedItem {
    item,
    bookmarked,
    inserted_at,
  })
}

fn query_ordered<T: Cacheable>(conn: &Connection, filter: ItemFilter) -> Result<Vec<CachedItem<T>>> {
  // Ascending insertion order. APPEND numbers new rows past the maximum,
  // PREPEND and sync number them below the minimum, so each batch lands at
  // the edge it was loaded from.
  let sql = match filter {
    ItemFilter::All => "SELECT payload, bookmarked, inserted_at FROM items ORDER BY inserted_at ASC",
    ItemFilter::Bookmarked => {
      "SELECT payload, bookmarked, inserted_at FROM items
       WHERE bookmarked = 1
       ORDER BY sort_key DESC, inserted_at ASC"
    }
  };

  let mut stmt = conn
    .prepare(sql)
    .map_err(|e| eyre!("Failed to prepare ordered query: {}", e))?;

  let rows: Vec<(Vec<u8>, bool, i64)> = stmt
    .query_map([], read_item)
    .map_err(|e| eyre!("Failed to query items: {}", e))?
    .collect::<rusqlite::Result<_>>()
    .map_err(|e| eyre!("Failed to read items: {}", e))?;

  let items = rows
    .into_iter()
    .filter_map(|row| match decode::<T>(row) {
      Ok(item) => Some(item),
      Err(e) => {
        warn!("skipping unreadable cached item: {}", e);
        None
      }
    })
    .collect();

  Ok(items)
}

impl<T: Cacheable> CacheStore<T> for SqliteStore<T> {
  fn count(&self) -> Result<usize> {
    let conn = self.lock()?;
    let count: i64 = conn
      .query_row("SELECT COUNT(identity) FROM items", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count items: {}", e))?;
    Ok(count as usize)
  }

  fn get(&self, identity: &str) -> Result<Option<CachedItem<T>>> {
    let conn = self.lock()?;
    let row = conn
      .query_row(
        "SELECT payload, bookmarked, inserted_at FROM items WHERE identity = ?",
        params![identity],
        read_item,
      )
      .optional()
      .map_err(|e| eyre!("Failed to query item {}: {}", identity, e))?;

    row.map(decode::<T>).transpose()
  }

  fn page_key(&self, identity: &str) -> Result<Option<PageKey>> {
    let conn = self.lock()?;
    conn
      .query_row(
        "SELECT identity, prev_key, next_key FROM page_keys WHERE identity = ?",
        params![identity],
        |row| {
          Ok(PageKey {
            identity: row.get(0)?,
            prev_key: row.get(1)?,
            next_key: row.get(2)?,
          })
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to query page key for {}: {}", identity, e))
  }

  fn bulk_insert(&self, items: &[T], keys: &[PageKey]) -> Result<()> {
    self.write_batch(BatchMode::APPEND, items, keys)
  }

  fn bulk_insert_front(&self, items: &[T], keys: &[PageKey]) -> Result<()> {
    self.write_batch(BatchMode::PREPEND, items, keys)
  }

  fn merge_front(&self, items: &[T], keys: &[PageKey]) -> Result<()> {
    self.write_batch(BatchMode::MERGE, items, keys)
  }

  fn replace_all(&self, items: &[T], keys: &[PageKey]) -> Result<()> {
    self.write_batch(BatchMode::REPLACE, items, keys)
  }

  fn clear_all(&self) -> Result<()> {
    {
      let mut conn = self.lock()?;
      let tx = conn
        .transaction()
        .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;
      clear_tables(&tx)?;
      tx.commit()
        .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    }
    self.notify_observers();
    Ok(())
  }

  fn set_bookmark(&self, identity: &str, bookmarked: bool) -> Result<bool> {
    let updated = {
      let conn = self.lock()?;
      conn
        .execute(
          "UPDATE items SET bookmarked = ? WHERE identity = ?",
          params![bookmarked, identity],
        )
        .map_err(|e| eyre!("Failed to update bookmark for {}: {}", identity, e))?
    };

    if updated > 0 {
      self.notify_observers();
    }
    Ok(updated > 0)
  }

  fn ordered(&self, filter: ItemFilter) -> Result<Vec<CachedItem<T>>> {
    let conn = self.lock()?;
    query_ordered(&conn, filter)
  }

  fn observe(&self, filter: ItemFilter) -> Result<Subscription<T>> {
    // Seed and register under the connection lock, so a commit cannot land
    // between the initial view and the registration.
    let conn = self.lock()?;
    let initial = query_ordered(&conn, filter)?;
    Ok(self.observers.subscribe(filter, initial))
  }
}
