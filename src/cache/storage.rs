//! Cache store trait and SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use super::subscription::Subscription;
use crate::catalog::types::{CachedCatalogItem, CatalogItem};
use crate::worker::Worker;

/// Trait for the local cache backend.
///
/// Implementations own the cached rows and their surrogate key sequence.
/// Calls may block on I/O; the repository runs them on its worker.
pub trait CacheStore: Send + Sync {
  /// Insert one row and return its surrogate key.
  ///
  /// An unassigned key (`<= 0`) takes the next sequence value.
  fn insert(&self, row: &CachedCatalogItem) -> Result<i64>;

  /// Remove every row.
  fn delete_all(&self) -> Result<()>;

  /// Restart the surrogate key sequence at its initial value.
  fn reset_sequence(&self) -> Result<()>;

  /// Remove every row, then reset the key sequence.
  ///
  /// The default runs two separate steps: if the second fails the rows are
  /// gone but the sequence keeps counting. Stores with transactions should
  /// override this.
  fn clear(&self) -> Result<()> {
    self.delete_all()?;
    self.reset_sequence()
  }

  /// Replace every row with `rows`, restarting the key sequence first.
  /// Returns the assigned keys in input order.
  ///
  /// Same caveat as [`CacheStore::clear`]: the default is not atomic, so a
  /// failed insert leaves the cache partially written.
  fn replace_all(&self, rows: &[CachedCatalogItem]) -> Result<Vec<i64>> {
    self.clear()?;
    rows.iter().map(|row| self.insert(row)).collect()
  }

  fn count(&self) -> Result<u64>;

  /// All rows in key order, re-emitted whenever they change.
  fn stream_all(&self) -> Subscription<Result<Vec<CachedCatalogItem>>>;

  /// The row with the given catalog id, re-emitted whenever it changes.
  fn stream_by_id(&self, id: &str) -> Subscription<Result<Option<CachedCatalogItem>>>;
}

/// SQLite-based cache store.
pub struct SqliteStore {
  conn: Arc<Mutex<Connection>>,
  /// Bumped after every mutation
  changes: watch::Sender<u64>,
  worker: Worker,
}

/// Schema for the cache table.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS anime (
    key INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL,
    title TEXT NOT NULL,
    rating REAL,
    status TEXT NOT NULL,
    country TEXT NOT NULL,
    genre TEXT NOT NULL,
    release_year TEXT NOT NULL,
    description TEXT NOT NULL,
    image_url TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_anime_id ON anime(id);
"#;

const SELECT_COLUMNS: &str = "SELECT key, id, title, rating, status, country, genre, release_year, description, image_url FROM anime";

impl SqliteStore {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path, worker: Worker) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn, worker)
  }

  /// Private database that disappears with the store.
  pub fn open_in_memory(worker: Worker) -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::with_connection(conn, worker)
  }

  fn with_connection(conn: Connection, worker: Worker) -> Result<Self> {
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    let (changes, _) = watch::channel(0);

    Ok(Self {
      conn: Arc::new(Mutex::new(conn)),
      changes,
      worker,
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    lock(&self.conn)
  }

  fn notify(&self) {
    self.changes.send_modify(|version| *version = version.wrapping_add(1));
  }
}

impl CacheStore for SqliteStore {
  fn insert(&self, row: &CachedCatalogItem) -> Result<i64> {
    let key = {
      let conn = self.lock()?;
      insert_row(&conn, row)?
    };

    self.notify();
    tracing::debug!(key, id = %row.item.id, "cached anime");
    Ok(key)
  }

  fn delete_all(&self) -> Result<()> {
    self
      .lock()?
      .execute("DELETE FROM anime", [])
      .map_err(|e| eyre!("Failed to delete cached anime: {}", e))?;

    self.notify();
    Ok(())
  }

  fn reset_sequence(&self) -> Result<()> {
    self
      .lock()?
      .execute("DELETE FROM sqlite_sequence WHERE name = 'anime'", [])
      .map_err(|e| eyre!("Failed to reset anime key sequence: {}", e))?;

    Ok(())
  }

  fn clear(&self) -> Result<()> {
    {
      let mut conn = self.lock()?;
      let tx = conn
        .transaction()
        .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

      tx.execute("DELETE FROM anime", [])
        .map_err(|e| eyre!("Failed to delete cached anime: {}", e))?;
      tx.execute("DELETE FROM sqlite_sequence WHERE name = 'anime'", [])
        .map_err(|e| eyre!("Failed to reset anime key sequence: {}", e))?;

      tx.commit()
        .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    }

    self.notify();
    Ok(())
  }

  fn replace_all(&self, rows: &[CachedCatalogItem]) -> Result<Vec<i64>> {
    let keys = {
      let mut conn = self.lock()?;
      let tx = conn
        .transaction()
        .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

      tx.execute("DELETE FROM anime", [])
        .map_err(|e| eyre!("Failed to delete cached anime: {}", e))?;
      tx.execute("DELETE FROM sqlite_sequence WHERE name = 'anime'", [])
        .map_err(|e| eyre!("Failed to reset anime key sequence: {}", e))?;

      let keys = rows
        .iter()
        .map(|row| insert_row(&tx, row))
        .collect::<Result<Vec<_>>>()?;

      tx.commit()
        .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
      keys
    };

    self.notify();
    tracing::debug!(count = keys.len(), "replaced cached anime");
    Ok(keys)
  }

  fn count(&self) -> Result<u64> {
    let count: i64 = self
      .lock()?
      .query_row("SELECT COUNT(*) FROM anime", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count cached anime: {}", e))?;

    Ok(count as u64)
  }

  fn stream_all(&self) -> Subscription<Result<Vec<CachedCatalogItem>>> {
    let conn = Arc::clone(&self.conn);

    Subscription::watch(&self.worker, self.changes.subscribe(), move || {
      let conn = lock(&conn)?;
      query_all(&conn)
    })
  }

  fn stream_by_id(&self, id: &str) -> Subscription<Result<Option<CachedCatalogItem>>> {
    let conn = Arc::clone(&self.conn);
    let id = id.to_string();

    Subscription::watch(&self.worker, self.changes.subscribe(), move || {
      let conn = lock(&conn)?;
      query_by_id(&conn, &id)
    })
  }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
  conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
}

fn insert_row(conn: &Connection, row: &CachedCatalogItem) -> Result<i64> {
  let item = &row.item;

  let inserted = if row.is_assigned() {
    conn.execute(
      "INSERT INTO anime (key, id, title, rating, status, country, genre, release_year, description, image_url)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
      params![
        row.key,
        item.id,
        item.title,
        item.rating,
        item.status.as_str(),
        item.country.as_str(),
        item.genre.as_str(),
        item.release_year,
        item.description,
        item.image_url
      ],
    )
  } else {
    conn.execute(
      "INSERT INTO anime (id, title, rating, status, country, genre, release_year, description, image_url)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
      params![
        item.id,
        item.title,
        item.rating,
        item.status.as_str(),
        item.country.as_str(),
        item.genre.as_str(),
        item.release_year,
        item.description,
        item.image_url
      ],
    )
  };
  inserted.map_err(|e| eyre!("Failed to insert anime {}: {}", item.id, e))?;

  Ok(conn.last_insert_rowid())
}

fn query_all(conn: &Connection) -> Result<Vec<CachedCatalogItem>> {
  let mut stmt = conn
    .prepare(&format!("{} ORDER BY key", SELECT_COLUMNS))
    .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

  let rows = stmt
    .query_map([], row_to_cached)
    .map_err(|e| eyre!("Failed to query cached anime: {}", e))?
    .collect::<rusqlite::Result<Vec<_>>>()
    .map_err(|e| eyre!("Failed to read cached anime: {}", e))?;

  Ok(rows)
}

fn query_by_id(conn: &Connection, id: &str) -> Result<Option<CachedCatalogItem>> {
  conn
    .query_row(
      &format!("{} WHERE id = ? ORDER BY key LIMIT 1", SELECT_COLUMNS),
      params![id],
      row_to_cached,
    )
    .optional()
    .map_err(|e| eyre!("Failed to query cached anime {}: {}", id, e))
}

fn row_to_cached(row: &Row) -> rusqlite::Result<CachedCatalogItem> {
  Ok(CachedCatalogItem {
    key: row.get("key")?,
    item: CatalogItem {
      id: row.get("id")?,
      title: row.get("title")?,
      // SQLite stores a NaN double as NULL.
      rating: row.get::<_, Option<f64>>("rating")?.map_or(f32::NAN, |r| r as f32),
      status: parse_column(row, 4)?,
      country: parse_column(row, 5)?,
      genre: parse_column(row, 6)?,
      release_year: row.get("release_year")?,
      description: row.get("description")?,
      image_url: row.get("image_url")?,
    },
  })
}

fn parse_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
  T: std::str::FromStr<Err = String>,
{
  let raw: String = row.get(idx)?;
  raw
    .parse()
    .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}
