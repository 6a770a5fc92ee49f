//! Cache store trait and backends.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::http::{Request, Response};

/// Summary of a cached entry, used for store listings.
#[derive(Debug, Clone)]
pub struct EntryInfo {
  /// Request URL the entry is keyed by
  pub url: String,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache generation storage backends.
///
/// A generation is a named bucket of request/response entries. The controller
/// keeps exactly one generation current and purges the rest on activation;
/// the store itself attaches no meaning to the names.
pub trait CacheStore: Send + Sync {
  /// Open a generation, creating it if it does not exist.
  fn open(&self, name: &str) -> Result<()>;

  /// Check whether a generation exists.
  fn has(&self, name: &str) -> Result<bool>;

  /// Store a response under the request's key, overwriting any previous
  /// entry for the same key. Creates the generation if needed.
  fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()>;

  /// Look up a cached response for the request within one generation.
  fn match_request(&self, name: &str, request: &Request) -> Result<Option<Response>>;

  /// List the entries of a generation.
  fn entries(&self, name: &str) -> Result<Vec<EntryInfo>>;

  /// Delete a generation and all of its entries. Returns whether it existed.
  fn delete(&self, name: &str) -> Result<bool>;

  /// List all generation names.
  fn names(&self) -> Result<Vec<String>>;
}

/// A single in-memory entry.
#[derive(Debug, Clone)]
struct MemoryEntry {
  url: String,
  response: Response,
  cached_at: DateTime<Utc>,
}

type Generations = BTreeMap<String, BTreeMap<String, MemoryEntry>>;

/// In-memory store. Used in tests and for hosts that do not need the cache
/// to survive the process.
#[derive(Default)]
pub struct MemoryStore {
  generations: Mutex<Generations>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Generations>> {
    self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl CacheStore for MemoryStore {
  fn open(&self, name: &str) -> Result<()> {
    self.lock()?.entry(name.to_string()).or_default();
    Ok(())
  }

  fn has(&self, name: &str) -> Result<bool> {
    Ok(self.lock()?.contains_key(name))
  }

  fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()> {
    let mut generations = self.lock()?;
    let entries = generations.entry(name.to_string()).or_default();
    entries.insert(
      request.cache_key(),
      MemoryEntry {
        url: request.url.to_string(),
        response: response.clone(),
        cached_at: Utc::now(),
      },
    );
    Ok(())
  }

  fn match_request(&self, name: &str, request: &Request) -> Result<Option<Response>> {
    let generations = self.lock()?;
    Ok(
      generations
        .get(name)
        .and_then(|entries| entries.get(&request.cache_key()))
        .map(|entry| entry.response.clone()),
    )
  }

  fn entries(&self, name: &str) -> Result<Vec<EntryInfo>> {
    let generations = self.lock()?;
    Ok(
      generations
        .get(name)
        .map(|entries| {
          entries
            .values()
            .map(|entry| EntryInfo {
              url: entry.url.clone(),
              cached_at: entry.cached_at,
            })
            .collect()
        })
        .unwrap_or_default(),
    )
  }

  fn delete(&self, name: &str) -> Result<bool> {
    Ok(self.lock()?.remove(name).is_some())
  }

  fn names(&self) -> Result<Vec<String>> {
    Ok(self.lock()?.keys().cloned().collect())
  }
}

/// SQLite-based store, so cache generations survive across host processes.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open a store at the given path, creating parent directories as needed.
  pub fn open(path: &std::path::Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Open an ephemeral in-memory store.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open cache database: {}", e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("araise-offline").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Named cache generations
CREATE TABLE IF NOT EXISTS generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Cached responses (stores serialized JSON)
CREATE TABLE IF NOT EXISTS entries (
    generation TEXT NOT NULL,
    request_key TEXT NOT NULL,
    url TEXT NOT NULL,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, request_key)
);

CREATE INDEX IF NOT EXISTS idx_entries_generation ON entries(generation);
"#;

impl CacheStore for SqliteStore {
  fn open(&self, name: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO generations (name) VALUES (?)",
        params![name],
      )
      .map_err(|e| eyre!("Failed to open generation {}: {}", name, e))?;

    Ok(())
  }

  fn has(&self, name: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT 1 FROM generations WHERE name = ?")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let found: Option<i64> = stmt.query_row(params![name], |row| row.get(0)).ok();

    Ok(found.is_some())
  }

  fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let data =
      serde_json::to_vec(response).map_err(|e| eyre!("Failed to serialize response: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO generations (name) VALUES (?)",
        params![name],
      )
      .map_err(|e| eyre!("Failed to open generation {}: {}", name, e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO entries (generation, request_key, url, data, cached_at)
         VALUES (?, ?, ?, ?, datetime('now'))",
        params![name, request.cache_key(), request.url.as_str(), data],
      )
      .map_err(|e| eyre!("Failed to store entry: {}", e))?;

    Ok(())
  }

  fn match_request(&self, name: &str, request: &Request) -> Result<Option<Response>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT data FROM entries WHERE generation = ? AND request_key = ?")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let data: Option<Vec<u8>> = stmt
      .query_row(params![name, request.cache_key()], |row| row.get(0))
      .ok();

    match data {
      Some(data) => {
        let response: Response = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize response: {}", e))?;
        Ok(Some(response))
      }
      None => Ok(None),
    }
  }

  fn entries(&self, name: &str) -> Result<Vec<EntryInfo>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT url, cached_at FROM entries WHERE generation = ? ORDER BY url")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<(String, String)> = stmt
      .query_map(params![name], |row| Ok((row.get(0)?, row.get(1)?)))
      .map_err(|e| eyre!("Failed to query entries: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    let mut entries = Vec::with_capacity(rows.len());
    for (url, cached_at) in rows {
      entries.push(EntryInfo {
        url,
        cached_at: parse_datetime(&cached_at)?,
      });
    }

    Ok(entries)
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM entries WHERE generation = ?", params![name])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;

    let deleted = conn
      .execute("DELETE FROM generations WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete generation {}: {}", name, e))?;

    Ok(deleted > 0)
  }

  fn names(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM generations ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names: Vec<String> = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query generations: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
