//! Deterministic translation cache.
//!
//! Keys are `SHA256(src|dst|text)` so identical lines translate once across
//! runs and videos. The backing store is a single SQLite table behind one
//! mutex; on the first backend error the cache flips to a no-op state (one
//! log line) and the pipeline proceeds uncached.

use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;

use crate::Result;

/// Cache key: SHA-256 over `src_lang|dst_lang|text`. Pure function of its
/// inputs.
pub fn cache_key(src_lang: &str, dst_lang: &str, text: &str) -> String {
    let payload = format!("{}|{}|{}", src_lang, dst_lang, text);
    let digest = Sha256::digest(payload.as_bytes());
    format!("{:x}", digest)
}

/// Key-value translation store.
pub trait TranslationCache: Send + Sync {
    /// Look up a cached translation.
    fn get(&self, key: &str) -> Option<String>;
    /// Store a translation.
    fn set(&self, key: &str, text: &str);
}

struct SqliteState {
    conn: Connection,
    failed: bool,
}

/// SQLite-backed cache with fail-open semantics.
pub struct SqliteCache {
    state: Mutex<SqliteState>,
    db_path: String,
}

impl SqliteCache {
    /// Open or create the database and its table.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS translations (key TEXT PRIMARY KEY, text TEXT)",
            [],
        )?;
        Ok(Self {
            state: Mutex::new(SqliteState { conn, failed: false }),
            db_path: db_path.to_string_lossy().into_owned(),
        })
    }
}

impl TranslationCache for SqliteCache {
    fn get(&self, key: &str) -> Option<String> {
        let mut state = self.state.lock().unwrap();
        if state.failed {
            return None;
        }
        let result = state
            .conn
            .query_row(
                "SELECT text FROM translations WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional();
        match result {
            Ok(row) => row,
            Err(e) => {
                log::warn!(
                    "translation cache read failed, caching disabled: {} ({})",
                    self.db_path,
                    e
                );
                state.failed = true;
                None
            }
        }
    }

    fn set(&self, key: &str, text: &str) {
        let mut state = self.state.lock().unwrap();
        if state.failed {
            return;
        }
        let result = state.conn.execute(
            "INSERT OR REPLACE INTO translations (key, text) VALUES (?1, ?2)",
            params![key, text],
        );
        if let Err(e) = result {
            log::warn!(
                "translation cache write failed, caching disabled: {} ({})",
                self.db_path,
                e
            );
            state.failed = true;
        }
    }
}

/// In-memory fallback used when the database cannot be opened.
#[derive(Default)]
pub struct MemoryCache {
    inner: Mutex<std::collections::HashMap<String, String>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TranslationCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, text: &str) {
        self.inner
            .lock()
            .unwrap()
            .insert(key.to_string(), text.to_string());
    }
}
