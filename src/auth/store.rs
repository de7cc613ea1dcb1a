// Token persistence
// Key-value property store holding the four token fields

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::types::TokenState;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const ACCESS_TIME_KEY: &str = "access_time";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const REFRESH_TIME_KEY: &str = "refresh_time";

const UPSERT_SQL: &str = "INSERT INTO token_kv (key, value) VALUES (?1, ?2)
     ON CONFLICT(key) DO UPDATE SET value = excluded.value";

/// Get/set string properties by key
pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Write several entries in order, stopping at the first failure
    /// Stores that can make the batch atomic should override this
    fn set_all(&self, entries: &[(&str, &str)]) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }
}

/// In-process store, lost on exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// SQLite-backed store, one row per key
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the token database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create token directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS token_kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .context("Failed to create token_kv table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("token store connection lock poisoned"))
    }
}

impl TokenStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.conn()?
            .query_row("SELECT value FROM token_kv WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("Failed to read {} from SQLite", key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn()?
            .execute(UPSERT_SQL, [key, value])
            .with_context(|| format!("Failed to write {} to SQLite", key))?;
        Ok(())
    }

    fn set_all(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .context("Failed to begin token store transaction")?;

        for (key, value) in entries {
            tx.execute(UPSERT_SQL, [*key, *value])
                .with_context(|| format!("Failed to write {} to SQLite", key))?;
        }

        tx.commit().context("Failed to commit token store transaction")
    }
}

/// Load the token record from the store
pub fn load_state(store: &dyn TokenStore) -> Result<TokenState> {
    Ok(TokenState {
        access_token: store.get(ACCESS_TOKEN_KEY)?,
        access_issued_at: load_time(store, ACCESS_TIME_KEY)?,
        refresh_token: store.get(REFRESH_TOKEN_KEY)?,
        refresh_issued_at: load_time(store, REFRESH_TIME_KEY)?,
    })
}

/// Persist freshly issued tokens in one batch
///
/// A rotated refresh token is written before the access token: the provider
/// may already have revoked the old one, so losing it is worse than losing
/// an access token that can be minted again.
pub fn save_tokens(
    store: &dyn TokenStore,
    access_token: &str,
    refresh_token: Option<&str>,
    issued_at: DateTime<Utc>,
) -> Result<()> {
    let issued_at = format_datetime(issued_at);

    let mut entries = Vec::with_capacity(4);
    if let Some(refresh_token) = refresh_token {
        entries.push((REFRESH_TOKEN_KEY, refresh_token));
        entries.push((REFRESH_TIME_KEY, issued_at.as_str()));
    }
    entries.push((ACCESS_TOKEN_KEY, access_token));
    entries.push((ACCESS_TIME_KEY, issued_at.as_str()));

    store.set_all(&entries)
}

fn load_time(store: &dyn TokenStore, key: &str) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };

    match parse_datetime(&raw) {
        Ok(dt) => Ok(Some(dt)),
        Err(e) => {
            tracing::warn!("Ignoring unreadable {}: {}", key, e);
            Ok(None)
        }
    }
}

fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse datetime from various ISO 8601 formats
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    // Handle Z suffix
    let normalized = if s.ends_with('Z') {
        s.replace('Z', "+00:00")
    } else {
        s.to_string()
    };

    DateTime::parse_from_rfc3339(&normalized)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Failed to parse datetime: {}", s))
}
