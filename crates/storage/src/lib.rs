use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tokio::sync::Mutex;

/// Fixed keys under which the client persists its session.
pub mod keys {
    pub const AUTH_TOKEN: &str = "auth_token";
    pub const CURRENT_USER: &str = "current_user";
    pub const SELLER_PROFILE: &str = "seller_profile";

    pub const ALL: [&str; 3] = [AUTH_TOKEN, CURRENT_USER, SELLER_PROFILE];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Durable string key/value storage for client state that must survive a
/// restart.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Applies every write in one unit: `Some` upserts the key, `None` removes it.
    async fn write_all(&self, entries: &[(&str, Option<String>)]) -> Result<()>;

    async fn entries(&self) -> Result<Vec<StoredEntry>>;

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let entries: Vec<(&str, Option<String>)> = keys.iter().map(|key| (*key, None)).collect();
        self.write_all(&entries).await
    }
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url '{database_url}'"))?
            .create_if_missing(true);
        // Every connection to `:memory:` opens its own database.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open session database '{database_url}'"))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to migrate session database")?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for Storage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM session_kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read session key '{key}'"))?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    async fn write_all(&self, entries: &[(&str, Option<String>)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        for (key, value) in entries {
            match value {
                Some(value) => {
                    sqlx::query(
                        "INSERT INTO session_kv (key, value, updated_at) VALUES (?, ?, ?)
                         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    )
                    .bind(*key)
                    .bind(value.as_str())
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("failed to write session key '{key}'"))?;
                }
                None => {
                    sqlx::query("DELETE FROM session_kv WHERE key = ?")
                        .bind(*key)
                        .execute(&mut *tx)
                        .await
                        .with_context(|| format!("failed to delete session key '{key}'"))?;
                }
            }
        }
        tx.commit().await.context("failed to commit session write")?;
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<StoredEntry>> {
        let rows = sqlx::query("SELECT key, value, updated_at FROM session_kv ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .context("failed to list session keys")?;

        rows.into_iter()
            .map(|row| -> Result<StoredEntry> {
                Ok(StoredEntry {
                    key: row.try_get("key")?,
                    value: row.try_get("value")?,
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect()
    }
}

/// Process-local store for tests and ephemeral clients.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: Mutex<BTreeMap<String, (String, DateTime<Utc>)>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let guard = self.entries.lock().await;
        Ok(guard.get(key).map(|(value, _)| value.clone()))
    }

    async fn write_all(&self, entries: &[(&str, Option<String>)]) -> Result<()> {
        let mut guard = self.entries.lock().await;
        let now = Utc::now();
        for (key, value) in entries {
            match value {
                Some(value) => {
                    guard.insert((*key).to_string(), (value.clone(), now));
                }
                None => {
                    guard.remove(*key);
                }
            }
        }
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<StoredEntry>> {
        let guard = self.entries.lock().await;
        Ok(guard
            .iter()
            .map(|(key, (value, updated_at))| StoredEntry {
                key: key.clone(),
                value: value.clone(),
                updated_at: *updated_at,
            })
            .collect())
    }
}

/// Turns plain file paths into sqlite URLs and creates the parent directory.
pub fn prepare_database_url(raw_database_url: &str) -> Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_sqlite_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

pub const DEFAULT_DATABASE_URL: &str = "sqlite://./data/session.db";

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return DEFAULT_DATABASE_URL.to_string();
    }

    if raw_database_url.starts_with("sqlite:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
