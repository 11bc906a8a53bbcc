use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, Transaction};
use tracing::{debug, info};

use crate::error::AppResult;

pub mod migrations;

pub mod repositories;

/// File name of the assessment cache inside an app data directory.
pub const CACHE_FILE_NAME: &str = "wellness.sqlite";

const SCHEMA_SQL: &str = include_str!("schema.sql");
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Device-local cache holding today's assessment, the rolling history,
/// the reflection log, settings and the sealed session.
///
/// Every call opens its own connection; the schema and pending migrations
/// are applied on open so a cache restored from an older build catches up.
#[derive(Clone, Debug)]
pub struct DbPool {
    path: PathBuf,
}

impl DbPool {
    pub fn new<P: Into<PathBuf>>(path: P) -> AppResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|parent| !parent.exists()) {
            fs::create_dir_all(parent)?;
        }

        let pool = Self { path };
        let version = pool.schema_version()?;
        info!(
            target: "app::db",
            cache = %pool.path.display(),
            schema_version = version,
            "assessment cache ready"
        );
        Ok(pool)
    }

    /// Opens `CACHE_FILE_NAME` under `data_dir`.
    pub fn in_dir(data_dir: &Path) -> AppResult<Self> {
        Self::new(data_dir.join(CACHE_FILE_NAME))
    }

    pub fn get_connection(&self) -> AppResult<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", 1)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA_SQL)?;
        migrations::run(&conn)?;
        debug!(target: "app::db", cache = %self.path.display(), "cache connection opened");
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, callback: F) -> AppResult<T>
    where
        F: FnOnce(&Connection) -> AppResult<T>,
    {
        let conn = self.get_connection()?;
        callback(&conn)
    }

    /// Runs `callback` in one transaction, committed only when it returns `Ok`.
    pub fn with_transaction<F, T>(&self, callback: F) -> AppResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> AppResult<T>,
    {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        let value = callback(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    pub fn schema_version(&self) -> AppResult<i32> {
        self.with_connection(|conn| {
            Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
