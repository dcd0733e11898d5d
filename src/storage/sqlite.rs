//! SQLite dialect and connection setup
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers keep going while the collector writes
//! - **In-memory**: An empty path opens a private database that lives as
//!   long as its single pooled connection
//!
//! Dates and times are stored as ISO text, so `date(?)`/`time(?)`
//! normalize parameters and `strftime` renders them back.

use std::path::Path;

use sqlx::any::AnyPoolOptions;
use tracing::{debug, info, instrument};

use super::dialect::Dialect;
use super::error::{StorageError, StorageResult};
use super::sql::{PoolSettings, SqlBackend};

/// SQLite fragments
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn value_type(&self) -> &'static str {
        "REAL"
    }

    fn date_param(&self, placeholder: &str) -> String {
        format!("date({placeholder})")
    }

    fn time_param(&self, placeholder: &str) -> String {
        format!("time({placeholder})")
    }

    fn date_text(&self, expr: &str) -> String {
        format!("strftime('%Y-%m-%d', {expr})")
    }

    fn time_text(&self, expr: &str) -> String {
        format!("strftime('%H:%M', {expr})")
    }

    fn hour_bucket(&self, expr: &str) -> String {
        format!("strftime('%H:00', {expr})")
    }

    fn month_start(&self, expr: &str) -> String {
        format!("strftime('%Y-%m-01', {expr})")
    }

    fn upsert_clause(&self) -> &'static str {
        "ON CONFLICT(namespace, date, time, tag) DO UPDATE SET value = excluded.value"
    }
}

/// SQLite storage backend
pub type SqliteBackend = SqlBackend<SqliteDialect>;

impl SqlBackend<SqliteDialect> {
    /// Open (creating if missing) the database file at `path`
    ///
    /// An empty path opens a private in-memory database instead.
    #[instrument(skip(settings))]
    pub async fn open_sqlite(path: &str, settings: &PoolSettings) -> StorageResult<Self> {
        sqlx::any::install_default_drivers();

        if path.is_empty() {
            return Self::in_memory().await;
        }

        if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!("initializing SQLite backend at: {}", path);

        let pool = settings
            .pool_options()
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    // retry on lock contention instead of failing
                    sqlx::query("PRAGMA busy_timeout = 30000")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA journal_mode = WAL")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(&format!("sqlite://{path}?mode=rwc"))
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("SQLite connection pool created");
        Self::with_pool(pool, SqliteDialect, format!("sqlite://{path}")).await
    }

    /// Open a private in-memory database
    pub async fn in_memory() -> StorageResult<Self> {
        sqlx::any::install_default_drivers();

        // every connection to :memory: sees its own database, so keep
        // exactly one connection alive for the lifetime of the pool
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("SQLite in-memory database opened");
        Self::with_pool(pool, SqliteDialect, "sqlite::memory:").await
    }
}
