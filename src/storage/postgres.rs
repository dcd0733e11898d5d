//! PostgreSQL dialect and connection setup
//!
//! Placeholders are numbered (`$1`, `$2`, ...). The target database is
//! looked up in `pg_database` through the `postgres` maintenance database
//! and created when missing.

use sqlx::{AnyConnection, Connection};
use tracing::{debug, info, instrument};
use url::Url;

use super::dialect::Dialect;
use super::error::{StorageError, StorageResult};
use super::sql::{PoolSettings, SqlBackend, database_from_url, display_target};

/// Database used when the descriptor names none
pub const DEFAULT_DATABASE: &str = "energy_data";

const MAINTENANCE_DATABASE: &str = "postgres";

/// PostgreSQL fragments
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn value_type(&self) -> &'static str {
        "DOUBLE PRECISION"
    }

    fn date_param(&self, placeholder: &str) -> String {
        format!("CAST({placeholder} AS DATE)")
    }

    fn time_param(&self, placeholder: &str) -> String {
        format!("CAST({placeholder} AS TIME)")
    }

    fn date_text(&self, expr: &str) -> String {
        format!("to_char({expr}, 'YYYY-MM-DD')")
    }

    fn time_text(&self, expr: &str) -> String {
        format!("to_char({expr}, 'HH24:MI')")
    }

    fn hour_bucket(&self, expr: &str) -> String {
        format!("to_char({expr}, 'HH24:00')")
    }

    fn month_start(&self, expr: &str) -> String {
        format!("to_char({expr}, 'YYYY-MM-01')")
    }

    fn upsert_clause(&self) -> &'static str {
        "ON CONFLICT (namespace, date, time, tag) DO UPDATE SET value = EXCLUDED.value"
    }
}

/// PostgreSQL storage backend
pub type PostgresBackend = SqlBackend<PostgresDialect>;

impl SqlBackend<PostgresDialect> {
    /// Connect to the server in `url`, creating the database if needed
    #[instrument(skip_all, fields(host = url.host_str()))]
    pub async fn open_postgres(url: &Url, settings: &PoolSettings) -> StorageResult<Self> {
        sqlx::any::install_default_drivers();

        let database = database_from_url(url, DEFAULT_DATABASE)?;
        let target = display_target(url, database);
        info!("initializing PostgreSQL backend at: {}", target);

        let mut database_url = url.clone();
        database_url
            .set_scheme("postgres")
            .map_err(|()| StorageError::InvalidConfig(format!("cannot normalize scheme of {target}")))?;

        let mut maintenance_url = database_url.clone();
        maintenance_url.set_path(&format!("/{MAINTENANCE_DATABASE}"));
        let mut conn = AnyConnection::connect(maintenance_url.as_str())
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        let exists = sqlx::query("SELECT 1 FROM pg_database WHERE datname = $1")
            .bind(database.to_string())
            .fetch_optional(&mut conn)
            .await?
            .is_some();
        if !exists {
            debug!("creating database {database}");
            sqlx::query(&format!("CREATE DATABASE \"{database}\""))
                .execute(&mut conn)
                .await?;
        }
        conn.close().await?;

        database_url.set_path(&format!("/{database}"));
        let pool = settings
            .pool_options()
            .connect(database_url.as_str())
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        Self::with_pool(pool, PostgresDialect, target).await
    }
}
