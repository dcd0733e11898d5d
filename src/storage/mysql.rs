//! MySQL dialect and connection setup
//!
//! The database named in the descriptor (default `energy_data`) is
//! created on first use. Upserts use the row alias form of
//! `ON DUPLICATE KEY UPDATE`, which needs MySQL 8.0.19 or newer.

use sqlx::{AnyConnection, Connection};
use tracing::{debug, info, instrument};
use url::Url;

use super::dialect::Dialect;
use super::error::{StorageError, StorageResult};
use super::sql::{PoolSettings, SqlBackend, database_from_url, display_target};

/// Database used when the descriptor names none
pub const DEFAULT_DATABASE: &str = "energy_data";

/// MySQL fragments
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn value_type(&self) -> &'static str {
        "DOUBLE"
    }

    fn date_param(&self, placeholder: &str) -> String {
        format!("CAST({placeholder} AS DATE)")
    }

    fn time_param(&self, placeholder: &str) -> String {
        format!("CAST({placeholder} AS TIME)")
    }

    fn date_text(&self, expr: &str) -> String {
        format!("DATE_FORMAT({expr}, '%Y-%m-%d')")
    }

    fn time_text(&self, expr: &str) -> String {
        format!("TIME_FORMAT({expr}, '%H:%i')")
    }

    fn hour_bucket(&self, expr: &str) -> String {
        format!("TIME_FORMAT({expr}, '%H:00')")
    }

    fn month_start(&self, expr: &str) -> String {
        format!("DATE_FORMAT({expr}, '%Y-%m-01')")
    }

    fn upsert_clause(&self) -> &'static str {
        "AS new_value ON DUPLICATE KEY UPDATE value = new_value.value"
    }
}

/// MySQL storage backend
pub type MySqlBackend = SqlBackend<MySqlDialect>;

impl SqlBackend<MySqlDialect> {
    /// Connect to the server in `url`, creating the database if needed
    #[instrument(skip_all, fields(host = url.host_str()))]
    pub async fn open_mysql(url: &Url, settings: &PoolSettings) -> StorageResult<Self> {
        sqlx::any::install_default_drivers();

        let database = database_from_url(url, DEFAULT_DATABASE)?;
        let target = display_target(url, database);
        info!("initializing MySQL backend at: {}", target);

        let mut server_url = url.clone();
        server_url.set_path("");
        let mut conn = AnyConnection::connect(server_url.as_str())
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("ensuring database {database} exists");
        sqlx::query(&format!("CREATE DATABASE IF NOT EXISTS `{database}`"))
            .execute(&mut conn)
            .await?;
        conn.close().await?;

        let mut database_url = url.clone();
        database_url.set_path(&format!("/{database}"));
        let pool = settings
            .pool_options()
            .connect(database_url.as_str())
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        Self::with_pool(pool, MySqlDialect, target).await
    }
}
