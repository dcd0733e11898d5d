//! Generic SQL storage backend
//!
//! One implementation of the storage contract for every SQL engine.
//! Query construction lives here; the engine-specific pieces come from a
//! [`Dialect`]. Connections come from an `sqlx::AnyPool` built by each
//! adapter (`sqlite`, `mysql`, `postgres`).
//!
//! ## Queries
//!
//! - Values are always bound as parameters, never formatted into SQL
//! - Hour, day and month views are `SUM(value) ... GROUP BY` on the engine
//! - Bulk inserts are deduplicated and written as multi-row upserts
//!   inside a single transaction
//!
//! ## Connections
//!
//! Every statement checks a connection out of the pool and returns it
//! when the statement (or transaction) is dropped, on success and error
//! paths alike.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::{AnyArguments, AnyPoolOptions};
use sqlx::{Any, AnyPool, Row};
use tracing::{debug, info, instrument, trace, warn};

use crate::codec::{Day, Interval, TimeOfDay};

use super::backend::{HealthStatus, StorageBackend};
use super::dialect::Dialect;
use super::error::{StorageError, StorageResult};
use super::schema::{DataPoint, DayBuckets, NamespaceDays, QueryResult, dedup_last_wins};

/// Table holding every data point
pub const TABLE: &str = "data_points";

/// Rows per INSERT statement; keeps every engine below its bind limit
const MAX_ROWS_PER_STATEMENT: usize = 1000;

/// Connection pool settings shared by the SQL adapters
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Upper bound on concurrently open connections
    pub max_connections: u32,

    /// How long a caller waits for a free connection
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolSettings {
    pub(crate) fn pool_options(&self) -> AnyPoolOptions {
        AnyPoolOptions::new()
            .max_connections(self.max_connections.max(1))
            .acquire_timeout(self.acquire_timeout)
    }
}

/// Database names are spliced into `CREATE DATABASE`, which cannot bind
/// identifiers, so only `[A-Za-z0-9_]` is accepted
pub(crate) fn validate_database_name(name: &str) -> StorageResult<&str> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name)
    } else {
        Err(StorageError::InvalidConfig(format!(
            "invalid database name '{name}': only letters, digits and '_' are allowed"
        )))
    }
}

/// Database named by the URL path, or `default` when the path is empty
pub(crate) fn database_from_url<'u>(url: &'u url::Url, default: &'u str) -> StorageResult<&'u str> {
    let name = url.path().trim_start_matches('/');
    validate_database_name(if name.is_empty() { default } else { name })
}

/// `scheme://host:port/database` without credentials or query
pub(crate) fn display_target(url: &url::Url, database: &str) -> String {
    let host = url.host_str().unwrap_or("localhost");
    match url.port() {
        Some(port) => format!("{}://{host}:{port}/{database}", url.scheme()),
        None => format!("{}://{host}/{database}", url.scheme()),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Param {
    Text(String),
    Real(f64),
}

/// SQL text plus its parameters, numbered by the dialect
#[derive(Debug)]
pub(crate) struct Statement<'d, D: Dialect> {
    dialect: &'d D,
    sql: String,
    params: Vec<Param>,
}

impl<'d, D: Dialect> Statement<'d, D> {
    fn new(dialect: &'d D, sql: impl Into<String>) -> Self {
        Self {
            dialect,
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Register a parameter and return its placeholder
    fn bind(&mut self, param: Param) -> String {
        self.params.push(param);
        self.dialect.placeholder(self.params.len())
    }

    fn bind_text(&mut self, value: impl Into<String>) -> String {
        self.bind(Param::Text(value.into()))
    }

    fn bind_date(&mut self, day: Day) -> String {
        let placeholder = self.bind_text(day.canonical());
        self.dialect.date_param(&placeholder)
    }

    fn bind_time(&mut self, time: TimeOfDay) -> String {
        let placeholder = self.bind_text(time.canonical());
        self.dialect.time_param(&placeholder)
    }

    fn bind_real(&mut self, value: f64) -> String {
        self.bind(Param::Real(value))
    }

    pub(crate) fn sql(&self) -> &str {
        &self.sql
    }

    fn query(&self) -> sqlx::query::Query<'_, Any, AnyArguments<'_>> {
        self.params
            .iter()
            .fold(sqlx::query(&self.sql), |query, param| match param {
                Param::Text(text) => query.bind(text.clone()),
                Param::Real(value) => query.bind(*value),
            })
    }
}

/// Which dates a select covers
#[derive(Debug, Clone, Copy)]
enum DateFilter {
    On(Day),
    Between(Day, Day),
}

/// SQL storage backend, generic over the engine dialect
pub struct SqlBackend<D: Dialect> {
    pool: AnyPool,
    dialect: D,
    /// Connection target without credentials, for logs and health reports
    target: String,
}

impl<D: Dialect> SqlBackend<D> {
    /// Wrap an open pool and make sure the table exists
    #[instrument(skip_all, fields(dialect = dialect.name()))]
    pub async fn with_pool(
        pool: AnyPool,
        dialect: D,
        target: impl Into<String>,
    ) -> StorageResult<Self> {
        let backend = Self {
            pool,
            dialect,
            target: target.into(),
        };

        debug!("ensuring table {TABLE} exists");
        sqlx::query(&backend.create_table_sql())
            .execute(&backend.pool)
            .await?;

        info!("{} backend ready at {}", backend.dialect.name(), backend.target);
        Ok(backend)
    }

    pub(crate) fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {TABLE} (\
             namespace VARCHAR(80) NOT NULL, \
             date DATE NOT NULL, \
             time TIME NOT NULL, \
             tag VARCHAR(50) NOT NULL, \
             value {} NOT NULL, \
             CONSTRAINT {TABLE}_pk PRIMARY KEY (namespace, date, time, tag))",
            self.dialect.value_type()
        )
    }

    /// One multi-row upsert for `points`
    pub(crate) fn upsert_statement(&self, points: &[DataPoint]) -> Statement<'_, D> {
        let mut stmt = Statement::new(
            &self.dialect,
            format!("INSERT INTO {TABLE} (namespace, date, time, tag, value) VALUES "),
        );

        for (idx, point) in points.iter().enumerate() {
            let namespace = stmt.bind_text(point.namespace.as_str());
            let date = stmt.bind_date(point.date);
            let time = stmt.bind_time(point.time);
            let tag = stmt.bind_text(point.tag.as_str());
            let value = stmt.bind_real(point.value);

            if idx > 0 {
                stmt.push(", ");
            }
            stmt.push(&format!("({namespace}, {date}, {time}, {tag}, {value})"));
        }

        stmt.push(" ").push(self.dialect.upsert_clause());
        stmt
    }

    /// Select rows shaped `(date, bucket, tag, value)` for `time`
    fn select_statement(
        &self,
        namespace: &str,
        dates: DateFilter,
        time: Interval,
        tag: Option<&str>,
    ) -> Statement<'_, D> {
        let d = &self.dialect;
        let (date_expr, bucket_expr, value_expr, group_by) = match time {
            Interval::Hour => {
                let hour = d.hour_bucket("time");
                let group = format!("namespace, date, {hour}, tag");
                (d.date_text("date"), hour, "SUM(value)", Some(group))
            }
            Interval::Day => (
                d.date_text("date"),
                "'00:00'".to_string(),
                "SUM(value)",
                Some("namespace, date, tag".to_string()),
            ),
            Interval::Month => {
                let month = d.month_start("date");
                let group = format!("namespace, {month}, tag");
                (month, "'00:00'".to_string(), "SUM(value)", Some(group))
            }
            Interval::Exact(_) | Interval::All => {
                (d.date_text("date"), d.time_text("time"), "value", None)
            }
        };

        let mut stmt = Statement::new(
            d,
            format!("SELECT {date_expr}, {bucket_expr}, tag, {value_expr} FROM {TABLE} WHERE namespace = "),
        );
        let ns = stmt.bind_text(namespace);
        stmt.push(&ns);

        match dates {
            DateFilter::On(day) => {
                let date = stmt.bind_date(day);
                stmt.push(&format!(" AND date = {date}"));
            }
            DateFilter::Between(from, to) => {
                let from = stmt.bind_date(from);
                let to = stmt.bind_date(to);
                stmt.push(&format!(" AND date BETWEEN {from} AND {to}"));
            }
        }

        if let Interval::Exact(at) = time {
            let at = stmt.bind_time(at);
            stmt.push(&format!(" AND time = {at}"));
        }

        if let Some(tag) = tag {
            let tag = stmt.bind_text(tag);
            stmt.push(&format!(" AND tag = {tag}"));
        }

        if let Some(group_by) = group_by {
            stmt.push(&format!(" GROUP BY {group_by}"));
        }

        stmt
    }

    /// Run a select and fold its rows into per-day buckets
    async fn fetch_days(&self, stmt: Statement<'_, D>) -> StorageResult<NamespaceDays> {
        trace!("executing: {}", stmt.sql());
        let rows = stmt.query().fetch_all(&self.pool).await?;

        let mut days = NamespaceDays::new();
        for row in rows {
            let date: String = row.try_get(0)?;
            let bucket: String = row.try_get(1)?;
            let tag: String = row.try_get(2)?;
            let value: f64 = row.try_get(3)?;

            let day = Day::from_canonical(&date)
                .map_err(|e| StorageError::BackendError(format!("unexpected date from engine: {e}")))?;
            let bucket: TimeOfDay = bucket
                .parse()
                .map_err(|e| StorageError::BackendError(format!("unexpected time from engine: {e}")))?;

            days.entry(day)
                .or_default()
                .entry(bucket)
                .or_default()
                .insert(tag, Some(value));
        }

        debug!("query returned {} days", days.len());
        Ok(days)
    }
}

#[async_trait]
impl<D: Dialect> StorageBackend for SqlBackend<D> {
    #[instrument(skip(self), fields(dialect = self.dialect.name()))]
    async fn clear(&self) -> StorageResult<()> {
        info!("deleting all rows from {TABLE}");
        sqlx::query(&format!("DELETE FROM {TABLE}"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, points), fields(dialect = self.dialect.name(), count = points.len()))]
    async fn bulk_insert(&self, points: Vec<DataPoint>) -> StorageResult<()> {
        if points.is_empty() {
            return Ok(());
        }

        let points = dedup_last_wins(points);
        debug!("upserting {} points", points.len());

        let mut tx = self.pool.begin().await?;
        for chunk in points.chunks(MAX_ROWS_PER_STATEMENT) {
            let stmt = self.upsert_statement(chunk);
            stmt.query().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        trace!("bulk insert complete");
        Ok(())
    }

    #[instrument(skip(self), fields(dialect = self.dialect.name()))]
    async fn retrieve(
        &self,
        namespace: &str,
        date: Day,
        time: Interval,
        tag: Option<&str>,
    ) -> StorageResult<QueryResult> {
        let mut days = match (time, tag) {
            (Interval::Exact(at), Some(tag)) => {
                let value = self.retrieve_value(namespace, date, at, tag).await?;
                let bucket = DayBuckets::from([(at, [(tag.to_string(), value)].into())]);
                NamespaceDays::from([(date, bucket)])
            }
            _ => {
                let stmt = self.select_statement(namespace, DateFilter::On(date), time, tag);
                self.fetch_days(stmt).await?
            }
        };

        let date_key = if time == Interval::Month {
            date.first_of_month()
        } else {
            date
        };
        days.entry(date_key).or_default();

        Ok(QueryResult::from([(namespace.to_string(), days)]))
    }

    #[instrument(skip(self), fields(dialect = self.dialect.name()))]
    async fn retrieve_value(
        &self,
        namespace: &str,
        date: Day,
        time: TimeOfDay,
        tag: &str,
    ) -> StorageResult<Option<f64>> {
        let mut stmt = Statement::new(
            &self.dialect,
            format!("SELECT value FROM {TABLE} WHERE namespace = "),
        );
        let ns = stmt.bind_text(namespace);
        let date = stmt.bind_date(date);
        let time = stmt.bind_time(time);
        let tag = stmt.bind_text(tag);
        stmt.push(&format!("{ns} AND date = {date} AND time = {time} AND tag = {tag}"));

        let row = stmt.query().fetch_optional(&self.pool).await?;
        row.map(|row| row.try_get::<f64, _>(0))
            .transpose()
            .map_err(StorageError::from)
    }

    #[instrument(skip(self), fields(dialect = self.dialect.name()))]
    async fn retrieve_range(
        &self,
        namespace: &str,
        from: Day,
        to: Day,
        tag: Option<&str>,
        time: Interval,
    ) -> StorageResult<QueryResult> {
        let stmt = self.select_statement(namespace, DateFilter::Between(from, to), time, tag);
        let days = self.fetch_days(stmt).await?;
        Ok(QueryResult::from([(namespace.to_string(), days)]))
    }

    #[instrument(skip(self), fields(dialect = self.dialect.name()))]
    async fn latest_date(&self, namespace: &str) -> StorageResult<Option<Day>> {
        let mut stmt = Statement::new(
            &self.dialect,
            format!(
                "SELECT {} FROM {TABLE} WHERE namespace = ",
                self.dialect.date_text("MAX(date)")
            ),
        );
        let ns = stmt.bind_text(namespace);
        stmt.push(&ns);

        let row = stmt.query().fetch_one(&self.pool).await?;
        let latest: Option<String> = row.try_get(0)?;

        latest.map(|date| Day::from_canonical(&date)).transpose()
    }

    #[instrument(skip(self), fields(dialect = self.dialect.name()))]
    async fn size(&self) -> StorageResult<u64> {
        let row = sqlx::query(&format!("SELECT COUNT(*) FROM {TABLE}"))
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self), fields(dialect = self.dialect.name()))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        // Simple ping query to verify connection
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), self.dialect.name().to_string());
                metadata.insert("target".to_string(), self.target.clone());
                metadata.insert("pool_size".to_string(), self.pool.size().to_string());

                Ok(HealthStatus {
                    healthy: true,
                    message: format!("{} backend operational", self.dialect.name()),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing {} backend", self.dialect.name());
        self.pool.close().await;
        Ok(())
    }
}
