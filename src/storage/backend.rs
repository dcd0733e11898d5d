//! Storage backend trait definition
//!
//! This module defines the `StorageBackend` trait that the in-memory
//! backend and every SQL dialect implement with identical semantics.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::codec::{Day, Interval, TimeOfDay};

use super::error::StorageResult;
use super::schema::{DataPoint, QueryResult};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Trait for measurement storage backends
///
/// One instance is shared by a periodic writer (the collector) and any
/// number of concurrent readers, so implementations must be
/// `Send + Sync`.
///
/// ## Keys and upserts
///
/// `(namespace, date, time, tag)` identifies a value. Writing an existing
/// key replaces its value; no operation ever creates a duplicate.
///
/// ## Aggregation
///
/// Hour, day and month views are computed from the raw entries on every
/// call, so they always reflect the latest inserts.
///
/// ## Errors
///
/// Missing data is reported as empty results or `None`. Engine errors
/// are propagated as they are; nothing here retries.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Delete all data
    async fn clear(&self) -> StorageResult<()>;

    /// Upsert one data point
    async fn insert(&self, point: DataPoint) -> StorageResult<()> {
        self.bulk_insert(vec![point]).await
    }

    /// Upsert a batch of data points
    ///
    /// When the same key appears more than once in `points`, the last
    /// occurrence wins.
    async fn bulk_insert(&self, points: Vec<DataPoint>) -> StorageResult<()>;

    /// Retrieve one day of a namespace
    ///
    /// - `Interval::Exact(t)` with a tag returns `{t: {tag: value}}`, with
    ///   `None` when the key does not exist; without a tag it returns every
    ///   tag stored at `t`
    /// - `Hour` sums per hour, `Day` sums the whole day under `00:00`,
    ///   `Month` reports the day's sums under the first of its month
    /// - `All` returns every raw entry
    ///
    /// The date entry is always present, even if it holds no buckets.
    async fn retrieve(
        &self,
        namespace: &str,
        date: Day,
        time: Interval,
        tag: Option<&str>,
    ) -> StorageResult<QueryResult>;

    /// Exact single-point lookup
    async fn retrieve_value(
        &self,
        namespace: &str,
        date: Day,
        time: TimeOfDay,
        tag: &str,
    ) -> StorageResult<Option<f64>>;

    /// Retrieve every day in `[from, to]` with the same bucketing as
    /// `retrieve`
    ///
    /// Only days (or months, for `Interval::Month`) with at least one
    /// matching entry appear in the result.
    async fn retrieve_range(
        &self,
        namespace: &str,
        from: Day,
        to: Day,
        tag: Option<&str>,
        time: Interval,
    ) -> StorageResult<QueryResult>;

    /// Most recent date stored for a namespace
    async fn latest_date(&self, namespace: &str) -> StorageResult<Option<Day>>;

    /// Number of stored `(namespace, date, time, tag)` entries
    async fn size(&self) -> StorageResult<u64>;

    /// Check backend health
    ///
    /// Performs a lightweight operation to verify the backend
    /// is operational (e.g., ping database).
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
