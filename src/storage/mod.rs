//! Storage backends for time-series energy measurements
//!
//! Every measurement is one float keyed by
//! `(namespace, date, time, tag)`. This module provides that store behind
//! one async contract with interchangeable engines.
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` allows swapping implementations
//! - **Async**: All operations are async so readers and the collector
//!   share one backend across Tokio tasks
//! - **Upserts only**: No operation can create a duplicate key
//!
//! ## Backends
//!
//! - **In-Memory** (`cache://`): No persistence, for testing and caching
//! - **SQLite** (`sqlite://path`): Embedded database file
//! - **MySQL** (`mysql://...`) and **PostgreSQL** (`postgres://...`)
//!
//! The SQL engines share one implementation, [`sql::SqlBackend`], and
//! differ only in their [`dialect::Dialect`].
//!
//! ## Usage
//!
//! ```no_run
//! use energy_store::codec::Interval;
//! use energy_store::storage;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = storage::open("sqlite://./energy.db").await?;
//!     let day = backend
//!         .retrieve("noga2.energy", "01-02-2022".parse()?, Interval::Day, None)
//!         .await?;
//!     println!("{}", serde_json::to_string(&day)?);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod dialect;
pub mod error;
pub mod factory;
pub mod memory;
pub mod schema;
pub mod sql;

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use factory::{ConnectionDescriptor, open, open_with};
pub use memory::MemoryBackend;
pub use schema::{DataPoint, QueryResult, RawRecord, dedup_last_wins};
pub use sql::{PoolSettings, SqlBackend};
