pub mod actors;
pub mod cache;
pub mod codec;
pub mod config;
pub mod source;
pub mod storage;
pub mod util;

pub use codec::{Day, Interval, TimeOfDay};
pub use storage::{DataPoint, QueryResult, StorageBackend, StorageError, StorageResult};
