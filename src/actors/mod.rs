//! Actor-based collection
//!
//! Collection runs as an independent async task that owns its timer and
//! talks to the rest of the program only through a command channel.
//!
//! ```text
//!   Timer tick ──┐
//!                ├─> CollectorActor ─> RecordSource::fetch ─> StorageBackend::bulk_insert
//!   Commands ────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: The actor has an mpsc command channel for control messages
//! 2. **Request/Response**: oneshot channels for results of on-demand runs

pub mod collector;
pub mod messages;
