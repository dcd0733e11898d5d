//! Message types for actor communication
//!
//! Commands travel over an mpsc channel to one actor; results come back
//! on a oneshot channel carried inside the command.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::codec::Day;

/// Outcome of one collection run
#[derive(Debug, Clone, Serialize)]
pub struct CollectionReport {
    /// Namespace the run wrote to
    pub namespace: String,

    /// First day requested from the source
    pub from: Day,

    /// Last day requested from the source (today)
    pub to: Day,

    /// Records handed to `bulk_insert`
    pub inserted: usize,

    pub finished_at: DateTime<Utc>,
}

/// Commands that can be sent to a CollectorActor
#[derive(Debug)]
pub enum CollectorCommand {
    /// Collect immediately (bypassing the interval timer)
    CollectNow {
        /// Explicit start day; `None` resumes from the latest stored day
        from: Option<Day>,

        /// Channel to send the result back
        respond_to: oneshot::Sender<anyhow::Result<CollectionReport>>,
    },

    /// Update the collection interval
    ///
    /// The timer restarts, so the next run happens right away.
    UpdateInterval {
        /// New interval in seconds
        interval_secs: u64,
    },

    /// Gracefully shut down the collector
    ///
    /// The actor will finish any in-flight run and then exit.
    Shutdown,
}
