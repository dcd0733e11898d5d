//! CollectorActor - Pulls records from a source into storage
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → latest_date(namespace) → RecordSource::fetch(from, today) → bulk_insert
//!     ↑
//!     └─── Commands (CollectNow, UpdateInterval, Shutdown)
//! ```
//!
//! A run resumes from the latest stored day rather than the day after it:
//! that day may have been only partially published when it was last
//! fetched, and re-inserting its records is an upsert.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Local, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::codec::Day;
use crate::config::CollectorConfig;
use crate::storage::{DataPoint, StorageBackend};

use super::messages::{CollectionReport, CollectorCommand};

/// Where collected records come from (a scraper, a file drop, an API)
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch every record published for the days `from..=to`
    async fn fetch(&self, from: Day, to: Day) -> Result<Vec<DataPoint>>;
}

fn today() -> Day {
    Day::from(Local::now().date_naive())
}

/// Actor that periodically collects one namespace
pub struct CollectorActor {
    namespace: String,

    source: Arc<dyn RecordSource>,

    storage: Arc<dyn StorageBackend>,

    /// Start day when the namespace holds no data yet
    default_start: Option<Day>,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<CollectorCommand>,

    /// Current collection interval
    interval_duration: Duration,
}

impl CollectorActor {
    pub fn new(
        config: CollectorConfig,
        source: Arc<dyn RecordSource>,
        storage: Arc<dyn StorageBackend>,
        command_rx: mpsc::Receiver<CollectorCommand>,
    ) -> Self {
        Self {
            namespace: config.namespace,
            source,
            storage,
            default_start: config.default_start,
            command_rx,
            interval_duration: Duration::from_secs(config.interval_secs.max(1)),
        }
    }

    /// Run the actor's main loop
    ///
    /// This is the entry point for the actor. It runs until:
    /// - A Shutdown command is received
    /// - The command channel is closed
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn run(mut self) {
        debug!("starting collector actor");

        let mut ticker = interval(self.interval_duration);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // failures are retried on the next tick
                    if let Err(e) = self.collect(None).await {
                        error!("collection failed: {:#}", e);
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        CollectorCommand::CollectNow { from, respond_to } => {
                            debug!("received CollectNow command");
                            let result = self.collect(from).await;
                            let _ = respond_to.send(result);
                        }

                        CollectorCommand::UpdateInterval { interval_secs } => {
                            debug!("updating interval to {interval_secs}s");
                            self.interval_duration = Duration::from_secs(interval_secs.max(1));
                            ticker = interval(self.interval_duration);
                        }

                        CollectorCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("collector actor stopped");
    }

    /// Resolve the start day for a run without an explicit one
    async fn resume_from(&self) -> Result<Day> {
        let latest = self
            .storage
            .latest_date(&self.namespace)
            .await
            .context("failed to look up latest stored day")?;

        Ok(latest.or(self.default_start).unwrap_or_else(today))
    }

    #[instrument(skip(self), fields(namespace = %self.namespace))]
    async fn collect(&self, from: Option<Day>) -> Result<CollectionReport> {
        let from = match from {
            Some(from) => from,
            None => self.resume_from().await?,
        };
        let to = today();

        let inserted = if from > to {
            debug!("start day {from} is in the future, nothing to collect");
            0
        } else {
            trace!("fetching records from {from} to {to}");
            let points = self
                .source
                .fetch(from, to)
                .await
                .context("record source failed")?;

            let count = points.len();
            self.storage
                .bulk_insert(points)
                .await
                .context("failed to store collected records")?;
            count
        };

        info!("collected {inserted} records ({from} to {to})");

        Ok(CollectionReport {
            namespace: self.namespace.clone(),
            from,
            to,
            inserted,
            finished_at: Utc::now(),
        })
    }
}

/// Handle for controlling a CollectorActor
///
/// This handle provides a typed API for sending commands to the actor.
/// It can be cloned and shared across tasks.
#[derive(Clone)]
pub struct CollectorHandle {
    /// Command sender
    sender: mpsc::Sender<CollectorCommand>,

    pub namespace: String,
}

impl CollectorHandle {
    /// Spawn a new collector actor
    ///
    /// This creates the actor, spawns it as a tokio task, and returns a handle.
    /// The first run starts immediately.
    pub fn spawn(
        config: CollectorConfig,
        source: Arc<dyn RecordSource>,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let namespace = config.namespace.clone();
        let actor = CollectorActor::new(config, source, storage, cmd_rx);

        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            namespace,
        }
    }

    /// Trigger an immediate run
    ///
    /// With `from = None` the run resumes from the latest stored day.
    pub async fn collect_now(&self, from: Option<Day>) -> Result<CollectionReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(CollectorCommand::CollectNow {
                from,
                respond_to: tx,
            })
            .await
            .context("failed to send CollectNow command")?;

        rx.await.context("failed to receive response")?
    }

    /// Update the collection interval
    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        self.sender
            .send(CollectorCommand::UpdateInterval { interval_secs })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    /// Gracefully shut down the collector
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(CollectorCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
