//! File-backed record source
//!
//! Reads a JSON array of positional records
//! (`[namespace, "DD-MM-YYYY", "HH:MM", tag, value]`) that an external
//! scraper keeps rewriting, and hands the collector the ones in range.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::actors::collector::RecordSource;
use crate::codec::Day;
use crate::storage::{DataPoint, RawRecord};

/// Parse a JSON array of raw records
pub fn parse_records(json: &str) -> Result<Vec<DataPoint>> {
    let records: Vec<RawRecord> = serde_json::from_str(json).context("expected a JSON array of records")?;
    records
        .into_iter()
        .enumerate()
        .map(|(idx, record)| {
            DataPoint::try_from(record).with_context(|| format!("invalid record at index {idx}"))
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecordSource for JsonFileSource {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn fetch(&self, from: Day, to: Day) -> Result<Vec<DataPoint>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;

        let points: Vec<DataPoint> = parse_records(&content)?
            .into_iter()
            .filter(|point| from <= point.date && point.date <= to)
            .collect();

        debug!("{} records in range", points.len());
        Ok(points)
    }
}
