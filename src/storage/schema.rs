//! Stored record shape and query result definitions
//!
//! There is exactly one record shape: a value keyed by
//! `(namespace, date, time, tag)`. The key is unique; the value is the
//! only field an insert can change.
//!
//! Results are nested maps that serialize straight into the wire shape
//! `{namespace: {"DD-MM-YYYY": {"HH:MM": {tag: value}}}}`.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::codec::{Day, TimeOfDay};

use super::error::StorageError;

/// Values per tag within one bucket
///
/// `None` only appears for an exact lookup of a key that does not exist.
pub type TagValues = BTreeMap<String, Option<f64>>;

/// Buckets of one day (or month), keyed by time of day
pub type DayBuckets = BTreeMap<TimeOfDay, TagValues>;

/// Days of one namespace
pub type NamespaceDays = BTreeMap<Day, DayBuckets>;

/// Result of `retrieve` and `retrieve_range`
pub type QueryResult = BTreeMap<String, NamespaceDays>;

/// A single stored measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Dot-delimited partition key (e.g. "noga2.energy")
    pub namespace: String,

    /// Calendar day of the measurement
    pub date: Day,

    /// Time of day, minute resolution
    pub time: TimeOfDay,

    /// Metric name within the slot
    pub tag: String,

    pub value: f64,
}

/// Unique key of a data point
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataKey {
    pub namespace: String,
    pub date: Day,
    pub time: TimeOfDay,
    pub tag: String,
}

impl DataPoint {
    pub fn new(
        namespace: impl Into<String>,
        date: Day,
        time: TimeOfDay,
        tag: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            date,
            time,
            tag: tag.into(),
            value,
        }
    }

    pub fn key(&self) -> DataKey {
        DataKey {
            namespace: self.namespace.clone(),
            date: self.date,
            time: self.time,
            tag: self.tag.clone(),
        }
    }
}

/// Positional wire record: `(namespace, "DD-MM-YYYY", "HH:MM", tag, value)`
///
/// Deserializes from a JSON array of five elements, which is what
/// collectors hand over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord(pub String, pub String, pub String, pub String, pub f64);

impl TryFrom<RawRecord> for DataPoint {
    type Error = StorageError;

    fn try_from(record: RawRecord) -> Result<Self, Self::Error> {
        let RawRecord(namespace, date, time, tag, value) = record;
        Ok(DataPoint {
            namespace,
            date: date.parse()?,
            time: time.parse()?,
            tag,
            value,
        })
    }
}

/// Drop all but the last occurrence of every key
///
/// Some engines reject a multi-row upsert that names the same key twice,
/// so every backend runs batches through this first. The surviving
/// points keep the order in which their keys first appeared.
pub fn dedup_last_wins(points: Vec<DataPoint>) -> Vec<DataPoint> {
    let mut slots: HashMap<DataKey, usize> = HashMap::with_capacity(points.len());
    let mut unique: Vec<DataPoint> = Vec::with_capacity(points.len());

    for point in points {
        match slots.entry(point.key()) {
            Entry::Occupied(slot) => unique[*slot.get()] = point,
            Entry::Vacant(slot) => {
                slot.insert(unique.len());
                unique.push(point);
            }
        }
    }

    unique
}

/// Add `value` to the running sum of `tag` in `bucket`
pub(crate) fn accumulate(buckets: &mut DayBuckets, bucket: TimeOfDay, tag: &str, value: f64) {
    let slot = buckets
        .entry(bucket)
        .or_default()
        .entry(tag.to_string())
        .or_insert(Some(0.0));
    *slot = Some(slot.unwrap_or(0.0) + value);
}
