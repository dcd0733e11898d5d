//! In-memory storage backend (no persistence)
//!
//! Data lives in a four-level ordered map
//! `namespace → date → time → tag → value`, so range scans over dates
//! and `latest_date` come straight from the map's ordering.
//!
//! ## Locking
//!
//! A single mutex guards the whole map and is held for the full body of
//! every operation. Readers never observe half of a bulk insert. Writes
//! arrive about once an hour, so one coarse lock is enough; sharding by
//! namespace is the next step if write frequency grows.
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Unbounded**: Nothing is evicted until `clear()`

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::codec::{Day, Interval, TimeOfDay};

use super::backend::{HealthStatus, StorageBackend};
use super::error::StorageResult;
use super::schema::{DataPoint, DayBuckets, NamespaceDays, QueryResult, accumulate};

type Slots = BTreeMap<TimeOfDay, BTreeMap<String, f64>>;
type Store = BTreeMap<String, BTreeMap<Day, Slots>>;

/// In-memory storage backend
#[derive(Default)]
pub struct MemoryBackend {
    data: Mutex<Store>,
}

impl MemoryBackend {
    /// Create a new, empty in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        // every mutation is a single map write, so a poisoned map is still consistent
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Tags of one slot that pass the optional tag filter
fn matching<'a>(
    tags: &'a BTreeMap<String, f64>,
    tag: Option<&'a str>,
) -> impl Iterator<Item = (&'a str, f64)> + 'a {
    tags.iter()
        .filter(move |(name, _)| tag.is_none_or(|wanted| wanted == name.as_str()))
        .map(|(name, value)| (name.as_str(), *value))
}

/// Bucket one day's slots for `time`
///
/// With `fill_missing`, an exact lookup of an absent tag still yields an
/// entry holding `None`. Buckets without any tag are never created.
fn bucket_day(slots: &Slots, time: Interval, tag: Option<&str>, fill_missing: bool) -> DayBuckets {
    let mut buckets = DayBuckets::new();

    match time {
        Interval::Exact(at) => {
            let stored = slots.get(&at);
            match tag {
                Some(tag) => {
                    let value = stored.and_then(|tags| tags.get(tag)).copied();
                    if value.is_some() || fill_missing {
                        buckets
                            .entry(at)
                            .or_default()
                            .insert(tag.to_string(), value);
                    }
                }
                None => {
                    for (name, value) in stored.into_iter().flat_map(|tags| matching(tags, None)) {
                        buckets
                            .entry(at)
                            .or_default()
                            .insert(name.to_string(), Some(value));
                    }
                }
            }
        }
        Interval::All => {
            for (at, tags) in slots {
                for (name, value) in matching(tags, tag) {
                    buckets
                        .entry(*at)
                        .or_default()
                        .insert(name.to_string(), Some(value));
                }
            }
        }
        Interval::Hour | Interval::Day | Interval::Month => {
            for (at, tags) in slots {
                let bucket = if time == Interval::Hour {
                    at.hour_bucket()
                } else {
                    TimeOfDay::MIDNIGHT
                };
                for (name, value) in matching(tags, tag) {
                    accumulate(&mut buckets, bucket, name, value);
                }
            }
        }
    }

    buckets
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn clear(&self) -> StorageResult<()> {
        debug!("clearing in-memory storage");
        self.lock().clear();
        Ok(())
    }

    async fn bulk_insert(&self, points: Vec<DataPoint>) -> StorageResult<()> {
        trace!("inserting {} points into memory", points.len());

        let mut store = self.lock();
        // applying in order already makes the last duplicate win
        for point in points {
            store
                .entry(point.namespace)
                .or_default()
                .entry(point.date)
                .or_default()
                .entry(point.time)
                .or_default()
                .insert(point.tag, point.value);
        }

        Ok(())
    }

    async fn retrieve(
        &self,
        namespace: &str,
        date: Day,
        time: Interval,
        tag: Option<&str>,
    ) -> StorageResult<QueryResult> {
        trace!("retrieving {namespace} {date} ({time})");

        let store = self.lock();
        let empty = Slots::new();
        let slots = store
            .get(namespace)
            .and_then(|days| days.get(&date))
            .unwrap_or(&empty);

        let date_key = if time == Interval::Month {
            date.first_of_month()
        } else {
            date
        };

        let mut days = NamespaceDays::new();
        days.insert(date_key, bucket_day(slots, time, tag, true));

        Ok(QueryResult::from([(namespace.to_string(), days)]))
    }

    async fn retrieve_value(
        &self,
        namespace: &str,
        date: Day,
        time: TimeOfDay,
        tag: &str,
    ) -> StorageResult<Option<f64>> {
        Ok(self
            .lock()
            .get(namespace)
            .and_then(|days| days.get(&date))
            .and_then(|slots| slots.get(&time))
            .and_then(|tags| tags.get(tag))
            .copied())
    }

    async fn retrieve_range(
        &self,
        namespace: &str,
        from: Day,
        to: Day,
        tag: Option<&str>,
        time: Interval,
    ) -> StorageResult<QueryResult> {
        trace!("retrieving {namespace} from {from} to {to} ({time})");

        let mut days = NamespaceDays::new();
        let store = self.lock();

        if let Some(stored) = store.get(namespace).filter(|_| from <= to) {
            for (day, slots) in stored.range(from..=to) {
                let buckets = bucket_day(slots, time, tag, false);
                if buckets.is_empty() {
                    continue;
                }

                if time == Interval::Month {
                    let month = days.entry(day.first_of_month()).or_default();
                    for (bucket, tags) in buckets {
                        for (name, value) in tags {
                            accumulate(month, bucket, &name, value.unwrap_or(0.0));
                        }
                    }
                } else {
                    days.insert(*day, buckets);
                }
            }
        }

        Ok(QueryResult::from([(namespace.to_string(), days)]))
    }

    async fn latest_date(&self, namespace: &str) -> StorageResult<Option<Day>> {
        Ok(self
            .lock()
            .get(namespace)
            .and_then(|days| days.keys().next_back().copied()))
    }

    async fn size(&self) -> StorageResult<u64> {
        let count = self
            .lock()
            .values()
            .flat_map(|days| days.values())
            .flat_map(|slots| slots.values())
            .map(|tags| tags.len() as u64)
            .sum();
        Ok(count)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let store = self.lock();
        let entries: usize = store
            .values()
            .flat_map(|days| days.values())
            .flat_map(|slots| slots.values())
            .map(|tags| tags.len())
            .sum();

        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("namespaces".to_string(), store.len().to_string()),
                ("entries".to_string(), entries.to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
