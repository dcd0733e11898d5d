//! Behaviour every storage backend must share
//!
//! Each check runs against the in-memory backend and SQLite on every
//! `cargo test`. The MySQL and PostgreSQL runs need a server and are
//! ignored by default:
//!
//! ```text
//! ENERGY_STORE_MYSQL_URI=mysql://root:pw@localhost:3306 \
//! ENERGY_STORE_POSTGRES_URI=postgres://postgres:pw@localhost:5432 \
//!     cargo test --test integration_tests -- --ignored
//! ```

use std::collections::BTreeSet;

use energy_store::codec::{Interval, TimeOfDay};
use energy_store::storage::{DataPoint, StorageBackend};
use pretty_assertions::assert_eq;

use super::helpers::*;

async fn simple_retrieve(store: &dyn StorageBackend) {
    populate(store).await;

    let result = store
        .retrieve(NAMESPACE, day(DATE_1_2_22), Interval::Exact(at("10:00")), Some(TAG_1))
        .await
        .unwrap();

    assert_eq!(result[NAMESPACE][&day(DATE_1_2_22)][&at("10:00")][TAG_1], Some(1.0));
}

async fn exact_time_without_tag(store: &dyn StorageBackend) {
    populate(store).await;

    let result = store
        .retrieve(NAMESPACE, day(DATE_1_2_22), Interval::Exact(at("10:00")), None)
        .await
        .unwrap();
    let slot = &result[NAMESPACE][&day(DATE_1_2_22)][&at("10:00")];

    assert_eq!(slot.len(), 2);
    assert_eq!(slot[TAG_1], Some(1.0));
    assert_eq!(slot[TAG_2], Some(2.0));
}

async fn exact_missing_key_is_none(store: &dyn StorageBackend) {
    populate(store).await;

    let result = store
        .retrieve(NAMESPACE, day(DATE_1_2_22), Interval::Exact(at("09:00")), Some(TAG_1))
        .await
        .unwrap();

    assert_eq!(result[NAMESPACE][&day(DATE_1_2_22)][&at("09:00")][TAG_1], None);
}

async fn retrieve_all(store: &dyn StorageBackend) {
    populate(store).await;

    let result = store
        .retrieve(NAMESPACE, day(DATE_1_2_22), Interval::All, Some(TAG_2))
        .await
        .unwrap();
    let times: Vec<String> = result[NAMESPACE][&day(DATE_1_2_22)]
        .keys()
        .map(TimeOfDay::to_string)
        .collect();

    assert_eq!(times, ["10:00", "10:30", "13:10", "13:25"]);
}

async fn hour_with_tag(store: &dyn StorageBackend) {
    populate(store).await;

    let result = store
        .retrieve(NAMESPACE, day(DATE_1_2_22), Interval::Hour, Some(TAG_2))
        .await
        .unwrap();
    let hours = &result[NAMESPACE][&day(DATE_1_2_22)];

    assert_eq!(hours.len(), 2);
    let tags: BTreeSet<&str> = hours.values().flat_map(|tags| tags.keys()).map(String::as_str).collect();
    assert_eq!(tags, BTreeSet::from([TAG_2]));
    assert_eq!(hours[&at("10:00")][TAG_2], Some(6.0));
    assert_eq!(hours[&at("13:00")][TAG_2], Some(13.0));
}

async fn hour_without_tag(store: &dyn StorageBackend) {
    populate(store).await;

    let result = store
        .retrieve(NAMESPACE, day(DATE_1_2_22), Interval::Hour, None)
        .await
        .unwrap();
    let hours = &result[NAMESPACE][&day(DATE_1_2_22)];

    assert_eq!(hours[&at("10:00")].len(), 2);
    assert_eq!(hours[&at("10:00")][TAG_1], Some(4.0));
    assert_eq!(hours[&at("10:00")][TAG_2], Some(6.0));
    assert_eq!(hours[&at("11:00")][TAG_1], Some(5.0));
    assert!(hours.keys().all(|time| time.minute() == 0));
}

async fn day_sums(store: &dyn StorageBackend) {
    populate(store).await;

    let result = store
        .retrieve(NAMESPACE, day(DATE_2_2_22), Interval::Day, None)
        .await
        .unwrap();
    assert_eq!(result[NAMESPACE][&day(DATE_2_2_22)][&TimeOfDay::MIDNIGHT][TAG_2], Some(30.0));

    let result = store
        .retrieve(NAMESPACE, day(DATE_2_2_22), Interval::Day, Some(TAG_2))
        .await
        .unwrap();
    assert_eq!(result[NAMESPACE][&day(DATE_2_2_22)][&TimeOfDay::MIDNIGHT].len(), 1);
}

async fn month_of_single_day(store: &dyn StorageBackend) {
    populate_monthly(store).await;

    let result = store
        .retrieve(NAMESPACE, day("15-01-2011"), Interval::Month, None)
        .await
        .unwrap();
    let month = &result[NAMESPACE][&day("01-01-2011")];

    assert_eq!(month[&TimeOfDay::MIDNIGHT][TAG_1], Some(3.0));
    assert_eq!(month[&TimeOfDay::MIDNIGHT][TAG_2], Some(2.0));
}

async fn unknown_date_is_empty(store: &dyn StorageBackend) {
    populate(store).await;

    let result = store
        .retrieve(NAMESPACE, day("05-05-2020"), Interval::Day, None)
        .await
        .unwrap();

    assert_eq!(result[NAMESPACE].len(), 1);
    assert!(result[NAMESPACE][&day("05-05-2020")].is_empty());
}

async fn size(store: &dyn StorageBackend) {
    populate(store).await;
    assert_eq!(store.size().await.unwrap(), 13);
}

async fn latest_date(store: &dyn StorageBackend) {
    populate(store).await;

    assert_eq!(store.latest_date(NAMESPACE).await.unwrap(), Some(day(DATE_2_2_22)));
    assert_eq!(store.latest_date(NAMESPACE_2).await.unwrap(), Some(day(DATE_2_2_22)));
    assert_eq!(store.latest_date("foo").await.unwrap(), None);
}

async fn latest_date_across_year_boundary(store: &dyn StorageBackend) {
    store.clear().await.unwrap();

    store
        .bulk_insert(vec![
            point(NAMESPACE, "01-01-2022", "00:00", TAG_1, 1.0),
            point(NAMESPACE, "31-12-2021", "23:55", TAG_1, 2.0),
        ])
        .await
        .unwrap();

    assert_eq!(store.latest_date(NAMESPACE).await.unwrap(), Some(day("01-01-2022")));
}

async fn retrieve_value(store: &dyn StorageBackend) {
    populate(store).await;

    let hit = store
        .retrieve_value(NAMESPACE, day(DATE_2_2_22), at("06:40"), TAG_2)
        .await
        .unwrap();
    let miss = store
        .retrieve_value(NAMESPACE, day(DATE_2_2_22), at("06:40"), TAG_1)
        .await
        .unwrap();

    assert_eq!(hit, Some(11.0));
    assert_eq!(miss, None);
}

async fn range_by_day(store: &dyn StorageBackend) {
    populate(store).await;

    let result = store
        .retrieve_range(NAMESPACE, day(DATE_1_2_22), day(DATE_2_2_22), None, Interval::Day)
        .await
        .unwrap();
    let days = &result[NAMESPACE];

    assert_eq!(days.len(), 2);
    assert_eq!(days[&day(DATE_1_2_22)][&TimeOfDay::MIDNIGHT][TAG_1], Some(9.0));
    assert_eq!(days[&day(DATE_1_2_22)][&TimeOfDay::MIDNIGHT][TAG_2], Some(19.0));
    assert_eq!(days[&day(DATE_2_2_22)][&TimeOfDay::MIDNIGHT][TAG_1], Some(8.0));
}

async fn range_skips_days_without_matches(store: &dyn StorageBackend) {
    populate(store).await;

    let result = store
        .retrieve_range(
            NAMESPACE,
            day("31-01-2022"),
            day("03-02-2022"),
            None,
            Interval::Exact(at("10:00")),
        )
        .await
        .unwrap();
    let days = &result[NAMESPACE];

    assert_eq!(days.len(), 1);
    assert_eq!(days[&day(DATE_1_2_22)][&at("10:00")].len(), 2);
}

async fn reversed_range_is_empty(store: &dyn StorageBackend) {
    populate(store).await;

    let result = store
        .retrieve_range(NAMESPACE, day(DATE_2_2_22), day(DATE_1_2_22), None, Interval::All)
        .await
        .unwrap();

    assert!(result[NAMESPACE].is_empty());
}

async fn range_by_month(store: &dyn StorageBackend) {
    populate_monthly(store).await;

    let result = store
        .retrieve_range(NAMESPACE, day("08-01-2011"), day("05-02-2011"), None, Interval::Month)
        .await
        .unwrap();
    let months = &result[NAMESPACE];

    // 13 days in January (8 to 20), 5 in February (1 to 5)
    assert_eq!(months.len(), 2);
    assert_eq!(months[&day("01-01-2011")][&TimeOfDay::MIDNIGHT][TAG_1], Some(39.0));
    assert_eq!(months[&day("01-01-2011")][&TimeOfDay::MIDNIGHT][TAG_2], Some(26.0));
    assert_eq!(months[&day("01-02-2011")][&TimeOfDay::MIDNIGHT][TAG_1], Some(25.0));
    assert_eq!(months[&day("01-02-2011")][&TimeOfDay::MIDNIGHT][TAG_2], Some(10.0));

    let result = store
        .retrieve_range(NAMESPACE, day("08-01-2011"), day("12-01-2011"), Some(TAG_1), Interval::Month)
        .await
        .unwrap();
    let january = &result[NAMESPACE][&day("01-01-2011")][&TimeOfDay::MIDNIGHT];

    assert_eq!(january.len(), 1);
    assert_eq!(january[TAG_1], Some(15.0));
}

async fn clear(store: &dyn StorageBackend) {
    store.clear().await.unwrap();
    store
        .insert(point(NAMESPACE, DATE_1_2_22, "10:00", TAG_1, 10.0))
        .await
        .unwrap();

    store.clear().await.unwrap();

    assert_eq!(store.size().await.unwrap(), 0);
    assert_eq!(store.latest_date(NAMESPACE).await.unwrap(), None);
}

async fn upsert(store: &dyn StorageBackend) {
    store.clear().await.unwrap();

    store
        .insert(point(NAMESPACE, DATE_1_2_22, "11:11", TAG_1, 5.0))
        .await
        .unwrap();
    store
        .insert(point(NAMESPACE, DATE_1_2_22, "11:11", TAG_1, 6.0))
        .await
        .unwrap();

    let value = store
        .retrieve_value(NAMESPACE, day(DATE_1_2_22), at("11:11"), TAG_1)
        .await
        .unwrap();
    assert_eq!(value, Some(6.0));
    assert_eq!(store.size().await.unwrap(), 1);
}

async fn bulk_insert_last_wins(store: &dyn StorageBackend) {
    store.clear().await.unwrap();

    store
        .bulk_insert(vec![
            point(NAMESPACE, DATE_1_2_22, "11:11", TAG_1, 5.0),
            point(NAMESPACE, DATE_1_2_22, "11:11", TAG_1, 6.0),
        ])
        .await
        .unwrap();

    let value = store
        .retrieve_value(NAMESPACE, day(DATE_1_2_22), at("11:11"), TAG_1)
        .await
        .unwrap();
    assert_eq!(value, Some(6.0));
    assert_eq!(store.size().await.unwrap(), 1);
}

async fn bulk_insert_many(store: &dyn StorageBackend) {
    store.clear().await.unwrap();

    // 24 * 60 minutes * 2 tags spans several insert statements
    let points: Vec<DataPoint> = (0..24 * 60)
        .flat_map(|minute| {
            let time = TimeOfDay::from_hm(minute / 60, minute % 60).unwrap();
            [TAG_1, TAG_2].map(|tag| DataPoint::new(NAMESPACE, day(DATE_1_2_22), time, tag, 1.0))
        })
        .collect();
    store.bulk_insert(points).await.unwrap();

    assert_eq!(store.size().await.unwrap(), 2880);

    let result = store
        .retrieve(NAMESPACE, day(DATE_1_2_22), Interval::Day, None)
        .await
        .unwrap();
    assert_eq!(result[NAMESPACE][&day(DATE_1_2_22)][&TimeOfDay::MIDNIGHT][TAG_1], Some(1440.0));
}

async fn empty_bulk_insert(store: &dyn StorageBackend) {
    store.clear().await.unwrap();
    store.bulk_insert(Vec::new()).await.unwrap();
    assert_eq!(store.size().await.unwrap(), 0);
}

async fn wire_shape(store: &dyn StorageBackend) {
    populate(store).await;

    let result = store
        .retrieve(NAMESPACE, day(DATE_2_2_22), Interval::Day, Some(TAG_2))
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        serde_json::json!({"a.b.c": {"02-02-2022": {"00:00": {"T-2": 30.0}}}})
    );
}

async fn health_check(store: &dyn StorageBackend) {
    let health = store.health_check().await.unwrap();
    assert!(health.healthy, "{}", health.message);
    assert!(health.metadata.contains_key("backend"));
}

macro_rules! conformance_suite {
    ($backend:ident, $open:path, #[$attr:meta]) => {
        conformance_suite!(@tests $backend, $open, #[$attr],
            simple_retrieve,
            exact_time_without_tag,
            exact_missing_key_is_none,
            retrieve_all,
            hour_with_tag,
            hour_without_tag,
            day_sums,
            month_of_single_day,
            unknown_date_is_empty,
            size,
            latest_date,
            latest_date_across_year_boundary,
            retrieve_value,
            range_by_day,
            range_skips_days_without_matches,
            reversed_range_is_empty,
            range_by_month,
            clear,
            upsert,
            bulk_insert_last_wins,
            bulk_insert_many,
            empty_bulk_insert,
            wire_shape,
            health_check
        );
    };
    (@tests $backend:ident, $open:path, #[$attr:meta], $($check:ident),+) => {
        mod $backend {
            $(
                #[$attr]
                #[tokio::test]
                async fn $check() {
                    let store = $open(stringify!($check)).await;
                    super::$check(&*store).await;
                }
            )+
        }
    };
}

conformance_suite!(memory, super::memory, #[allow(clippy::float_cmp)]);
conformance_suite!(sqlite_file, super::sqlite_file, #[allow(clippy::float_cmp)]);
conformance_suite!(sqlite_memory, super::sqlite_memory, #[allow(clippy::float_cmp)]);
conformance_suite!(mysql, super::mysql, #[ignore = "needs a MySQL server (ENERGY_STORE_MYSQL_URI)"]);
conformance_suite!(postgres, super::postgres, #[ignore = "needs a PostgreSQL server (ENERGY_STORE_POSTGRES_URI)"]);
