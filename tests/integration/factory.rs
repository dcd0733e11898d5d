//! Backend selection through descriptors

use assert_matches::assert_matches;
use energy_store::storage::{self, StorageError};
use pretty_assertions::assert_eq;

use super::helpers::*;

#[tokio::test]
async fn test_unrecognized_descriptor() {
    assert_matches!(
        storage::open("unrecognized uri").await.err(),
        Some(StorageError::UnrecognizedBackend(_))
    );
    assert_matches!(
        storage::open("ftp://localhost").await.err(),
        Some(StorageError::UnrecognizedBackend(_))
    );
}

#[tokio::test]
async fn test_client_server_descriptor_needs_host() {
    let err = storage::open("postgres:///energy").await.err().unwrap();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_sqlite_file_persists_between_opens() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = format!("sqlite://{}", dir.path().join("energy.db").display());

    let first = storage::open(&descriptor).await.unwrap();
    populate(first.as_ref()).await;
    first.close().await.unwrap();

    let second = storage::open(&descriptor).await.unwrap();
    assert_eq!(second.size().await.unwrap(), 13);
    assert_eq!(second.latest_date(NAMESPACE).await.unwrap(), Some(day(DATE_2_2_22)));
}

#[tokio::test]
async fn test_cache_instances_are_independent() {
    let first = storage::open("cache").await.unwrap();
    let second = storage::open("cache://").await.unwrap();

    populate(first.as_ref()).await;

    assert_eq!(first.size().await.unwrap(), 13);
    assert_eq!(second.size().await.unwrap(), 0);
}
