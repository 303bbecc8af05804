//! Behavior every backend must share. The Postgres arm needs a Docker daemon.

mod common;

use snip_storage::{DeleteTask, FileStorage, MemoryStorage, SavedUrl, Stats, Storage, StorageError};
use tempfile::TempDir;

fn url(short_id: &str, original_url: &str, owner_id: &str) -> SavedUrl {
    SavedUrl::new(short_id, original_url, owner_id)
}

async fn memory() -> MemoryStorage {
    let storage = MemoryStorage::new();
    storage.init().await.unwrap();
    storage
}

async fn file() -> (TempDir, FileStorage) {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path().join("urls.json"));
    storage.init().await.unwrap();
    (dir, storage)
}

async fn second_save_of_url_conflicts<S: Storage>(storage: S) {
    storage
        .save(&url("first", "https://a.example", "owner-x"))
        .await
        .unwrap();

    let err = storage
        .save(&url("second", "https://a.example", "owner-x"))
        .await
        .unwrap_err();

    assert_eq!(err, StorageError::Conflict("first".to_string()));
    assert!(matches!(
        storage.get("second").await,
        Err(StorageError::NotFound(_))
    ));
    assert_eq!(storage.get_stats().await.unwrap().urls, 1);
}

async fn short_id_collision_is_reported<S: Storage>(storage: S) {
    storage
        .save(&url("same", "https://a.example", "owner-x"))
        .await
        .unwrap();

    let err = storage
        .save(&url("same", "https://b.example", "owner-y"))
        .await
        .unwrap_err();

    assert_eq!(err, StorageError::ShortIdTaken("same".to_string()));
    assert_eq!(
        storage.get("same").await.unwrap().original_url,
        "https://a.example"
    );
}

async fn resaving_same_row_conflicts<S: Storage>(storage: S) {
    let row = url("abcde", "https://a.example", "owner-x");
    storage.save(&row).await.unwrap();

    let err = storage.save(&row).await.unwrap_err();

    assert_eq!(err, StorageError::Conflict("abcde".to_string()));
    assert_eq!(storage.get_stats().await.unwrap().urls, 1);
}

async fn url_conflict_wins_over_short_id_collision<S: Storage>(storage: S) {
    storage
        .save_array(&[
            url("aaaaa", "https://a.example", "owner-x"),
            url("bbbbb", "https://b.example", "owner-x"),
        ])
        .await
        .unwrap();

    let err = storage
        .save(&url("aaaaa", "https://b.example", "owner-y"))
        .await
        .unwrap_err();

    assert_eq!(err, StorageError::Conflict("bbbbb".to_string()));
}

async fn get_missing_is_not_found<S: Storage>(storage: S) {
    assert!(matches!(
        storage.get("nope").await,
        Err(StorageError::NotFound(_))
    ));
}

async fn delete_is_idempotent<S: Storage>(storage: S) {
    storage
        .save(&url("abcde", "https://a.example", "owner-x"))
        .await
        .unwrap();
    let task = DeleteTask::new("owner-x", "abcde");

    storage.delete(std::slice::from_ref(&task)).await.unwrap();
    let once = storage.get_by_user("owner-x").await.unwrap();
    storage.delete(std::slice::from_ref(&task)).await.unwrap();
    let twice = storage.get_by_user("owner-x").await.unwrap();

    assert_eq!(once, twice);
    assert!(twice[0].is_deleted);
}

async fn delete_respects_ownership<S: Storage>(storage: S) {
    storage
        .save(&url("abcde", "https://a.example", "owner-b"))
        .await
        .unwrap();

    storage
        .delete(&[DeleteTask::new("owner-a", "abcde")])
        .await
        .unwrap();

    assert!(!storage.get("abcde").await.unwrap().is_deleted);
}

async fn delete_ignores_unknown_tasks<S: Storage>(storage: S) {
    storage
        .save(&url("abcde", "https://a.example", "owner-x"))
        .await
        .unwrap();

    storage
        .delete(&[
            DeleteTask::new("owner-x", "zzzzz"),
            DeleteTask::new("owner-x", "abcde"),
        ])
        .await
        .unwrap();

    assert!(storage.get("abcde").await.unwrap().is_deleted);
}

async fn tombstone_frees_original_url<S: Storage>(storage: S) {
    storage
        .save(&url("old", "https://a.example", "owner-x"))
        .await
        .unwrap();
    storage
        .delete(&[DeleteTask::new("owner-x", "old")])
        .await
        .unwrap();

    storage
        .save(&url("new", "https://a.example", "owner-x"))
        .await
        .unwrap();

    assert!(storage.get("old").await.unwrap().is_deleted);
    assert!(!storage.get("new").await.unwrap().is_deleted);
}

async fn stats_count_live_rows_only<S: Storage>(storage: S) {
    storage
        .save_array(&[
            url("aaaaa", "https://a.example", "owner-a"),
            url("bbbbb", "https://b.example", "owner-a"),
            url("ccccc", "https://c.example", "owner-b"),
        ])
        .await
        .unwrap();
    storage
        .delete(&[DeleteTask::new("owner-b", "ccccc")])
        .await
        .unwrap();

    let stats = storage.get_stats().await.unwrap();
    assert_eq!(stats, Stats { urls: 2, users: 1 });
}

async fn get_by_user_returns_tombstones_and_reports_empty<S: Storage>(storage: S) {
    storage
        .save_array(&[
            url("aaaaa", "https://a.example", "owner-a"),
            url("bbbbb", "https://b.example", "owner-a"),
            url("ccccc", "https://c.example", "owner-b"),
        ])
        .await
        .unwrap();
    storage
        .delete(&[DeleteTask::new("owner-a", "aaaaa")])
        .await
        .unwrap();

    let rows = storage.get_by_user("owner-a").await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().any(|row| row.is_deleted));
    assert!(matches!(
        storage.get_by_user("owner-z").await,
        Err(StorageError::NotFound(_))
    ));
}

async fn save_array_conflict_writes_nothing<S: Storage>(storage: S) {
    storage
        .save(&url("aaaaa", "https://a.example", "owner-a"))
        .await
        .unwrap();

    let err = storage
        .save_array(&[
            url("bbbbb", "https://b.example", "owner-a"),
            url("ccccc", "https://a.example", "owner-a"),
        ])
        .await
        .unwrap_err();

    assert_eq!(err, StorageError::Conflict("aaaaa".to_string()));
    assert!(matches!(
        storage.get("bbbbb").await,
        Err(StorageError::NotFound(_))
    ));
}

async fn save_array_rejects_repeated_url<S: Storage>(storage: S) {
    let err = storage
        .save_array(&[
            url("aaaaa", "https://a.example", "owner-a"),
            url("bbbbb", "https://a.example", "owner-a"),
        ])
        .await
        .unwrap_err();

    assert_eq!(err, StorageError::Conflict("aaaaa".to_string()));
    assert!(matches!(
        storage.get("aaaaa").await,
        Err(StorageError::NotFound(_))
    ));
}

async fn owner_known_includes_tombstones<S: Storage>(storage: S) {
    assert!(!storage.is_owner_known("owner-a").await.unwrap());

    storage
        .save(&url("aaaaa", "https://a.example", "owner-a"))
        .await
        .unwrap();
    storage
        .delete(&[DeleteTask::new("owner-a", "aaaaa")])
        .await
        .unwrap();

    assert!(storage.is_owner_known("owner-a").await.unwrap());
}

async fn clean_wipes_everything<S: Storage>(storage: S) {
    storage
        .save(&url("aaaaa", "https://a.example", "owner-a"))
        .await
        .unwrap();

    storage.clean().await.unwrap();

    assert_eq!(storage.get_stats().await.unwrap(), Stats::default());
    assert!(!storage.is_owner_known("owner-a").await.unwrap());
    storage
        .save(&url("aaaaa", "https://a.example", "owner-a"))
        .await
        .unwrap();
}

macro_rules! contract_tests {
    ($($name:ident),* $(,)?) => {
        mod memory_backend {
            use super::*;
            $(
                #[tokio::test]
                async fn $name() {
                    super::$name(memory().await).await;
                }
            )*
        }

        mod file_backend {
            use super::*;
            $(
                #[tokio::test]
                async fn $name() {
                    let (_dir, storage) = file().await;
                    super::$name(storage).await;
                }
            )*
        }

        mod postgres_backend {
            use super::*;
            $(
                #[tokio::test]
                #[ignore = "requires a Docker daemon"]
                async fn $name() {
                    let (_postgres, storage) = common::start_postgres().await;
                    super::$name(storage).await;
                }
            )*
        }
    };
}

contract_tests!(
    second_save_of_url_conflicts,
    short_id_collision_is_reported,
    resaving_same_row_conflicts,
    url_conflict_wins_over_short_id_collision,
    get_missing_is_not_found,
    delete_is_idempotent,
    delete_respects_ownership,
    delete_ignores_unknown_tasks,
    tombstone_frees_original_url,
    stats_count_live_rows_only,
    get_by_user_returns_tombstones_and_reports_empty,
    save_array_conflict_writes_nothing,
    save_array_rejects_repeated_url,
    owner_known_includes_tombstones,
    clean_wipes_everything,
);
