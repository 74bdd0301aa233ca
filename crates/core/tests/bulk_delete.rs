//! Enumeration and batch delete against a scripted backend

mod common;

use bulkstore_core::{BulkStoreClient, Error, ListMode, ObjectIdentity, Result};
use common::{ScriptedBackend, BUCKET};
use futures::StreamExt;
use std::sync::atomic::Ordering;

async fn collect_keys(client: &BulkStoreClient<ScriptedBackend>) -> Vec<Result<ObjectIdentity>> {
    client.enumerate(BUCKET, ListMode::Objects).collect().await
}

#[tokio::test]
async fn test_enumerate_concatenates_pages_in_order() {
    let backend = ScriptedBackend::new()
        .page(&["a.txt", "b.txt"])
        .page(&["c.txt", "d.txt"])
        .page(&["e.txt"]);
    let client = BulkStoreClient::new(backend);

    let keys: Vec<String> = collect_keys(&client)
        .await
        .into_iter()
        .map(|item| item.unwrap().key().to_string())
        .collect();

    assert_eq!(keys, vec!["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"]);
    assert_eq!(client.backend().list_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_enumerate_is_lazy() {
    let backend = ScriptedBackend::new()
        .page(&["a", "b"])
        .page(&["c"])
        .page(&["d"]);
    let client = BulkStoreClient::new(backend);

    let first: Vec<_> = client
        .enumerate(BUCKET, ListMode::Objects)
        .take(2)
        .collect()
        .await;

    assert_eq!(first.len(), 2);
    assert_eq!(client.backend().list_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_enumerate_restarts_from_first_page() {
    let backend = ScriptedBackend::new().page(&["a"]).page(&["b"]);
    let client = BulkStoreClient::new(backend);

    assert_eq!(collect_keys(&client).await.len(), 2);
    assert_eq!(collect_keys(&client).await.len(), 2);
    assert_eq!(client.backend().list_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_enumerate_stops_on_failed_page() {
    let backend = ScriptedBackend::new()
        .page(&["a", "b"])
        .failing_page("connection reset")
        .page(&["c"]);
    let client = BulkStoreClient::new(backend);

    let items = collect_keys(&client).await;

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].as_ref().unwrap().key(), "a");
    assert_eq!(items[1].as_ref().unwrap().key(), "b");
    match &items[2] {
        Err(Error::EnumerationFailed { container, detail }) => {
            assert_eq!(container, BUCKET);
            assert!(detail.contains("page 2"));
            assert!(detail.contains("connection reset"));
        }
        other => panic!("expected EnumerationFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_enumerate_detects_repeated_token() {
    let backend = ScriptedBackend::new().page(&["a"]).page(&["b"]).stuck_at(1);
    let client = BulkStoreClient::new(backend);

    let items = collect_keys(&client).await;

    assert_eq!(items.len(), 3);
    assert!(matches!(items[2], Err(Error::EnumerationFailed { .. })));
}

#[tokio::test]
async fn test_delete_all_empty_bucket() {
    let client = BulkStoreClient::new(ScriptedBackend::new());

    let result = client.delete_all(BUCKET, ListMode::Objects).await;

    assert!(result.attempted().is_empty());
    assert!(result.outcomes().is_empty());
    assert!(result.all_succeeded());
}

#[tokio::test]
async fn test_delete_all_continues_past_failures() {
    let backend = ScriptedBackend::new()
        .page(&["a", "b", "c"])
        .page(&["d", "e"])
        .fail_delete("b")
        .fail_delete("d");
    let client = BulkStoreClient::new(backend);

    let result = client.delete_all(BUCKET, ListMode::Objects).await;

    assert_eq!(result.attempted().len(), 5);
    assert_eq!(result.outcomes().len(), 5);
    assert!(!result.all_succeeded());
    assert_eq!(result.failed_count(), 2);

    let outcome_keys: Vec<&str> = result.outcomes().iter().map(|o| o.identity.key()).collect();
    assert_eq!(outcome_keys, vec!["a", "b", "c", "d", "e"]);
    assert!(!result.outcomes()[1].succeeded);
    let detail = result.outcomes()[1].error_detail.as_deref().unwrap();
    assert!(detail.starts_with("Delete of 'b' failed"));
    assert!(detail.contains("AccessDenied"));
    assert!(result.outcomes()[2].succeeded);

    // every identity attempted exactly once
    assert_eq!(client.backend().deleted_keys(), vec!["a", "b", "c", "d", "e"]);
}

#[tokio::test]
async fn test_delete_all_after_enumeration_failure() {
    let backend = ScriptedBackend::new()
        .page(&["a", "b"])
        .failing_page("throttled")
        .page(&["c"]);
    let client = BulkStoreClient::new(backend);

    let result = client.delete_all(BUCKET, ListMode::Objects).await;

    let attempted: Vec<&str> = result.attempted().iter().map(|i| i.key()).collect();
    assert_eq!(attempted, vec!["a", "b"]);
    assert_eq!(result.outcomes().len(), 2);
    assert!(result.outcomes().iter().all(|o| o.succeeded));
    assert!(!result.all_succeeded());
    assert!(result.enumeration_error().unwrap().contains("throttled"));
}

#[tokio::test]
async fn test_delete_all_versions_passes_version_ids() {
    let backend = ScriptedBackend::new()
        .version_page(&[("report.csv", "v3"), ("report.csv", "v2")])
        .version_page(&[("report.csv", "v1")]);
    let client = BulkStoreClient::new(backend);

    let result = client.delete_all(BUCKET, ListMode::Versions).await;

    assert!(result.all_succeeded());
    let versions: Vec<Option<String>> = client
        .backend()
        .deleted
        .lock()
        .unwrap()
        .iter()
        .map(|i| i.version_id().map(str::to_string))
        .collect();
    assert_eq!(
        versions,
        vec![Some("v3".to_string()), Some("v2".to_string()), Some("v1".to_string())]
    );
}

#[tokio::test]
async fn test_empty_and_remove_deletes_bucket() {
    let backend = ScriptedBackend::new().page(&["a", "b"]);
    let client = BulkStoreClient::new(backend);

    let (result, removed) = client.empty_and_remove(BUCKET, ListMode::Objects).await;

    assert!(result.all_succeeded());
    assert!(removed);
    assert_eq!(*client.backend().containers_deleted.lock().unwrap(), vec![BUCKET]);
}

#[tokio::test]
async fn test_empty_and_remove_keeps_bucket_on_failure() {
    let backend = ScriptedBackend::new().page(&["a", "b"]).fail_delete("a");
    let client = BulkStoreClient::new(backend);

    let (result, removed) = client.empty_and_remove(BUCKET, ListMode::Objects).await;

    assert!(!result.all_succeeded());
    assert!(!removed);
    assert!(client.backend().containers_deleted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_container_reports_backend_failure() {
    let backend = ScriptedBackend::new().fail_container_delete("BucketNotEmpty");
    let client = BulkStoreClient::new(backend);

    assert!(!client.remove_container_if_empty(BUCKET).await);
}
