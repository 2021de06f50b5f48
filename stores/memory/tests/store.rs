use pinsync_core::store::{PinStore, SyncRequestQuery};
use pinsync_core::testutil::{PinStoreFixtures, PinStoreTests};
use pinsync_core::PinStatus;
use pinsync_store_memory::MemoryPinStore;

#[tokio::test]
async fn memory_store_passes_conformance_suite() {
    let store = MemoryPinStore::new();
    PinStoreTests::new(&store).run_all().await.unwrap();
}

#[tokio::test]
async fn small_page_limit_is_enforced() {
    let store = MemoryPinStore::with_max_page_size(10);
    PinStoreTests::with_prefix(&store, "bafysmall")
        .run_all()
        .await
        .unwrap();
    assert!(store.find_all_pin_requests(11).await.is_err());
    assert!(store.find_all_pin_requests(10).await.is_ok());
}

#[tokio::test]
async fn sync_requests_are_bounded_by_creation_time() {
    let store = MemoryPinStore::new();
    let pin = store
        .insert_pin("bafy1", "peer", PinStatus::Pinning)
        .await
        .unwrap();
    store.insert_pin_sync_request(&pin).unwrap();
    let cutoff = chrono::Utc::now();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    store.insert_pin_sync_request(&pin).unwrap();

    let page = store
        .find_pin_sync_requests(SyncRequestQuery::new(100).created_until(cutoff))
        .await
        .unwrap();
    assert_eq!(page.data.len(), 1);
    assert_eq!(store.pin_sync_requests().len(), 2);
}

#[tokio::test]
async fn garbage_cursor_is_rejected() {
    let store = MemoryPinStore::new();
    let mut query = SyncRequestQuery::new(10);
    query.after = Some("not-a-cursor".into());
    assert!(store.find_pin_sync_requests(query).await.is_err());
}
