//! Test utilities for `PinStore` implementations.
//!
//! This module provides a conformance suite that can be run against any
//! `PinStore` implementation that can also be seeded with fixtures.
//!
//! # Usage
//!
//! In your store crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! pinsync_core = { workspace = true, features = ["testutil"] }
//! ```
//!
//! In your test file:
//!
//! ```ignore
//! use pinsync_core::testutil::PinStoreTests;
//!
//! #[tokio::test]
//! async fn test_my_store() {
//!     let store = MyStore::new(...);
//!     PinStoreTests::new(&store).run_all().await.unwrap();
//! }
//! ```

use crate::model::{PinId, PinRequestId, PinStatusUpdate};
use crate::store::{PinStore, StoreError, StoreResult, SyncRequestQuery};
use crate::PinStatus;
use anyhow::ensure;
use async_trait::async_trait;
use std::collections::HashSet;

/// Seeding hooks the conformance suite needs on top of `PinStore`.
///
/// Content ingestion is not part of the engines' contract, so these are
/// kept out of `PinStore` itself.
#[async_trait]
pub trait PinStoreFixtures: PinStore {
    /// Creates (or returns the existing) pin of `cid` at the location with
    /// `peer_id`, creating the content and location as needed.
    async fn insert_pin(&self, cid: &str, peer_id: &str, status: PinStatus) -> StoreResult<PinId>;

    async fn insert_pin_request(&self, cid: &str) -> StoreResult<PinRequestId>;

    /// Current status of a pin, `None` if it does not exist.
    async fn pin_status(&self, id: &PinId) -> StoreResult<Option<PinStatus>>;
}

/// Conformance suite for `PinStore` implementations.
///
/// Each test seeds its own rows under a CID prefix, but assumes it is the
/// only writer while it runs.
pub struct PinStoreTests<'a, S> {
    store: &'a S,
    prefix: String,
}

impl<'a, S: PinStoreFixtures> PinStoreTests<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self::with_prefix(store, "bafytest")
    }

    pub fn with_prefix(store: &'a S, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn cid(&self, name: &str) -> String {
        format!("{}-{}", self.prefix, name)
    }

    /// Run all tests.
    pub async fn run_all(&self) -> StoreResult<()> {
        self.test_pin_requests_oldest_first().await?;
        self.test_delete_pin_requests().await?;
        self.test_increment_attempts().await?;
        self.test_sync_requests_embed_pins().await?;
        self.test_sync_request_paging().await?;
        self.test_update_pins().await?;
        self.test_requeue_sync_requests().await?;
        self.test_create_sync_request_for_missing_pin().await?;
        self.test_page_size_limit().await?;
        Ok(())
    }

    async fn own_pin_requests(&self) -> StoreResult<Vec<crate::PinRequest>> {
        let max = self.store.features().max_page_size;
        Ok(self
            .store
            .find_all_pin_requests(max)
            .await?
            .into_iter()
            .filter(|r| r.cid.starts_with(&self.prefix))
            .collect())
    }

    async fn own_sync_requests(&self) -> StoreResult<Vec<crate::PinSyncRequest>> {
        let max = self.store.features().max_page_size;
        Ok(self
            .store
            .find_pin_sync_requests(SyncRequestQuery::new(max))
            .await?
            .data
            .into_iter()
            .filter(|r| r.pin.content.cid.starts_with(&self.prefix))
            .collect())
    }

    async fn clear(&self) -> StoreResult<()> {
        let requests: Vec<_> = self.own_pin_requests().await?.into_iter().map(|r| r.id).collect();
        if !requests.is_empty() {
            self.store.delete_pin_requests(&requests).await?;
        }
        let syncs: Vec<_> = self.own_sync_requests().await?.into_iter().map(|r| r.id).collect();
        if !syncs.is_empty() {
            self.store.delete_pin_sync_requests(&syncs).await?;
        }
        Ok(())
    }

    /// Pin requests come back in insertion order.
    pub async fn test_pin_requests_oldest_first(&self) -> StoreResult<()> {
        self.clear().await?;
        let cids: Vec<_> = ["a", "b", "c"].iter().map(|n| self.cid(n)).collect();
        for cid in &cids {
            self.store.insert_pin_request(cid).await?;
        }

        let found: Vec<_> = self.own_pin_requests().await?.into_iter().map(|r| r.cid).collect();
        ensure!(found == cids, "expected {cids:?} oldest first, got {found:?}");

        let first = self.store.find_all_pin_requests(1).await?;
        ensure!(first.len() == 1, "size must bound the batch");
        Ok(())
    }

    pub async fn test_delete_pin_requests(&self) -> StoreResult<()> {
        self.clear().await?;
        let keep = self.store.insert_pin_request(&self.cid("keep")).await?;
        let drop = self.store.insert_pin_request(&self.cid("drop")).await?;

        self.store.delete_pin_requests(&[drop]).await?;

        let left: Vec<_> = self.own_pin_requests().await?.into_iter().map(|r| r.id).collect();
        ensure!(left == vec![keep], "only the kept request should remain, got {left:?}");
        Ok(())
    }

    pub async fn test_increment_attempts(&self) -> StoreResult<()> {
        self.clear().await?;
        let id = self.store.insert_pin_request(&self.cid("retry")).await?;

        self.store.increment_pin_request_attempts(&[id.clone()]).await?;
        self.store.increment_pin_request_attempts(&[id.clone()]).await?;

        let requests = self.own_pin_requests().await?;
        let request = requests.iter().find(|r| r.id == id);
        ensure!(
            request.map(|r| r.attempts) == Some(2),
            "attempts should be 2, got {request:?}"
        );
        Ok(())
    }

    pub async fn test_sync_requests_embed_pins(&self) -> StoreResult<()> {
        self.clear().await?;
        let cid = self.cid("embed");
        let pin = self.store.insert_pin(&cid, "peer-embed", PinStatus::Pinning).await?;
        self.store.create_pin_sync_requests(&[pin.clone()]).await?;

        let syncs = self.own_sync_requests().await?;
        ensure!(syncs.len() == 1, "expected one sync request, got {}", syncs.len());
        let sync = &syncs[0];
        ensure!(sync.pin.id == pin, "sync request must reference its pin");
        ensure!(sync.pin.content.cid == cid, "embedded pin must carry its cid");
        ensure!(sync.pin.location.peer_id == "peer-embed", "embedded pin must carry its peer");
        ensure!(sync.pin.status == PinStatus::Pinning, "embedded pin must carry its status");
        Ok(())
    }

    pub async fn test_sync_request_paging(&self) -> StoreResult<()> {
        self.clear().await?;
        let mut pins = Vec::new();
        for n in 0..5 {
            let pin = self
                .store
                .insert_pin(&self.cid(&format!("page{n}")), "peer-page", PinStatus::PinQueued)
                .await?;
            self.store.create_pin_sync_requests(&[pin.clone()]).await?;
            pins.push(pin);
        }

        let mut seen = Vec::new();
        let mut query = SyncRequestQuery::new(2);
        loop {
            let page = self.store.find_pin_sync_requests(query.clone()).await?;
            ensure!(page.data.len() <= 2, "page exceeds requested size");
            seen.extend(
                page.data
                    .into_iter()
                    .filter(|r| r.pin.content.cid.starts_with(&self.prefix))
                    .map(|r| r.pin.id),
            );
            match page.after {
                Some(after) => query.after = Some(after),
                None => break,
            }
        }
        ensure!(seen == pins, "paging should visit every request once, oldest first");
        Ok(())
    }

    pub async fn test_update_pins(&self) -> StoreResult<()> {
        let a = self.store.insert_pin(&self.cid("upd"), "peer-a", PinStatus::Pinning).await?;
        let b = self.store.insert_pin(&self.cid("upd"), "peer-b", PinStatus::PinQueued).await?;
        ensure!(a != b, "pins at different peers must be distinct");

        let again = self.store.insert_pin(&self.cid("upd"), "peer-a", PinStatus::Pinning).await?;
        ensure!(again == a, "(content, location) must identify a single pin");

        self.store
            .update_pins(&[
                PinStatusUpdate {
                    pin_id: a.clone(),
                    status: PinStatus::Pinned,
                },
                PinStatusUpdate {
                    pin_id: b.clone(),
                    status: PinStatus::PinError,
                },
            ])
            .await?;

        ensure!(self.store.pin_status(&a).await? == Some(PinStatus::Pinned), "a not updated");
        ensure!(self.store.pin_status(&b).await? == Some(PinStatus::PinError), "b not updated");
        Ok(())
    }

    /// Delete-then-create leaves exactly one request per pin.
    pub async fn test_requeue_sync_requests(&self) -> StoreResult<()> {
        self.clear().await?;
        let pin = self.store.insert_pin(&self.cid("requeue"), "peer-r", PinStatus::Pinning).await?;
        self.store.create_pin_sync_requests(&[pin.clone()]).await?;

        let before = self.own_sync_requests().await?;
        let old_ids: Vec<_> = before.iter().map(|r| r.id.clone()).collect();
        self.store.delete_pin_sync_requests(&old_ids).await?;
        self.store.create_pin_sync_requests(&[pin.clone()]).await?;

        let after = self.own_sync_requests().await?;
        ensure!(after.len() == 1, "expected exactly one request after requeue");
        let old: HashSet<_> = old_ids.into_iter().collect();
        ensure!(!old.contains(&after[0].id), "requeue must create a fresh request");
        Ok(())
    }

    pub async fn test_create_sync_request_for_missing_pin(&self) -> StoreResult<()> {
        self.clear().await?;
        let pin = self.store.insert_pin(&self.cid("exists"), "peer-m", PinStatus::Pinning).await?;
        let missing = PinId::from("does-not-exist");

        let err = self
            .store
            .create_pin_sync_requests(&[pin, missing])
            .await
            .err();
        ensure!(
            matches!(
                err.as_ref().and_then(|e| e.downcast_ref::<StoreError>()),
                Some(StoreError::MissingPin(_))
            ),
            "expected MissingPin, got {err:?}"
        );
        ensure!(
            self.own_sync_requests().await?.is_empty(),
            "a failed batch must not create anything"
        );
        Ok(())
    }

    pub async fn test_page_size_limit(&self) -> StoreResult<()> {
        let max = self.store.features().max_page_size;
        let err = self.store.find_all_pin_requests(max + 1).await.err();
        ensure!(
            matches!(
                err.as_ref().and_then(|e| e.downcast_ref::<StoreError>()),
                Some(StoreError::PageTooLarge { .. })
            ),
            "pages above the maximum must be rejected, got {err:?}"
        );
        self.clear().await
    }
}
