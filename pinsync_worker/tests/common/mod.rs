#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use pinsync_core::{
    ClusterApi, ClusterFeatures, PeerPinInfo, PinId, PinInfo, PinRequest, PinRequestId,
    PinStatusUpdate, PinStore, PinSyncRequestId, PinningService, RetryPolicy, StoreFeatures,
    StoreResult, SyncRequestPage, SyncRequestQuery,
};
use pinsync_store_memory::MemoryPinStore;

/// Retries quickly so failing-store tests stay short.
pub const FAST_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    initial_delay_ms: 10,
    max_delay_ms: 100,
    backoff_multiplier: 2.0,
};

/// Cluster double answering from a fixed table of cid -> peer -> status.
#[derive(Debug)]
pub struct ScriptedCluster {
    features: ClusterFeatures,
    statuses: Mutex<HashMap<String, HashMap<String, String>>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedCluster {
    pub fn new() -> Self {
        Self::with_features(ClusterFeatures {
            supports_multi_cid: true,
            max_cids_per_request: 100,
        })
    }

    pub fn with_features(features: ClusterFeatures) -> Self {
        Self {
            features,
            statuses: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, cid: &str, peer_id: &str, status: &str) {
        self.statuses
            .lock()
            .unwrap()
            .entry(cid.to_owned())
            .or_default()
            .insert(peer_id.to_owned(), status.to_owned());
    }

    /// Any call that includes `cid` fails.
    pub fn fail_on(&self, cid: &str) {
        self.failing.lock().unwrap().insert(cid.to_owned());
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterApi for ScriptedCluster {
    fn features(&self) -> ClusterFeatures {
        self.features
    }

    async fn status_all(&self, cids: &[String]) -> anyhow::Result<Vec<PinInfo>> {
        self.calls.lock().unwrap().push(cids.to_vec());
        let failing = self.failing.lock().unwrap();
        if cids.iter().any(|cid| failing.contains(cid)) {
            return Err(anyhow!("cluster unavailable"));
        }

        let statuses = self.statuses.lock().unwrap();
        Ok(cids
            .iter()
            .filter_map(|cid| {
                let peers = statuses.get(cid)?;
                Some(PinInfo {
                    cid: cid.clone(),
                    name: None,
                    peer_map: peers
                        .iter()
                        .map(|(peer, status)| {
                            (
                                peer.clone(),
                                PeerPinInfo {
                                    peer_name: None,
                                    status: status.clone(),
                                    timestamp: None,
                                    error: None,
                                },
                            )
                        })
                        .collect(),
                })
            })
            .collect())
    }
}

/// Pinning double that accepts everything except the cids told to fail.
#[derive(Debug, Default)]
pub struct ScriptedPinning {
    failing: Mutex<HashSet<String>>,
    pinned: Mutex<Vec<String>>,
}

impl ScriptedPinning {
    pub fn fail_on(&self, cid: &str) {
        self.failing.lock().unwrap().insert(cid.to_owned());
    }

    pub fn pinned(&self) -> Vec<String> {
        self.pinned.lock().unwrap().clone()
    }
}

#[async_trait]
impl PinningService for ScriptedPinning {
    async fn pin(&self, cid: &str) -> anyhow::Result<()> {
        if self.failing.lock().unwrap().contains(cid) {
            return Err(anyhow!("429 Too Many Requests"));
        }
        self.pinned.lock().unwrap().push(cid.to_owned());
        Ok(())
    }
}

/// Memory store whose deletes or attempt increments fail a set number of
/// times.
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: MemoryPinStore,
    delete_failures: AtomicU32,
    increment_failures: AtomicU32,
}

impl FlakyStore {
    pub fn failing_deletes(times: u32) -> Self {
        Self {
            delete_failures: AtomicU32::new(times),
            ..Default::default()
        }
    }

    pub fn failing_increments(times: u32) -> Self {
        Self {
            increment_failures: AtomicU32::new(times),
            ..Default::default()
        }
    }

    pub fn heal(&self) {
        self.delete_failures.store(0, Ordering::SeqCst);
        self.increment_failures.store(0, Ordering::SeqCst);
    }

    fn maybe_fail(failures: &AtomicU32) -> StoreResult<()> {
        let left = failures.load(Ordering::SeqCst);
        if left > 0 {
            failures.store(left - 1, Ordering::SeqCst);
            return Err(anyhow!("connection reset by peer"));
        }
        Ok(())
    }
}

#[async_trait]
impl PinStore for FlakyStore {
    fn features(&self) -> StoreFeatures {
        self.inner.features()
    }

    async fn find_all_pin_requests(&self, size: usize) -> StoreResult<Vec<PinRequest>> {
        self.inner.find_all_pin_requests(size).await
    }

    async fn delete_pin_requests(&self, ids: &[PinRequestId]) -> StoreResult<()> {
        Self::maybe_fail(&self.delete_failures)?;
        self.inner.delete_pin_requests(ids).await
    }

    async fn increment_pin_request_attempts(&self, ids: &[PinRequestId]) -> StoreResult<()> {
        Self::maybe_fail(&self.increment_failures)?;
        self.inner.increment_pin_request_attempts(ids).await
    }

    async fn find_pin_sync_requests(
        &self,
        query: SyncRequestQuery,
    ) -> StoreResult<SyncRequestPage> {
        self.inner.find_pin_sync_requests(query).await
    }

    async fn update_pins(&self, updates: &[PinStatusUpdate]) -> StoreResult<()> {
        self.inner.update_pins(updates).await
    }

    async fn delete_pin_sync_requests(&self, ids: &[PinSyncRequestId]) -> StoreResult<()> {
        Self::maybe_fail(&self.delete_failures)?;
        self.inner.delete_pin_sync_requests(ids).await
    }

    async fn create_pin_sync_requests(&self, pin_ids: &[PinId]) -> StoreResult<()> {
        self.inner.create_pin_sync_requests(pin_ids).await
    }
}
