use anyhow::anyhow;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pinsync_core::{
    Content, Pin, PinId, PinLocation, PinLocationId, PinRequest, PinRequestId, PinStatus,
    PinStatusUpdate, PinSyncRequest, PinSyncRequestId,
    store::{PinStore, StoreError, StoreFeatures, StoreResult, SyncRequestPage, SyncRequestQuery},
};
#[cfg(feature = "testutil")]
use pinsync_core::testutil::PinStoreFixtures;
use std::sync::atomic::{AtomicU64, Ordering};

/// Largest page served by default, matching the hosted store.
pub const DEFAULT_MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug)]
struct Stored<T> {
    seq: u64,
    row: T,
}

#[derive(Debug, Clone)]
struct SyncRow {
    pin_id: PinId,
    created: DateTime<Utc>,
}

/// `PinStore` kept entirely in memory.
///
/// Row ids are drawn from one increasing sequence, which also defines
/// "oldest first".
#[derive(Debug)]
pub struct MemoryPinStore {
    pins: DashMap<PinId, Pin>,
    locations: DashMap<String, PinLocation>,
    pin_requests: DashMap<PinRequestId, Stored<PinRequest>>,
    sync_requests: DashMap<PinSyncRequestId, Stored<SyncRow>>,
    next_seq: AtomicU64,
    max_page_size: usize,
}

impl MemoryPinStore {
    /// Creates a new, empty `MemoryPinStore`.
    pub fn new() -> Self {
        Self::with_max_page_size(DEFAULT_MAX_PAGE_SIZE)
    }

    pub fn with_max_page_size(max_page_size: usize) -> Self {
        Self {
            pins: DashMap::new(),
            locations: DashMap::new(),
            pin_requests: DashMap::new(),
            sync_requests: DashMap::new(),
            next_seq: AtomicU64::new(1),
            max_page_size,
        }
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    fn check_page_size(&self, size: usize) -> StoreResult<()> {
        if size > self.max_page_size {
            return Err(StoreError::PageTooLarge {
                requested: size,
                max: self.max_page_size,
            }
            .into());
        }
        Ok(())
    }

    fn location_for_peer(&self, peer_id: &str) -> PinLocation {
        if let Some(location) = self.locations.get(peer_id) {
            return location.clone();
        }
        let location = PinLocation {
            id: PinLocationId(self.next_seq().to_string()),
            peer_id: peer_id.to_owned(),
            peer_name: None,
            region: None,
        };
        self.locations
            .entry(peer_id.to_owned())
            .or_insert(location)
            .clone()
    }

    /// Returns the pin with the given id.
    pub fn pin(&self, id: &PinId) -> Option<Pin> {
        self.pins.get(id).map(|pin| pin.clone())
    }

    /// All pin requests, oldest first.
    pub fn pin_requests(&self) -> Vec<PinRequest> {
        let mut rows: Vec<(u64, PinRequest)> = self
            .pin_requests
            .iter()
            .map(|entry| (entry.seq, entry.row.clone()))
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, row)| row).collect()
    }

    /// All pin sync requests, oldest first.
    pub fn pin_sync_requests(&self) -> Vec<PinSyncRequest> {
        self.sync_rows()
            .into_iter()
            .filter_map(|(_, id, row)| self.materialize(id, row))
            .collect()
    }

    /// Creates a sync request for `pin_id`, as content ingestion would.
    pub fn insert_pin_sync_request(&self, pin_id: &PinId) -> StoreResult<PinSyncRequestId> {
        if !self.pins.contains_key(pin_id) {
            return Err(StoreError::MissingPin(pin_id.clone()).into());
        }
        let seq = self.next_seq();
        let id = PinSyncRequestId(seq.to_string());
        self.sync_requests.insert(
            id.clone(),
            Stored {
                seq,
                row: SyncRow {
                    pin_id: pin_id.clone(),
                    created: Utc::now(),
                },
            },
        );
        Ok(id)
    }

    /// Seeds a pin for `cid` on `peer_id`, reusing an existing one.
    pub fn seed_pin(&self, cid: &str, peer_id: &str, status: PinStatus) -> PinId {
        let existing = self
            .pins
            .iter()
            .find(|pin| pin.content.cid == cid && pin.location.peer_id == peer_id)
            .map(|pin| pin.id.clone());
        if let Some(id) = existing {
            return id;
        }

        let location = self.location_for_peer(peer_id);
        let id = PinId(self.next_seq().to_string());
        let now = Utc::now();
        self.pins.insert(
            id.clone(),
            Pin {
                id: id.clone(),
                content: Content::new(cid),
                location,
                status,
                created: now,
                updated: now,
            },
        );
        id
    }

    /// Seeds a pin request with no recorded attempts.
    pub fn seed_pin_request(&self, cid: &str) -> PinRequestId {
        let seq = self.next_seq();
        let id = PinRequestId(seq.to_string());
        let now = Utc::now();
        self.pin_requests.insert(
            id.clone(),
            Stored {
                seq,
                row: PinRequest {
                    id: id.clone(),
                    cid: cid.to_owned(),
                    attempts: 0,
                    created: now,
                    updated: now,
                },
            },
        );
        id
    }

    fn sync_rows(&self) -> Vec<(u64, PinSyncRequestId, SyncRow)> {
        let mut rows: Vec<_> = self
            .sync_requests
            .iter()
            .map(|entry| (entry.seq, entry.key().clone(), entry.row.clone()))
            .collect();
        rows.sort_by_key(|(seq, _, _)| *seq);
        rows
    }

    fn materialize(&self, id: PinSyncRequestId, row: SyncRow) -> Option<PinSyncRequest> {
        let pin = self.pin(&row.pin_id)?;
        Some(PinSyncRequest {
            id,
            pin,
            created: row.created,
        })
    }
}

impl Default for MemoryPinStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PinStore for MemoryPinStore {
    fn features(&self) -> StoreFeatures {
        StoreFeatures {
            max_page_size: self.max_page_size,
        }
    }

    async fn find_all_pin_requests(&self, size: usize) -> StoreResult<Vec<PinRequest>> {
        self.check_page_size(size)?;
        let mut requests = self.pin_requests();
        requests.truncate(size);
        Ok(requests)
    }

    async fn delete_pin_requests(&self, ids: &[PinRequestId]) -> StoreResult<()> {
        for id in ids {
            self.pin_requests.remove(id);
        }
        Ok(())
    }

    async fn increment_pin_request_attempts(&self, ids: &[PinRequestId]) -> StoreResult<()> {
        let now = Utc::now();
        for id in ids {
            if let Some(mut request) = self.pin_requests.get_mut(id) {
                request.row.attempts += 1;
                request.row.updated = now;
            }
        }
        Ok(())
    }

    async fn find_pin_sync_requests(
        &self,
        query: SyncRequestQuery,
    ) -> StoreResult<SyncRequestPage> {
        self.check_page_size(query.size)?;
        let after = query
            .after
            .as_deref()
            .map(|cursor| {
                cursor
                    .parse::<u64>()
                    .map_err(|_| anyhow!("invalid page cursor '{cursor}'"))
            })
            .transpose()?;

        let mut matching = self.sync_rows().into_iter().filter(|(seq, _, row)| {
            after.is_none_or(|after| *seq > after)
                && query.from.is_none_or(|from| row.created >= from)
                && query.to.is_none_or(|to| row.created <= to)
        });

        let mut data = Vec::with_capacity(query.size);
        let mut last_seq = None;
        for (seq, id, row) in matching.by_ref().take(query.size) {
            last_seq = Some(seq);
            if let Some(request) = self.materialize(id, row) {
                data.push(request);
            }
        }
        let has_more = matching.next().is_some();

        Ok(SyncRequestPage {
            data,
            after: last_seq.filter(|_| has_more).map(|seq| seq.to_string()),
        })
    }

    async fn update_pins(&self, updates: &[PinStatusUpdate]) -> StoreResult<()> {
        if let Some(missing) = updates.iter().find(|u| !self.pins.contains_key(&u.pin_id)) {
            return Err(StoreError::MissingPin(missing.pin_id.clone()).into());
        }
        let now = Utc::now();
        for update in updates {
            if let Some(mut pin) = self.pins.get_mut(&update.pin_id) {
                pin.status = update.status;
                pin.updated = now;
            }
        }
        Ok(())
    }

    async fn delete_pin_sync_requests(&self, ids: &[PinSyncRequestId]) -> StoreResult<()> {
        for id in ids {
            self.sync_requests.remove(id);
        }
        Ok(())
    }

    async fn create_pin_sync_requests(&self, pin_ids: &[PinId]) -> StoreResult<()> {
        if let Some(missing) = pin_ids.iter().find(|id| !self.pins.contains_key(*id)) {
            return Err(StoreError::MissingPin(missing.clone()).into());
        }
        for pin_id in pin_ids {
            self.insert_pin_sync_request(pin_id)?;
        }
        Ok(())
    }
}

#[cfg(feature = "testutil")]
#[async_trait::async_trait]
impl PinStoreFixtures for MemoryPinStore {
    async fn insert_pin(&self, cid: &str, peer_id: &str, status: PinStatus) -> StoreResult<PinId> {
        Ok(self.seed_pin(cid, peer_id, status))
    }

    async fn insert_pin_request(&self, cid: &str) -> StoreResult<PinRequestId> {
        Ok(self.seed_pin_request(cid))
    }

    async fn pin_status(&self, id: &PinId) -> StoreResult<Option<PinStatus>> {
        Ok(self.pins.get(id).map(|pin| pin.status))
    }
}
