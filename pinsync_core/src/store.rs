use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{
    PinId, PinRequest, PinRequestId, PinStatusUpdate, PinSyncRequest, PinSyncRequestId,
};

pub type StoreResult<T, E = anyhow::Error> = std::result::Result<T, E>;

/// Typed failures a `PinStore` may report.
///
/// Transport failures are passed through as plain `anyhow` errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("missing pin {0}")]
    MissingPin(PinId),

    #[error("requested page of {requested} rows exceeds the store maximum of {max}")]
    PageTooLarge { requested: usize, max: usize },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Data-store operations needed by the delivery and reconciliation engines.
///
/// Every mutation takes a whole batch; implementations apply a batch in
/// as few round trips as the backend allows.
#[async_trait]
pub trait PinStore: std::fmt::Debug + Send + Sync + 'static {
    fn features(&self) -> StoreFeatures;

    /// Returns up to `size` pin requests, oldest first.
    async fn find_all_pin_requests(&self, size: usize) -> StoreResult<Vec<PinRequest>>;

    async fn delete_pin_requests(&self, ids: &[PinRequestId]) -> StoreResult<()>;

    /// Adds one failed attempt to each of the given pin requests.
    async fn increment_pin_request_attempts(&self, ids: &[PinRequestId]) -> StoreResult<()>;

    /// Returns one page of pin sync requests, oldest first.
    async fn find_pin_sync_requests(&self, query: SyncRequestQuery)
    -> StoreResult<SyncRequestPage>;

    async fn update_pins(&self, updates: &[PinStatusUpdate]) -> StoreResult<()>;

    async fn delete_pin_sync_requests(&self, ids: &[PinSyncRequestId]) -> StoreResult<()>;

    /// Creates one new sync request per pin id.
    ///
    /// Fails with `StoreError::MissingPin` if any pin does not exist, in
    /// which case nothing is created.
    async fn create_pin_sync_requests(&self, pin_ids: &[PinId]) -> StoreResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreFeatures {
    /// Largest page the store accepts in a single fetch.
    pub max_page_size: usize,
}

/// Filter and paging arguments for `PinStore::find_pin_sync_requests`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequestQuery {
    /// Only requests created at or after this instant.
    pub from: Option<DateTime<Utc>>,
    /// Only requests created at or before this instant.
    pub to: Option<DateTime<Utc>>,
    pub size: usize,
    /// Opaque cursor returned by the previous page.
    pub after: Option<String>,
}

impl SyncRequestQuery {
    pub fn new(size: usize) -> Self {
        Self {
            from: None,
            to: None,
            size,
            after: None,
        }
    }

    pub fn created_until(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncRequestPage {
    pub data: Vec<PinSyncRequest>,
    /// Cursor for the next page; `None` on the last page.
    pub after: Option<String>,
}
