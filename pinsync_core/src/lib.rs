//! Core pinsync types and traits.
//!
//! This crate defines what the pin lifecycle engines operate on:
//!
//! - The domain records owned by the external data store (`Pin`,
//!   `PinLocation`, `PinRequest`, `PinSyncRequest`) and the closed
//!   `PinStatus` vocabulary.
//! - The seams to the outside world: `PinStore` (the data store),
//!   `ClusterApi` (the clustered storage backend that reports replica
//!   status) and `PinningService` (the external pinning backend).
//! - The two shared call-shaping utilities: `RateLimiter` for outbound
//!   calls to third parties and `RetryPolicy` for data-store calls.
//!
//! Implementations of the traits live in their own crates
//! (`pinsync_store_memory`, `pinsync_store_postgrest`, `pinsync_cluster`,
//! `pinsync_pinata`); the engines themselves live in `pinsync_worker`.

pub mod cluster;
pub mod model;
pub mod pinning;
pub mod rate_limit;
pub mod retry;
pub mod status;
pub mod store;

// Test utilities (behind feature flag)
#[cfg(feature = "testutil")]
pub mod testutil;

pub use cluster::{ClusterApi, ClusterFeatures, PeerPinInfo, PinInfo};
pub use model::{
    Content, Pin, PinId, PinLocation, PinLocationId, PinRequest, PinRequestId, PinStatusUpdate,
    PinSyncRequest, PinSyncRequestId,
};
pub use pinning::PinningService;
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
pub use status::PinStatus;
pub use store::{PinStore, StoreError, StoreFeatures, StoreResult, SyncRequestPage, SyncRequestQuery};
