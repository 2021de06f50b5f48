//! Records owned by the external data store.
//!
//! The engines never keep these around longer than one batch; they are
//! plain data carried between the store and the engines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::PinStatus;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }
    };
}

record_id!(
    /// Identifier of a `Pin` row.
    PinId
);
record_id!(
    /// Identifier of a `PinLocation` row.
    PinLocationId
);
record_id!(
    /// Identifier of a `PinRequest` row.
    PinRequestId
);
record_id!(
    /// Identifier of a `PinSyncRequest` row.
    PinSyncRequestId
);

/// Content known to the store, identified by its CID.
///
/// CIDs are treated as opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub cid: String,
    pub dag_size: Option<u64>,
}

impl Content {
    pub fn new(cid: impl Into<String>) -> Self {
        Self {
            cid: cid.into(),
            dag_size: None,
        }
    }
}

/// A storage peer that can hold replicas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinLocation {
    pub id: PinLocationId,
    /// Cluster peer id, unique per location.
    pub peer_id: String,
    pub peer_name: Option<String>,
    pub region: Option<String>,
}

/// One replica of `content` at one `location`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    pub id: PinId,
    pub content: Content,
    pub location: PinLocation,
    pub status: PinStatus,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Content that still has to be handed to the external pinning backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRequest {
    pub id: PinRequestId,
    pub cid: String,
    /// Failed deliveries recorded so far. Never decreases.
    pub attempts: u32,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// A pin whose status must be re-checked against the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinSyncRequest {
    pub id: PinSyncRequestId,
    pub pin: Pin,
    pub created: DateTime<Utc>,
}

/// A staged status change for one pin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinStatusUpdate {
    pub pin_id: PinId,
    pub status: PinStatus,
}
