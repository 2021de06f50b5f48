use async_trait::async_trait;
use std::collections::HashMap;

use crate::PinStatus;

/// Read access to the replica status reported by a storage cluster.
#[async_trait]
pub trait ClusterApi: std::fmt::Debug + Send + Sync + 'static {
    fn features(&self) -> ClusterFeatures;

    /// Returns the status of every requested CID.
    ///
    /// The result holds at most one entry per CID; CIDs the cluster does
    /// not track may be missing. Callers pass at most
    /// `features().max_cids_per_request` CIDs, and exactly one when
    /// `supports_multi_cid` is false.
    async fn status_all(&self, cids: &[String]) -> anyhow::Result<Vec<PinInfo>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterFeatures {
    pub supports_multi_cid: bool,
    pub max_cids_per_request: usize,
}

impl ClusterFeatures {
    /// Number of CIDs to pack into a single status call.
    pub fn cids_per_call(&self) -> usize {
        if self.supports_multi_cid {
            self.max_cids_per_request.max(1)
        } else {
            1
        }
    }
}

/// Status of one CID across all cluster peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinInfo {
    pub cid: String,
    pub name: Option<String>,
    /// Keyed by cluster peer id.
    pub peer_map: HashMap<String, PeerPinInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerPinInfo {
    pub peer_name: Option<String>,
    /// Raw status string as reported by the cluster.
    pub status: String,
    pub timestamp: Option<String>,
    pub error: Option<String>,
}

impl PinInfo {
    /// Status at the given peer, or `None` when the peer is not listed.
    pub fn status_at(&self, peer_id: &str) -> Option<PinStatus> {
        self.peer_map
            .get(peer_id)
            .map(|peer| PinStatus::from_cluster_status(&peer.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(peers: &[(&str, &str)]) -> PinInfo {
        PinInfo {
            cid: "bafy1".into(),
            name: None,
            peer_map: peers
                .iter()
                .map(|(peer, status)| {
                    (
                        peer.to_string(),
                        PeerPinInfo {
                            peer_name: None,
                            status: status.to_string(),
                            timestamp: None,
                            error: None,
                        },
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn status_at_maps_the_peer_entry() {
        let info = info(&[("a", "pinned"), ("b", "pin_queued"), ("c", "unpinned")]);
        assert_eq!(info.status_at("a"), Some(PinStatus::Pinned));
        assert_eq!(info.status_at("b"), Some(PinStatus::PinQueued));
        assert_eq!(info.status_at("c"), Some(PinStatus::PinError));
        assert_eq!(info.status_at("missing"), None);
    }

    #[test]
    fn single_cid_clusters_get_one_cid_per_call() {
        let features = ClusterFeatures {
            supports_multi_cid: false,
            max_cids_per_request: 100,
        };
        assert_eq!(features.cids_per_call(), 1);

        let features = ClusterFeatures {
            supports_multi_cid: true,
            max_cids_per_request: 0,
        };
        assert_eq!(features.cids_per_call(), 1);
    }
}
