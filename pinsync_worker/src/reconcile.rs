//! Brings recorded pin statuses in line with what the cluster reports.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use pinsync_core::{
    ClusterApi, PinId, PinInfo, PinStatusUpdate, PinStore, PinSyncRequest, PinSyncRequestId,
    RateLimiter, RetryPolicy, SyncRequestQuery,
};
use tracing::{debug, info, warn};

use crate::config::ReconcileConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Sync requests fetched this tick.
    pub processed: usize,
    /// Pins whose status was written.
    pub updated: usize,
    /// Sync requests deleted.
    pub removed: usize,
    /// Sync requests recreated for non-terminal pins.
    pub requeued: usize,
    /// Sync requests the cluster gave no answer for.
    pub unresolved: usize,
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed {} sync requests: {} pins updated, {} requests removed, {} requeued, {} unresolved",
            self.processed, self.updated, self.removed, self.requeued, self.unresolved
        )
    }
}

/// Store mutations for one batch of sync requests.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ReconcilePlan {
    pub(crate) updates: Vec<PinStatusUpdate>,
    pub(crate) remove: Vec<PinSyncRequestId>,
    pub(crate) requeue: Vec<PinId>,
    pub(crate) unresolved: usize,
}

/// Decides what happens to each sync request given the cluster's answers.
///
/// `infos` maps a cid to its cluster status; a cid without an entry is
/// unresolved and keeps its recorded status. Every request is removed and
/// non-terminal pins get exactly one fresh request.
pub(crate) fn plan(requests: &[PinSyncRequest], infos: &HashMap<&str, &PinInfo>) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();
    let mut updated: HashSet<&PinId> = HashSet::new();
    let mut requeued: HashSet<&PinId> = HashSet::new();

    for request in requests {
        let pin = &request.pin;
        let observed = infos
            .get(pin.content.cid.as_str())
            .and_then(|info| info.status_at(&pin.location.peer_id));

        let status = match observed {
            Some(observed) => pin.status.advance(observed),
            None => {
                plan.unresolved += 1;
                pin.status
            }
        };

        if status != pin.status && updated.insert(&pin.id) {
            debug!(
                pin = %pin.id,
                cid = %pin.content.cid,
                from = %pin.status,
                to = %status,
                "pin status changed"
            );
            plan.updates.push(PinStatusUpdate {
                pin_id: pin.id.clone(),
                status,
            });
        }

        plan.remove.push(request.id.clone());
        if !status.is_terminal() && requeued.insert(&pin.id) {
            plan.requeue.push(pin.id.clone());
        }
    }
    plan
}

/// One pass over the pin sync request queue.
#[derive(Debug, Clone)]
pub struct Reconciler {
    store: Arc<dyn PinStore>,
    cluster: Arc<dyn ClusterApi>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn PinStore>,
        cluster: Arc<dyn ClusterApi>,
        limiter: RateLimiter,
        retry: RetryPolicy,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            store,
            cluster,
            limiter,
            retry,
            config,
        }
    }

    fn batch_size(&self) -> usize {
        self.config
            .batch_size
            .min(self.store.features().max_page_size)
    }

    /// Queries the cluster for every cid, one rate-limited call per chunk.
    ///
    /// A failed chunk is logged and its cids are left out of the result.
    async fn fetch_statuses(&self, cids: &[String]) -> Vec<PinInfo> {
        let per_call = self.cluster.features().cids_per_call();
        let calls = cids.chunks(per_call).map(|chunk| async move {
            self.limiter.acquire().await;
            (chunk, self.cluster.status_all(chunk).await)
        });

        let mut infos = Vec::with_capacity(cids.len());
        for (chunk, result) in join_all(calls).await {
            match result {
                Ok(chunk_infos) => infos.extend(chunk_infos),
                Err(err) => warn!(
                    cids = chunk.len(),
                    first_cid = %chunk[0],
                    error = %format!("{err:#}"),
                    "cluster status call failed"
                ),
            }
        }
        infos
    }

    pub async fn reconcile_once(&self) -> anyhow::Result<ReconcileReport> {
        // Requests requeued by this tick are created after `tick_start`.
        let tick_start = Utc::now();
        let query = SyncRequestQuery::new(self.batch_size()).created_until(tick_start);
        let page = self
            .retry
            .with_retry("find_pin_sync_requests", || {
                self.store.find_pin_sync_requests(query.clone())
            })
            .await?;
        let requests = page.data;

        if requests.is_empty() {
            debug!("no pin sync requests to reconcile");
            return Ok(ReconcileReport::default());
        }

        let mut seen = HashSet::new();
        let cids: Vec<String> = requests
            .iter()
            .map(|r| r.pin.content.cid.clone())
            .filter(|cid| seen.insert(cid.clone()))
            .collect();

        let infos = self.fetch_statuses(&cids).await;
        let by_cid: HashMap<&str, &PinInfo> =
            infos.iter().map(|info| (info.cid.as_str(), info)).collect();

        let plan = plan(&requests, &by_cid);
        self.commit(&plan).await?;

        let report = ReconcileReport {
            processed: requests.len(),
            updated: plan.updates.len(),
            removed: plan.remove.len(),
            requeued: plan.requeue.len(),
            unresolved: plan.unresolved,
        };
        info!(%report, "reconcile tick done");
        Ok(report)
    }

    /// Applies a plan: status writes, then deletes, then requeues.
    async fn commit(&self, plan: &ReconcilePlan) -> anyhow::Result<()> {
        if !plan.updates.is_empty() {
            self.retry
                .with_retry("update_pins", || self.store.update_pins(&plan.updates))
                .await?;
        }
        if !plan.remove.is_empty() {
            self.retry
                .with_retry("delete_pin_sync_requests", || {
                    self.store.delete_pin_sync_requests(&plan.remove)
                })
                .await?;
        }
        if !plan.requeue.is_empty() {
            self.retry
                .with_retry("create_pin_sync_requests", || {
                    self.store.create_pin_sync_requests(&plan.requeue)
                })
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pinsync_core::{Content, PeerPinInfo, Pin, PinLocation, PinStatus};

    fn request(
        id: &str,
        pin_id: &str,
        cid: &str,
        peer: &str,
        status: PinStatus,
    ) -> PinSyncRequest {
        let at = Utc.with_ymd_and_hms(2021, 9, 1, 10, 0, 0).unwrap();
        PinSyncRequest {
            id: id.into(),
            created: at,
            pin: Pin {
                id: pin_id.into(),
                content: Content::new(cid),
                location: PinLocation {
                    id: peer.into(),
                    peer_id: peer.to_owned(),
                    peer_name: None,
                    region: None,
                },
                status,
                created: at,
                updated: at,
            },
        }
    }

    fn info(cid: &str, peers: &[(&str, &str)]) -> PinInfo {
        PinInfo {
            cid: cid.to_owned(),
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
    fn pinned_everywhere_removes_every_request() {
        let requests = vec![
            request("1", "p1", "bafy1", "peer-a", PinStatus::Pinning),
            request("2", "p2", "bafy1", "peer-b", PinStatus::Pinned),
            request("3", "p3", "bafy3", "peer-a", PinStatus::PinQueued),
            request("4", "p4", "bafy4", "peer-a", PinStatus::PinQueued),
        ];
        let infos = [
            info("bafy1", &[("peer-a", "pinned"), ("peer-b", "pinned")]),
            info("bafy3", &[("peer-a", "pinned")]),
            info("bafy4", &[("peer-a", "pinned")]),
        ];
        let by_cid = infos.iter().map(|i| (i.cid.as_str(), i)).collect();

        let plan = plan(&requests, &by_cid);
        assert_eq!(plan.updates.len(), 3);
        assert_eq!(plan.remove.len(), 4);
        assert!(plan.requeue.is_empty());
        assert_eq!(plan.unresolved, 0);
    }

    #[test]
    fn unknown_peer_or_cid_keeps_status_and_requeues() {
        let requests = vec![
            request("1", "p1", "bafy1", "peer-missing", PinStatus::Pinning),
            request("2", "p2", "bafy-missing", "peer-a", PinStatus::PinQueued),
        ];
        let infos = [info("bafy1", &[("peer-a", "pinned")])];
        let by_cid = infos.iter().map(|i| (i.cid.as_str(), i)).collect();

        let plan = plan(&requests, &by_cid);
        assert!(plan.updates.is_empty());
        assert_eq!(plan.unresolved, 2);
        assert_eq!(plan.requeue, vec![PinId::from("p1"), PinId::from("p2")]);
    }

    #[test]
    fn pinned_pin_only_moves_to_error() {
        let requests = vec![
            request("1", "p1", "bafy1", "peer-a", PinStatus::Pinned),
            request("2", "p2", "bafy2", "peer-a", PinStatus::Pinned),
        ];
        let infos = [
            info("bafy1", &[("peer-a", "pinning")]),
            info("bafy2", &[("peer-a", "unpinned")]),
        ];
        let by_cid = infos.iter().map(|i| (i.cid.as_str(), i)).collect();

        let plan = plan(&requests, &by_cid);
        assert_eq!(
            plan.updates,
            vec![PinStatusUpdate {
                pin_id: "p2".into(),
                status: PinStatus::PinError
            }]
        );
        assert_eq!(plan.requeue, vec![PinId::from("p2")]);
    }

    #[test]
    fn duplicate_requests_for_one_pin_requeue_once() {
        let requests = vec![
            request("1", "p1", "bafy1", "peer-a", PinStatus::PinQueued),
            request("2", "p1", "bafy1", "peer-a", PinStatus::PinQueued),
        ];
        let infos = [info("bafy1", &[("peer-a", "pinning")])];
        let by_cid = infos.iter().map(|i| (i.cid.as_str(), i)).collect();

        let plan = plan(&requests, &by_cid);
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.remove.len(), 2);
        assert_eq!(plan.requeue, vec![PinId::from("p1")]);
    }
}
