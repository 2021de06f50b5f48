//! Hands queued pin requests to the external pinning service.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use pinsync_core::{PinRequest, PinRequestId, PinStore, PinningService, RateLimiter, RetryPolicy};
use tracing::{debug, info, warn};

use crate::config::DeliveryConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Pin requests fetched this tick.
    pub total: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Failed requests that used up their attempts and were deleted.
    pub dead_lettered: usize,
}

impl fmt::Display for DrainReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "delivered {} of {} pin requests ({} failed, {} dead-lettered)",
            self.delivered, self.total, self.failed, self.dead_lettered
        )
    }
}

/// One pass over the pin request queue.
///
/// Requests are only removed once the pinning service accepted them, so a
/// crash between the pin call and the delete means the request is sent
/// again on the next tick.
#[derive(Debug, Clone)]
pub struct DeliveryDrain {
    store: Arc<dyn PinStore>,
    pinning: Arc<dyn PinningService>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    config: DeliveryConfig,
}

impl DeliveryDrain {
    pub fn new(
        store: Arc<dyn PinStore>,
        pinning: Arc<dyn PinningService>,
        limiter: RateLimiter,
        retry: RetryPolicy,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            store,
            pinning,
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

    async fn deliver(&self, request: &PinRequest) -> anyhow::Result<()> {
        self.limiter.acquire().await;
        self.pinning.pin(&request.cid).await
    }

    pub async fn drain_once(&self) -> anyhow::Result<DrainReport> {
        let size = self.batch_size();
        let requests = self
            .retry
            .with_retry("find_all_pin_requests", || {
                self.store.find_all_pin_requests(size)
            })
            .await?;

        let mut report = DrainReport {
            total: requests.len(),
            ..Default::default()
        };
        if requests.is_empty() {
            debug!("no pin requests to deliver");
            return Ok(report);
        }

        let outcomes = join_all(requests.iter().map(|request| self.deliver(request))).await;

        let mut delivered: Vec<PinRequestId> = Vec::new();
        let mut failed: Vec<&PinRequest> = Vec::new();
        for (request, outcome) in requests.iter().zip(outcomes) {
            match outcome {
                Ok(()) => delivered.push(request.id.clone()),
                Err(err) => {
                    warn!(
                        pin_request = %request.id,
                        cid = %request.cid,
                        error = %format!("{err:#}"),
                        "failed to pin"
                    );
                    failed.push(request);
                }
            }
        }
        report.delivered = delivered.len();
        report.failed = failed.len();

        // Accepted requests are removed before any attempt bookkeeping.
        self.delete_requests(&delivered).await?;

        let dead = self.record_failures(&failed).await?;
        report.dead_lettered = dead.len();
        self.delete_requests(&dead).await?;

        info!(%report, "delivery tick done");
        Ok(report)
    }

    async fn delete_requests(&self, ids: &[PinRequestId]) -> anyhow::Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.retry
            .with_retry("delete_pin_requests", || self.store.delete_pin_requests(ids))
            .await
    }

    /// Counts failed attempts when attempt tracking is on and returns the
    /// requests whose recorded attempts already reached the limit.
    async fn record_failures(&self, failed: &[&PinRequest]) -> anyhow::Result<Vec<PinRequestId>> {
        let Some(max_attempts) = self.config.max_attempts else {
            return Ok(Vec::new());
        };
        if failed.is_empty() {
            return Ok(Vec::new());
        }

        let (dead, retained): (Vec<&PinRequest>, Vec<&PinRequest>) = failed
            .iter()
            .copied()
            .partition(|request| request.attempts >= max_attempts);

        let retained: Vec<PinRequestId> = retained.iter().map(|r| r.id.clone()).collect();
        if !retained.is_empty() {
            self.retry
                .with_retry("increment_pin_request_attempts", || {
                    self.store.increment_pin_request_attempts(&retained)
                })
                .await?;
        }

        for request in &dead {
            warn!(
                pin_request = %request.id,
                cid = %request.cid,
                attempts = request.attempts,
                "giving up on pin request"
            );
        }
        Ok(dead.into_iter().map(|r| r.id.clone()).collect())
    }
}
