//! Drives an engine tick after tick until shutdown.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::delivery::DeliveryDrain;
use crate::reconcile::Reconciler;

/// A unit of work that is run repeatedly by the `Scheduler`.
#[async_trait]
pub trait Engine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs one tick and returns how many items it processed.
    async fn tick(&self) -> anyhow::Result<usize>;
}

#[async_trait]
impl Engine for DeliveryDrain {
    fn name(&self) -> &'static str {
        "delivery"
    }

    async fn tick(&self) -> anyhow::Result<usize> {
        Ok(self.drain_once().await?.total)
    }
}

#[async_trait]
impl Engine for Reconciler {
    fn name(&self) -> &'static str {
        "reconcile"
    }

    async fn tick(&self) -> anyhow::Result<usize> {
        Ok(self.reconcile_once().await?.processed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    /// Ticks that found nothing to do.
    pub idle_ticks: u64,
    pub failed_ticks: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    idle_interval: Duration,
}

impl Scheduler {
    pub fn new(idle_interval: Duration) -> Self {
        Self { idle_interval }
    }

    /// Runs `engine` until `cancel` fires.
    ///
    /// Empty and failed ticks are followed by `idle_interval` of sleep;
    /// a tick that did work is followed straight away by the next one.
    /// A running tick is always allowed to finish.
    pub async fn run(&self, engine: &dyn Engine, cancel: CancellationToken) -> SchedulerStats {
        let mut stats = SchedulerStats::default();
        info!(engine = engine.name(), "engine started");

        while !cancel.is_cancelled() {
            stats.ticks += 1;
            let idle = match engine.tick().await {
                Ok(0) => {
                    stats.idle_ticks += 1;
                    true
                }
                Ok(processed) => {
                    debug!(engine = engine.name(), processed, "tick done");
                    false
                }
                Err(err) => {
                    stats.failed_ticks += 1;
                    error!(
                        engine = engine.name(),
                        error = %format!("{err:#}"),
                        "tick failed, retrying after idle interval"
                    );
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.idle_interval) => {}
                }
            }
        }

        info!(engine = engine.name(), ticks = stats.ticks, "engine stopped");
        stats
    }
}
