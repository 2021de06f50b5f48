use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use pinsync_cluster::ClusterClient;
use pinsync_core::PinStore;
use pinsync_pinata::PinataClient;
use pinsync_store_memory::MemoryPinStore;
use pinsync_store_postgrest::PostgrestPinStore;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{StoreConfig, WorkerConfig};

pub mod config;
pub mod delivery;
pub mod reconcile;
pub mod scheduler;

pub use delivery::{DeliveryDrain, DrainReport};
pub use reconcile::{ReconcileReport, Reconciler};
pub use scheduler::{Engine, Scheduler, SchedulerStats};

/// Which engines a worker process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineSelection {
    All,
    Delivery,
    Reconcile,
}

impl EngineSelection {
    pub fn runs_delivery(self) -> bool {
        matches!(self, EngineSelection::All | EngineSelection::Delivery)
    }

    pub fn runs_reconcile(self) -> bool {
        matches!(self, EngineSelection::All | EngineSelection::Reconcile)
    }
}

pub fn create_store(config: StoreConfig) -> anyhow::Result<Arc<dyn PinStore>> {
    let store: Arc<dyn PinStore> = match config {
        StoreConfig::Postgrest(config) => Arc::new(PostgrestPinStore::create(config)?),
        StoreConfig::Memory => Arc::new(MemoryPinStore::new()),
    };
    Ok(store)
}

pub fn delivery_drain(
    config: &WorkerConfig,
    store: Arc<dyn PinStore>,
) -> anyhow::Result<DeliveryDrain> {
    let pinata = config
        .pinata
        .clone()
        .context("no pinata section in worker config")?;
    Ok(DeliveryDrain::new(
        store,
        Arc::new(PinataClient::create(pinata)?),
        config.rate_limit.pinning.limiter(),
        config.retry,
        config.delivery,
    ))
}

pub fn reconciler(config: &WorkerConfig, store: Arc<dyn PinStore>) -> anyhow::Result<Reconciler> {
    Ok(Reconciler::new(
        store,
        Arc::new(ClusterClient::create(config.cluster.clone())?),
        config.rate_limit.cluster.limiter(),
        config.retry,
        config.reconcile,
    ))
}

/// Report of a single engine tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickReport {
    Delivery(DrainReport),
    Reconcile(ReconcileReport),
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickReport::Delivery(report) => write!(f, "delivery: {report}"),
            TickReport::Reconcile(report) => write!(f, "reconcile: {report}"),
        }
    }
}

struct Engines {
    delivery: Option<DeliveryDrain>,
    reconcile: Option<Reconciler>,
}

fn build_engines(config: &WorkerConfig, selection: EngineSelection) -> anyhow::Result<Engines> {
    config.validate(selection)?;
    let store = create_store(config.store.clone())?;
    Ok(Engines {
        delivery: selection
            .runs_delivery()
            .then(|| delivery_drain(config, store.clone()))
            .transpose()?,
        reconcile: selection
            .runs_reconcile()
            .then(|| reconciler(config, store))
            .transpose()?,
    })
}

/// Runs the selected engines until `cancel` fires.
pub async fn run_worker(
    config: WorkerConfig,
    selection: EngineSelection,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let engines = build_engines(&config, selection)?;
    let scheduler = Scheduler::new(config.scheduler.idle_interval());

    let delivery = async {
        if let Some(engine) = &engines.delivery {
            scheduler.run(engine, cancel.clone()).await;
        }
    };
    let reconcile = async {
        if let Some(engine) = &engines.reconcile {
            scheduler.run(engine, cancel.clone()).await;
        }
    };
    tokio::join!(delivery, reconcile);

    info!("worker stopped");
    Ok(())
}

/// Runs one tick of each selected engine, delivery first.
pub async fn run_once(
    config: WorkerConfig,
    selection: EngineSelection,
) -> anyhow::Result<Vec<TickReport>> {
    let engines = build_engines(&config, selection)?;
    let mut reports = Vec::new();
    if let Some(engine) = &engines.delivery {
        reports.push(TickReport::Delivery(engine.drain_once().await?));
    }
    if let Some(engine) = &engines.reconcile {
        reports.push(TickReport::Reconcile(engine.reconcile_once().await?));
    }
    Ok(reports)
}
