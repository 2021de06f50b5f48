use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use clap::Subcommand;
use pinsync_worker::config::WorkerConfig;
use toml_edit::{DocumentMut, Item, Table, value};
use tracing::info;

#[derive(Subcommand)]
pub enum CmdConfig {
    /// Creates the worker config file, keeping any values already set
    Init,
}

impl CmdConfig {
    pub fn run(self, config_file: PathBuf) -> anyhow::Result<()> {
        let mut doc = if config_file.exists() {
            fs::read_to_string(&config_file)?
        } else {
            if let Some(parent) = config_file.parent() {
                fs::create_dir_all(parent)?;
            }
            "".to_owned()
        }
        .parse::<DocumentMut>()
        .context("could not parse worker config file")?;

        match self {
            Self::Init => write_defaults(&mut doc)?,
        }

        info!("writing to config file {config_file:?}");

        let tmp_path = config_file.with_extension("tmp");
        let mut tmp = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        tmp.write_all(doc.to_string().as_bytes())?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, config_file)?;
        Ok(())
    }
}

fn table<'a>(parent: &'a mut Table, key: &str) -> anyhow::Result<&'a mut Table> {
    parent
        .entry(key)
        .or_insert(Item::Table(Table::new()))
        .as_table_mut()
        .with_context(|| format!("'{key}' in worker config is not a table"))
}

/// Fills in every setting that is not present yet.
/// Credentials are left out; they come from the environment.
fn write_defaults(doc: &mut DocumentMut) -> anyhow::Result<()> {
    let defaults = WorkerConfig::default();
    let root = doc.as_table_mut();

    table(root, "store")?
        .entry("type")
        .or_insert(value("postgrest"));

    let cluster = table(root, "cluster")?;
    cluster
        .entry("supports_multi_cid")
        .or_insert(value(defaults.cluster.supports_multi_cid));
    cluster
        .entry("max_cids_per_request")
        .or_insert(value(defaults.cluster.max_cids_per_request as i64));

    table(root, "delivery")?
        .entry("batch_size")
        .or_insert(value(defaults.delivery.batch_size as i64));
    table(root, "reconcile")?
        .entry("batch_size")
        .or_insert(value(defaults.reconcile.batch_size as i64));

    let rate_limit = table(root, "rate_limit")?;
    for (name, limit) in [
        ("pinning", defaults.rate_limit.pinning),
        ("cluster", defaults.rate_limit.cluster),
    ] {
        let limit_table = table(rate_limit, name)?;
        limit_table
            .entry("capacity")
            .or_insert(value(limit.capacity as i64));
        limit_table
            .entry("window_ms")
            .or_insert(value(limit.window_ms as i64));
    }

    table(root, "scheduler")?
        .entry("idle_interval_secs")
        .or_insert(value(defaults.scheduler.idle_interval_secs as i64));
    Ok(())
}

/// Reads the worker config, falling back to defaults when the file is
/// missing, then applies environment overrides.
pub fn load_config(
    config_file: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<WorkerConfig> {
    let mut config: WorkerConfig = if config_file.exists() {
        let raw = fs::read_to_string(config_file)
            .with_context(|| format!("could not read {config_file:?}"))?;
        toml::from_str(&raw).with_context(|| format!("could not parse {config_file:?}"))?
    } else {
        info!("no config file at {config_file:?}, using defaults");
        WorkerConfig::default()
    };
    config.apply_env(env);
    Ok(config)
}
