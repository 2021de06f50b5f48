use std::time::Duration;

use anyhow::bail;
use pinsync_cluster::ClusterConfig;
use pinsync_core::{RateLimiter, RetryPolicy};
use pinsync_pinata::PinataConfig;
use pinsync_store_postgrest::PostgrestConfig;
use serde::{Deserialize, Serialize};

use crate::EngineSelection;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkerConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub pinata: Option<PinataConfig>,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum StoreConfig {
    Postgrest(PostgrestConfig),
    /// Process-local store, for trying the worker out.
    Memory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Postgrest(PostgrestConfig::default())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeliveryConfig {
    pub batch_size: usize,
    /// Recorded failures after which a pin request is dropped. A request
    /// that has already failed `n` times is deleted on its next failure,
    /// so it gets `n + 1` pin calls in total.
    /// `None` keeps failed requests forever.
    pub max_attempts: Option<u32>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            batch_size: 600,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReconcileConfig {
    pub batch_size: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { batch_size: 1000 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimitConfig {
    pub capacity: usize,
    pub window_ms: u64,
}

impl LimitConfig {
    pub fn limiter(&self) -> RateLimiter {
        RateLimiter::new(self.capacity, Duration::from_millis(self.window_ms))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Pinata allows 3 requests per second.
    pub pinning: LimitConfig,
    pub cluster: LimitConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            pinning: LimitConfig {
                capacity: 2,
                window_ms: 1000,
            },
            cluster: LimitConfig {
                capacity: 10,
                window_ms: 1000,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub idle_interval_secs: u64,
}

impl SchedulerConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_interval_secs: 10,
        }
    }
}

impl WorkerConfig {
    /// Overrides credentials and endpoints from the environment.
    ///
    /// `lookup` is `std::env::var(..).ok()` in production.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("CLUSTER_API_URL") {
            self.cluster.api_url = url;
        }
        if let Some(token) = lookup("CLUSTER_BASIC_AUTH_TOKEN") {
            self.cluster.basic_auth_token = Some(token);
        }
        if let StoreConfig::Postgrest(store) = &mut self.store {
            if let Some(url) = lookup("PG_REST_URL") {
                store.url = url;
            }
            if let Some(jwt) = lookup("PG_REST_JWT") {
                store.jwt = jwt;
            }
        }
        if let Some(jwt) = lookup("PINATA_JWT") {
            self.pinata.get_or_insert_with(|| PinataConfig::new("")).jwt = jwt;
        }
        if let Some(url) = lookup("PINATA_API_URL") {
            if let Some(pinata) = &mut self.pinata {
                pinata.api_url = url;
            }
        }
    }

    /// Checks that everything the selected engines need is present.
    pub fn validate(&self, selection: EngineSelection) -> anyhow::Result<()> {
        if let StoreConfig::Postgrest(store) = &self.store {
            if store.url.is_empty() {
                bail!("missing PG_REST_URL environment var");
            }
            if store.jwt.is_empty() {
                bail!("missing PG_REST_JWT environment var");
            }
        }
        if selection.runs_delivery() {
            match &self.pinata {
                Some(pinata) if !pinata.jwt.is_empty() => {}
                _ => bail!("missing PINATA_JWT environment var"),
            }
            if self.delivery.batch_size == 0 {
                bail!("delivery.batch_size must be at least 1");
            }
        }
        if selection.runs_reconcile() {
            if self.cluster.api_url.is_empty() {
                bail!("missing CLUSTER_API_URL environment var");
            }
            if self.reconcile.batch_size == 0 {
                bail!("reconcile.batch_size must be at least 1");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config: WorkerConfig = toml::from_str("").unwrap();
        assert_eq!(config, WorkerConfig::default());
        assert_eq!(config.delivery.batch_size, 600);
        assert_eq!(config.reconcile.batch_size, 1000);
        assert_eq!(config.rate_limit.pinning.capacity, 2);
        assert_eq!(config.scheduler.idle_interval(), Duration::from_secs(10));
    }

    #[test]
    fn parses_partial_sections() {
        let config: WorkerConfig = toml::from_str(
            r#"
            [store]
            type = "memory"

            [delivery]
            max_attempts = 100

            [cluster]
            api_url = "http://127.0.0.1:9094"
            max_cids_per_request = 20
            "#,
        )
        .unwrap();
        assert_eq!(config.store, StoreConfig::Memory);
        assert_eq!(config.delivery.max_attempts, Some(100));
        assert_eq!(config.delivery.batch_size, 600);
        assert_eq!(config.cluster.max_cids_per_request, 20);
        assert!(config.cluster.supports_multi_cid);
    }

    #[test]
    fn environment_fills_credentials() {
        let mut config = WorkerConfig::default();
        config.apply_env(env(&[
            ("CLUSTER_API_URL", "http://cluster"),
            ("CLUSTER_BASIC_AUTH_TOKEN", "dG9rZW4="),
            ("PG_REST_URL", "http://db"),
            ("PG_REST_JWT", "db-jwt"),
            ("PINATA_JWT", "pinata-jwt"),
        ]));

        assert_eq!(config.cluster.api_url, "http://cluster");
        assert_eq!(config.cluster.basic_auth_token.as_deref(), Some("dG9rZW4="));
        let StoreConfig::Postgrest(store) = &config.store else {
            panic!("expected postgrest store");
        };
        assert_eq!(store.url, "http://db");
        assert_eq!(store.jwt, "db-jwt");
        let pinata = config.pinata.as_ref().unwrap();
        assert_eq!(pinata.jwt, "pinata-jwt");
        assert_eq!(pinata.api_url, pinsync_pinata::DEFAULT_API_URL);
        config.validate(EngineSelection::All).unwrap();
    }

    #[test]
    fn missing_credentials_name_the_variable() {
        let mut config = WorkerConfig::default();
        config.apply_env(env(&[("PG_REST_URL", "http://db"), ("PG_REST_JWT", "jwt")]));

        let err = config.validate(EngineSelection::Reconcile).unwrap_err();
        assert_eq!(err.to_string(), "missing CLUSTER_API_URL environment var");
        let err = config.validate(EngineSelection::Delivery).unwrap_err();
        assert_eq!(err.to_string(), "missing PINATA_JWT environment var");
    }

    #[test]
    fn memory_store_needs_no_database_credentials() {
        let config = WorkerConfig {
            store: StoreConfig::Memory,
            cluster: ClusterConfig {
                api_url: "http://cluster".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        config.validate(EngineSelection::Reconcile).unwrap();
    }
}
