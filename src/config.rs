//! Environment-based configuration
//!
//! Builds the sizing policy, SST method, donor policy and renderer settings
//! from environment variables so the same binary can be tuned per
//! deployment without code changes.

use crate::coordinator::{BootstrapCoordinator, DonorPolicy};
use crate::profile::{ConfigProfileBuilder, SstMethod, WsrepTemplate};
use crate::topology::SizingPolicy;
use crate::{Error, Result};
use std::collections::HashMap;
use tracing::info;

/// Tunables for profile synthesis and bootstrap sequencing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyConfig {
    pub sizing: SizingPolicy,
    pub sst_method: SstMethod,
    pub donor_policy: DonorPolicy,
    pub provider_path: String,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            sizing: SizingPolicy::default(),
            sst_method: SstMethod::default(),
            donor_policy: DonorPolicy::default(),
            provider_path: WsrepTemplate::DEFAULT_PROVIDER_PATH.to_string(),
        }
    }
}

impl TopologyConfig {
    /// Load configuration from the process environment
    ///
    /// Environment variables:
    /// - GALERA_SST_METHOD: rsync, mysqldump, xtrabackup-v2 (default), mariabackup
    /// - GALERA_DONOR_POLICY: least_loaded (default) or round_robin
    /// - GALERA_PROVIDER_PATH: Galera provider library path
    /// - GALERA_GCACHE_MIN_MB / GALERA_GCACHE_MAX_MB: gcache bounds
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars()
            .filter(|(key, _)| key.starts_with("GALERA_"))
            .collect();
        let config = Self::from_vars(&vars)?;
        info!(
            sst_method = config.sst_method.as_str(),
            donor_policy = config.donor_policy.as_str(),
            provider_path = %config.provider_path,
            gcache_min_mb = config.sizing.min_cache_mb,
            gcache_max_mb = config.sizing.max_cache_mb,
            "Loaded topology configuration"
        );
        Ok(config)
    }

    /// Build configuration from an explicit variable map
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = non_empty(vars, "GALERA_SST_METHOD") {
            config.sst_method = raw.parse().map_err(Error::Config)?;
        }
        if let Some(raw) = non_empty(vars, "GALERA_DONOR_POLICY") {
            config.donor_policy = raw.parse().map_err(Error::Config)?;
        }
        if let Some(raw) = non_empty(vars, "GALERA_PROVIDER_PATH") {
            config.provider_path = raw.to_string();
        }
        if let Some(raw) = non_empty(vars, "GALERA_GCACHE_MIN_MB") {
            config.sizing.min_cache_mb = parse_mb("GALERA_GCACHE_MIN_MB", raw)?;
        }
        if let Some(raw) = non_empty(vars, "GALERA_GCACHE_MAX_MB") {
            config.sizing.max_cache_mb = parse_mb("GALERA_GCACHE_MAX_MB", raw)?;
        }
        config.sizing.validate()?;

        Ok(config)
    }

    pub fn profile_builder(&self) -> ConfigProfileBuilder {
        ConfigProfileBuilder::new(self.sizing, self.sst_method)
    }

    pub fn template(&self) -> WsrepTemplate {
        WsrepTemplate::new(self.provider_path.clone())
    }

    pub fn coordinator(&self) -> BootstrapCoordinator {
        BootstrapCoordinator::new(self.donor_policy)
    }
}

fn non_empty<'a>(vars: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn parse_mb(name: &str, raw: &str) -> Result<u64> {
    raw.parse::<u64>().map_err(|e| {
        Error::Config(format!(
            "{name} must be a whole number of megabytes, got '{raw}': {e}"
        ))
    })
}
