//! gcache sizing from a node's flavor
//!
//! The write-set cache grows linearly with memory: `ratio_mb` of cache for
//! every `per_ram_mb` of RAM, rounded down and clamped to engine bounds.

use super::Flavor;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Maps a resource profile to the engine's gcache size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizingPolicy {
    /// Cache megabytes granted per `per_ram_mb` of RAM
    pub ratio_mb: u64,
    /// RAM megabytes per `ratio_mb` of cache
    pub per_ram_mb: u64,
    /// Smallest gcache the engine accepts
    pub min_cache_mb: u64,
    /// Largest gcache we hand out
    pub max_cache_mb: u64,
}

impl Default for SizingPolicy {
    fn default() -> Self {
        Self {
            ratio_mb: 128,
            per_ram_mb: 512,
            min_cache_mb: 64,
            max_cache_mb: 64 * 1024, // 64 GB
        }
    }
}

impl SizingPolicy {
    /// Create a policy, rejecting ratios and bounds that cannot be applied
    pub fn new(ratio_mb: u64, per_ram_mb: u64, min_cache_mb: u64, max_cache_mb: u64) -> Result<Self> {
        let policy = Self {
            ratio_mb,
            per_ram_mb,
            min_cache_mb,
            max_cache_mb,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        if self.per_ram_mb == 0 || self.ratio_mb == 0 {
            return Err(Error::Config(format!(
                "sizing ratio must be positive, got {}MB per {}MB",
                self.ratio_mb, self.per_ram_mb
            )));
        }
        if self.min_cache_mb > self.max_cache_mb {
            return Err(Error::Config(format!(
                "gcache bounds inverted: min {}MB > max {}MB",
                self.min_cache_mb, self.max_cache_mb
            )));
        }
        Ok(())
    }

    /// gcache size in megabytes for `flavor`
    pub fn compute_cache_size(&self, flavor: &Flavor) -> Result<u64> {
        if flavor.ram_mb <= 0 {
            return Err(Error::InvalidFlavor {
                ram_mb: flavor.ram_mb,
            });
        }
        let ram = flavor.ram_mb as u128;
        let raw = ram * self.ratio_mb as u128 / self.per_ram_mb as u128;
        let capped = raw.min(self.max_cache_mb as u128) as u64;
        Ok(capped.max(self.min_cache_mb))
    }
}
