//! Donor selection for state snapshot transfers

use crate::topology::InstanceId;
use serde::{Deserialize, Serialize};

/// How a donor is picked among synced members
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DonorPolicy {
    /// Lowest reported load; round-robin until every candidate reported
    #[default]
    LeastLoaded,
    /// Rotate over candidates ordered by instance id
    RoundRobin,
}

impl DonorPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeastLoaded => "least_loaded",
            Self::RoundRobin => "round_robin",
        }
    }
}

impl std::str::FromStr for DonorPolicy {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "least_loaded" | "load" => Ok(Self::LeastLoaded),
            "round_robin" | "rr" => Ok(Self::RoundRobin),
            other => Err(format!(
                "unknown donor policy '{}'; expected least_loaded or round_robin",
                other
            )),
        }
    }
}

/// A synced member eligible to serve a transfer
#[derive(Debug, Clone, Copy)]
pub(crate) struct DonorCandidate<'a> {
    pub id: &'a InstanceId,
    pub load_percent: Option<u8>,
}

/// Per-cluster donor selector. Lives inside the cluster's critical section.
#[derive(Debug, Clone)]
pub(crate) struct DonorSelector {
    policy: DonorPolicy,
    /// Last donor handed out by round-robin
    cursor: Option<InstanceId>,
}

impl DonorSelector {
    pub fn new(policy: DonorPolicy) -> Self {
        Self {
            policy,
            cursor: None,
        }
    }

    pub fn policy(&self) -> DonorPolicy {
        self.policy
    }

    /// Pick a donor. `candidates` must be sorted by instance id.
    pub fn select(&mut self, candidates: &[DonorCandidate<'_>]) -> Option<InstanceId> {
        if candidates.is_empty() {
            return None;
        }

        if self.policy == DonorPolicy::LeastLoaded
            && candidates.iter().all(|c| c.load_percent.is_some())
        {
            // min_by_key keeps the first minimum, so ties go to the lowest id
            let chosen = candidates.iter().min_by_key(|c| c.load_percent)?;
            return Some(chosen.id.clone());
        }

        let chosen = match &self.cursor {
            Some(last) => candidates
                .iter()
                .find(|c| c.id > last)
                .unwrap_or(&candidates[0]),
            None => &candidates[0],
        };
        self.cursor = Some(chosen.id.clone());
        Some(chosen.id.clone())
    }
}
