//! Bootstrap sequencing across cluster members
//!
//! Node agents report engine outcomes to the [`BootstrapCoordinator`], which
//! decides whether each requested lifecycle transition is allowed. All
//! transitions of one cluster are serialized through that cluster's mutex;
//! different clusters never wait on each other. The coordinator only records
//! state: it never starts processes or waits on the network, and a rejected
//! transition is returned to the caller, who retries after a backoff.

mod cluster_state;
mod donor;
mod node_state;
mod telemetry;

pub use donor::DonorPolicy;
pub use node_state::NodeState;

use crate::topology::{ClusterSpec, InstanceId};
use crate::{Error, Result};
use cluster_state::ClusterState;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// How a joiner receives the cluster's data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateTransfer {
    /// Full copy (SST); occupies a dedicated donor
    Snapshot,
    /// Catch-up from the write-set cache (IST); no donor reserved
    Incremental,
}

/// Outcome of an accepted join request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPlan {
    pub joiner: InstanceId,
    /// Donor moved to DONOR for this joiner, if a full copy was requested
    pub donor: Option<InstanceId>,
}

/// Point-in-time view of one cluster's lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub name: String,
    /// Version of the last applied [`ClusterSpec`]
    pub version: u64,
    pub established: bool,
    pub nodes: BTreeMap<InstanceId, NodeState>,
}

impl ClusterStatus {
    pub fn count(&self, state: NodeState) -> usize {
        self.nodes.values().filter(|s| **s == state).count()
    }

    /// Members that can currently serve joiners
    pub fn sync_sources(&self) -> usize {
        self.nodes.values().filter(|s| s.is_sync_source()).count()
    }
}

/// Serializes node lifecycle transitions per cluster
pub struct BootstrapCoordinator {
    clusters: DashMap<String, Arc<Mutex<ClusterState>>>,
    donor_policy: DonorPolicy,
}

impl BootstrapCoordinator {
    pub fn new(donor_policy: DonorPolicy) -> Self {
        Self {
            clusters: DashMap::new(),
            donor_policy,
        }
    }

    pub fn donor_policy(&self) -> DonorPolicy {
        self.donor_policy
    }

    /// Start tracking a cluster. Every member begins UNCONFIGURED.
    pub async fn register_cluster(&self, spec: &ClusterSpec) -> Result<()> {
        spec.validate()?;
        match self.clusters.entry(spec.name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(Error::InconsistentCluster(format!(
                    "cluster {} is already registered",
                    spec.name
                )))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(ClusterState::new(
                    spec,
                    self.donor_policy,
                ))));
                info!(
                    cluster = %spec.name,
                    members = spec.members().len(),
                    version = spec.version(),
                    "Registered cluster"
                );
                Ok(())
            }
        }
    }

    /// Apply a newer membership snapshot
    pub async fn sync_membership(&self, spec: &ClusterSpec) -> Result<()> {
        spec.validate()?;
        self.apply(&spec.name, "sync_membership", |state| state.sync(spec))
            .await
    }

    /// Stop tracking a cluster, dropping all node state
    pub fn remove_cluster(&self, name: &str) -> bool {
        let removed = self.clusters.remove(name).is_some();
        if removed {
            info!(cluster = %name, "Removed cluster");
        }
        removed
    }

    /// UNCONFIGURED -> BOOTSTRAPPING for the founder
    pub async fn begin_bootstrap(&self, cluster: &str, node: &str) -> Result<()> {
        self.apply(cluster, "begin_bootstrap", |state| state.begin_bootstrap(node))
            .await
    }

    /// BOOTSTRAPPING -> SYNCED once the founder's engine is up
    pub async fn confirm_bootstrap(&self, cluster: &str, node: &str) -> Result<()> {
        self.apply(cluster, "confirm_bootstrap", |state| {
            state.confirm_bootstrap(node)
        })
        .await
    }

    /// UNCONFIGURED -> JOINING. A snapshot transfer also moves the selected
    /// donor SYNCED -> DONOR in the same critical section.
    pub async fn begin_join(
        &self,
        cluster: &str,
        node: &str,
        transfer: StateTransfer,
    ) -> Result<JoinPlan> {
        let donor = self
            .apply(cluster, "begin_join", |state| state.begin_join(node, transfer))
            .await?;
        Ok(JoinPlan {
            joiner: node.to_string(),
            donor,
        })
    }

    /// JOINING -> SYNCED. Returns the donor released back to SYNCED.
    pub async fn complete_join(&self, cluster: &str, node: &str) -> Result<Option<InstanceId>> {
        self.apply(cluster, "complete_join", |state| state.complete_join(node))
            .await
    }

    /// DONOR -> SYNCED when the donor side of a transfer finishes
    pub async fn complete_donation(&self, cluster: &str, node: &str) -> Result<()> {
        self.apply(cluster, "complete_donation", |state| {
            state.complete_donation(node)
        })
        .await
    }

    /// any -> FAILED. Terminal until an operator resets the node.
    pub async fn mark_failed(&self, cluster: &str, node: &str, reason: &str) -> Result<()> {
        self.apply(cluster, "mark_failed", |state| state.mark_failed(node, reason))
            .await
    }

    /// Record a node's current load for donor selection
    pub async fn report_load(&self, cluster: &str, node: &str, load_percent: u8) -> Result<()> {
        self.apply(cluster, "report_load", |state| {
            state.report_load(node, load_percent)
        })
        .await
    }

    pub async fn node_state(&self, cluster: &str, node: &str) -> Result<NodeState> {
        let handle = self.cluster(cluster)?;
        let state = handle.lock().await;
        state.state_of(node)
    }

    pub async fn cluster_status(&self, cluster: &str) -> Result<ClusterStatus> {
        let handle = self.cluster(cluster)?;
        let state = handle.lock().await;
        Ok(ClusterStatus {
            name: state.name.clone(),
            version: state.version,
            established: state.established,
            nodes: state
                .nodes
                .iter()
                .map(|(id, entry)| (id.clone(), entry.state))
                .collect(),
        })
    }

    /// Names of all tracked clusters
    pub fn clusters(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clusters.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn cluster(&self, name: &str) -> Result<Arc<Mutex<ClusterState>>> {
        // Clone the handle so no map shard lock is held across an await
        self.clusters
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::UnknownCluster(name.to_string()))
    }

    async fn apply<T>(
        &self,
        cluster: &str,
        operation: &'static str,
        f: impl FnOnce(&mut ClusterState) -> Result<T>,
    ) -> Result<T> {
        let handle = self.cluster(cluster)?;
        let mut state = handle.lock().await;
        let result = f(&mut *state);
        if let Err(e) = &result {
            let retryable = e.is_retryable();
            telemetry::record_rejection(operation, retryable);
            warn!(cluster = %cluster, operation, retryable, error = %e, "Rejected");
        }
        result
    }
}

impl Default for BootstrapCoordinator {
    fn default() -> Self {
        Self::new(DonorPolicy::default())
    }
}
