//! Per-cluster lifecycle state
//!
//! Every method here runs inside the owning cluster's critical section, so
//! founder and join-eligibility checks see a consistent view of all nodes.

use super::donor::{DonorCandidate, DonorSelector};
use super::telemetry;
use super::{DonorPolicy, NodeState, StateTransfer};
use crate::topology::{ClusterSpec, InstanceId};
use crate::{Error, Result};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub(crate) struct NodeEntry {
    pub state: NodeState,
    /// Last reported load (0-100%)
    pub load_percent: Option<u8>,
    /// Donor serving this node while it is joining
    pub donor: Option<InstanceId>,
    /// Joiner this node is serving while it is a donor
    pub serving: Option<InstanceId>,
}

impl NodeEntry {
    fn new() -> Self {
        Self {
            state: NodeState::Unconfigured,
            load_percent: None,
            donor: None,
            serving: None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ClusterState {
    pub name: String,
    pub version: u64,
    pub founder: Option<InstanceId>,
    /// Genesis completed, either observed here or carried by the snapshot
    pub established: bool,
    /// A founder entered BOOTSTRAPPING; never cleared
    pub genesis_started: bool,
    /// Ordered by instance id so donor candidates come out sorted
    pub nodes: BTreeMap<InstanceId, NodeEntry>,
    selector: DonorSelector,
}

impl ClusterState {
    pub fn new(spec: &ClusterSpec, policy: DonorPolicy) -> Self {
        let nodes = spec
            .members()
            .iter()
            .map(|m| (m.instance_id.clone(), NodeEntry::new()))
            .collect();
        Self {
            name: spec.name.clone(),
            version: spec.version(),
            founder: spec.founder().map(str::to_string),
            established: spec.is_established(),
            genesis_started: false,
            nodes,
            selector: DonorSelector::new(policy),
        }
    }

    /// Apply a newer snapshot: track new members, drop removed ones.
    /// A snapshot at the current version must describe the same members and
    /// changes nothing.
    pub fn sync(&mut self, spec: &ClusterSpec) -> Result<()> {
        if spec.version() < self.version {
            return Err(Error::StaleSnapshot {
                current: self.version,
                offered: spec.version(),
            });
        }
        if let (Some(ours), Some(theirs)) = (self.founder.as_deref(), spec.founder()) {
            if ours != theirs {
                return Err(Error::InconsistentCluster(format!(
                    "cluster {} was founded by {}, snapshot v{} names {}",
                    self.name,
                    ours,
                    spec.version(),
                    theirs
                )));
            }
        }
        if spec.version() == self.version {
            let same_members = spec.members().len() == self.nodes.len()
                && spec.members().iter().all(|m| self.nodes.contains_key(&m.instance_id));
            if !same_members {
                return Err(Error::InconsistentCluster(format!(
                    "cluster {} snapshot v{} disagrees with the tracked membership",
                    self.name,
                    spec.version()
                )));
            }
            debug!(cluster = %self.name, version = self.version, "Snapshot already applied");
            return Ok(());
        }

        let removed: Vec<InstanceId> = self
            .nodes
            .keys()
            .filter(|id| !spec.contains(id))
            .cloned()
            .collect();
        for id in removed {
            self.detach_transfers(&id);
            self.nodes.remove(&id);
            info!(cluster = %self.name, node = %id, "Dropped state for removed member");
        }

        for member in spec.members() {
            if !self.nodes.contains_key(&member.instance_id) {
                self.nodes
                    .insert(member.instance_id.clone(), NodeEntry::new());
                debug!(cluster = %self.name, node = %member.instance_id, "Tracking new member");
            }
        }

        if self.founder.is_none() {
            self.founder = spec.founder().map(str::to_string);
        }
        self.established |= spec.is_established();
        self.version = spec.version();
        Ok(())
    }

    pub fn state_of(&self, node: &str) -> Result<NodeState> {
        self.entry(node).map(|e| e.state)
    }

    /// UNCONFIGURED -> BOOTSTRAPPING
    pub fn begin_bootstrap(&mut self, node: &str) -> Result<()> {
        let to = NodeState::Bootstrapping;
        let from = self.expect_state(node, NodeState::Unconfigured, to)?;

        let founder = self.founder.as_deref().ok_or_else(|| Error::NoFounderDefined {
            cluster: self.name.clone(),
        })?;
        if founder != node {
            return Err(self.illegal(node, from, to, "only the founder may bootstrap the cluster"));
        }
        if self.established || self.genesis_started {
            return Err(self.illegal(node, from, to, "cluster genesis already happened"));
        }
        if let Some(other) = self.nodes.iter().find(|(id, e)| {
            id.as_str() != node
                && matches!(e.state, NodeState::Bootstrapping | NodeState::Synced)
        }) {
            let reason = format!("node {} is already {}", other.0, other.1.state);
            return Err(self.illegal(node, from, to, &reason));
        }

        self.genesis_started = true;
        self.set_state(node, to);
        Ok(())
    }

    /// BOOTSTRAPPING -> SYNCED
    pub fn confirm_bootstrap(&mut self, node: &str) -> Result<()> {
        self.expect_state(node, NodeState::Bootstrapping, NodeState::Synced)?;
        self.established = true;
        self.set_state(node, NodeState::Synced);
        Ok(())
    }

    /// UNCONFIGURED -> JOINING, plus SYNCED -> DONOR for a snapshot transfer
    pub fn begin_join(&mut self, node: &str, transfer: StateTransfer) -> Result<Option<InstanceId>> {
        let to = NodeState::Joining;
        let from = self.expect_state(node, NodeState::Unconfigured, to)?;

        let founder = self.founder.as_deref().ok_or_else(|| Error::NoFounderDefined {
            cluster: self.name.clone(),
        })?;
        if founder == node && !self.established {
            return Err(self.illegal(node, from, to, "the founder must bootstrap a new cluster"));
        }
        if !self
            .nodes
            .iter()
            .any(|(id, e)| id.as_str() != node && e.state.is_sync_source())
        {
            return Err(self.illegal(node, from, to, "no synced member to join from"));
        }

        let donor = match transfer {
            StateTransfer::Incremental => None,
            StateTransfer::Snapshot => {
                let candidates: Vec<DonorCandidate<'_>> = self
                    .nodes
                    .iter()
                    .filter(|(id, e)| id.as_str() != node && e.state == NodeState::Synced)
                    .map(|(id, e)| DonorCandidate {
                        id,
                        load_percent: e.load_percent,
                    })
                    .collect();
                let Some(donor) = self.selector.select(&candidates) else {
                    return Err(self.illegal(node, from, to, "every synced member is already a donor"));
                };
                telemetry::record_donor_selection(self.selector.policy().as_str());
                Some(donor)
            }
        };

        if let Some(donor_id) = &donor {
            self.set_state(donor_id, NodeState::Donor);
            if let Some(entry) = self.nodes.get_mut(donor_id) {
                entry.serving = Some(node.to_string());
            }
        }
        self.set_state(node, to);
        if let Some(entry) = self.nodes.get_mut(node) {
            entry.donor = donor.clone();
        }
        Ok(donor)
    }

    /// JOINING -> SYNCED, releasing the joiner's donor
    pub fn complete_join(&mut self, node: &str) -> Result<Option<InstanceId>> {
        self.expect_state(node, NodeState::Joining, NodeState::Synced)?;
        let released = self.release_donor_of(node);
        self.set_state(node, NodeState::Synced);
        Ok(released)
    }

    /// DONOR -> SYNCED
    pub fn complete_donation(&mut self, node: &str) -> Result<()> {
        self.expect_state(node, NodeState::Donor, NodeState::Synced)?;
        self.detach_transfers(node);
        self.set_state(node, NodeState::Synced);
        Ok(())
    }

    /// any -> FAILED
    pub fn mark_failed(&mut self, node: &str, reason: &str) -> Result<()> {
        let from = self.state_of(node)?;
        if from.is_terminal() {
            return Err(self.illegal(node, from, NodeState::Failed, "node has already failed"));
        }
        warn!(cluster = %self.name, node = %node, from = %from, reason = %reason, "Node failed");
        self.detach_transfers(node);
        self.set_state(node, NodeState::Failed);
        if let Some(entry) = self.nodes.get_mut(node) {
            entry.load_percent = None;
        }
        Ok(())
    }

    pub fn report_load(&mut self, node: &str, load_percent: u8) -> Result<()> {
        let cluster = self.name.clone();
        let entry = self.nodes.get_mut(node).ok_or_else(|| Error::UnknownNode {
            cluster,
            node: node.to_string(),
        })?;
        entry.load_percent = Some(load_percent.min(100));
        Ok(())
    }

    /// Break any transfer link `node` takes part in. A donor whose joiner
    /// goes away returns to SYNCED; a joiner whose donor goes away keeps
    /// JOINING until its own agent reports.
    fn detach_transfers(&mut self, node: &str) {
        self.release_donor_of(node);
        let joiner = self.nodes.get_mut(node).and_then(|e| e.serving.take());
        if let Some(joiner) = joiner {
            if let Some(entry) = self.nodes.get_mut(&joiner) {
                if entry.donor.as_deref() == Some(node) {
                    entry.donor = None;
                }
            }
        }
    }

    /// Return the donor serving `joiner` to SYNCED, if it still is one
    fn release_donor_of(&mut self, joiner: &str) -> Option<InstanceId> {
        let donor = self.nodes.get_mut(joiner).and_then(|e| e.donor.take())?;
        let serving_joiner = self
            .nodes
            .get(&donor)
            .map(|e| e.state == NodeState::Donor && e.serving.as_deref() == Some(joiner))
            .unwrap_or(false);
        if !serving_joiner {
            return None;
        }
        if let Some(entry) = self.nodes.get_mut(&donor) {
            entry.serving = None;
        }
        self.set_state(&donor, NodeState::Synced);
        Some(donor)
    }

    fn entry(&self, node: &str) -> Result<&NodeEntry> {
        self.nodes.get(node).ok_or_else(|| Error::UnknownNode {
            cluster: self.name.clone(),
            node: node.to_string(),
        })
    }

    fn expect_state(&self, node: &str, expected: NodeState, to: NodeState) -> Result<NodeState> {
        let current = self.state_of(node)?;
        if current != expected {
            let reason = format!("requires {}", expected);
            return Err(self.illegal(node, current, to, &reason));
        }
        Ok(current)
    }

    fn set_state(&mut self, node: &str, to: NodeState) {
        if let Some(entry) = self.nodes.get_mut(node) {
            let from = entry.state;
            entry.state = to;
            telemetry::record_transition(from.as_str(), to.as_str());
            info!(cluster = %self.name, node = %node, from = %from, to = %to, "Node transition");
        }
    }

    fn illegal(&self, node: &str, from: NodeState, to: NodeState, reason: &str) -> Error {
        Error::IllegalTransition {
            cluster: self.name.clone(),
            node: node.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{Flavor, NodeRef, ReplicationSecret};

    fn spec(ids: &[&str]) -> ClusterSpec {
        let mut spec = ClusterSpec::new("c1", ReplicationSecret::new("s"));
        for (i, id) in ids.iter().enumerate() {
            let ip = format!("10.0.0.{}", i + 1).parse().unwrap();
            spec.add_member(NodeRef::new(*id, ip, Flavor::new(1024))).unwrap();
        }
        spec
    }

    fn founded(ids: &[&str], policy: DonorPolicy) -> ClusterState {
        let mut state = ClusterState::new(&spec(ids), policy);
        state.begin_bootstrap(ids[0]).unwrap();
        state.confirm_bootstrap(ids[0]).unwrap();
        state
    }

    #[test]
    fn test_joiner_cannot_bootstrap() {
        let mut state = ClusterState::new(&spec(&["a", "b"]), DonorPolicy::RoundRobin);
        let err = state.begin_bootstrap("b").unwrap_err();
        assert!(matches!(err, Error::IllegalTransition { .. }));
        assert_eq!(state.state_of("b").unwrap(), NodeState::Unconfigured);
    }

    #[test]
    fn test_join_takes_donor_and_releases_it() {
        let mut state = founded(&["a", "b"], DonorPolicy::RoundRobin);

        let donor = state.begin_join("b", StateTransfer::Snapshot).unwrap();
        assert_eq!(donor.as_deref(), Some("a"));
        assert_eq!(state.state_of("a").unwrap(), NodeState::Donor);
        assert_eq!(state.state_of("b").unwrap(), NodeState::Joining);

        let released = state.complete_join("b").unwrap();
        assert_eq!(released.as_deref(), Some("a"));
        assert_eq!(state.state_of("a").unwrap(), NodeState::Synced);
        assert_eq!(state.state_of("b").unwrap(), NodeState::Synced);
    }

    #[test]
    fn test_busy_donors_block_snapshot_join_atomically() {
        let mut state = founded(&["a", "b", "c"], DonorPolicy::RoundRobin);
        state.begin_join("b", StateTransfer::Snapshot).unwrap();

        let err = state.begin_join("c", StateTransfer::Snapshot).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(state.state_of("c").unwrap(), NodeState::Unconfigured);

        // An incremental transfer needs no dedicated donor
        assert_eq!(state.begin_join("c", StateTransfer::Incremental).unwrap(), None);
        assert_eq!(state.state_of("c").unwrap(), NodeState::Joining);
    }

    #[test]
    fn test_failed_joiner_releases_donor() {
        let mut state = founded(&["a", "b"], DonorPolicy::RoundRobin);
        state.begin_join("b", StateTransfer::Snapshot).unwrap();

        state.mark_failed("b", "sst script exited 1").unwrap();
        assert_eq!(state.state_of("b").unwrap(), NodeState::Failed);
        assert_eq!(state.state_of("a").unwrap(), NodeState::Synced);

        let err = state.mark_failed("b", "again").unwrap_err();
        assert!(matches!(err, Error::IllegalTransition { .. }));
    }

    #[test]
    fn test_failed_donor_leaves_joiner_joining() {
        let mut state = founded(&["a", "b"], DonorPolicy::RoundRobin);
        state.begin_join("b", StateTransfer::Snapshot).unwrap();

        state.mark_failed("a", "disk full").unwrap();
        assert_eq!(state.state_of("b").unwrap(), NodeState::Joining);
        assert_eq!(state.complete_join("b").unwrap(), None);
    }

    #[test]
    fn test_donor_completion_unlinks_joiner() {
        let mut state = founded(&["a", "b"], DonorPolicy::RoundRobin);
        state.begin_join("b", StateTransfer::Snapshot).unwrap();

        state.complete_donation("a").unwrap();
        assert_eq!(state.state_of("a").unwrap(), NodeState::Synced);
        assert_eq!(state.complete_join("b").unwrap(), None);
        assert!(state.complete_donation("a").is_err());
    }

    #[test]
    fn test_stale_snapshot_rejected() {
        let mut spec = spec(&["a", "b"]);
        let mut state = ClusterState::new(&spec, DonorPolicy::RoundRobin);
        let old = spec.clone();
        spec.remove_member("b");
        state.sync(&spec).unwrap();

        let err = state.sync(&old).unwrap_err();
        assert!(matches!(err, Error::StaleSnapshot { current: 3, offered: 2 }));
        assert!(state.state_of("b").is_err());
    }

    #[test]
    fn test_snapshot_with_different_founder_rejected() {
        let mut state = ClusterState::new(&spec(&["a", "b"]), DonorPolicy::RoundRobin);

        // Same members, added in the other order: b is that snapshot's founder
        let mut rival = spec(&["b", "a"]);
        rival.mark_established();
        let err = state.sync(&rival).unwrap_err();
        assert!(matches!(err, Error::InconsistentCluster(_)));
        assert!(!err.is_retryable());

        assert_eq!(state.founder.as_deref(), Some("a"));
        assert_eq!(state.version, 2);
        assert!(!state.established);
        state.begin_bootstrap("a").unwrap();
    }

    #[test]
    fn test_equal_version_snapshot_is_a_no_op() {
        let spec = spec(&["a", "b"]);
        let mut state = founded(&["a", "b"], DonorPolicy::RoundRobin);
        state.begin_join("b", StateTransfer::Incremental).unwrap();

        state.sync(&spec).unwrap();
        assert_eq!(state.version, 2);
        assert_eq!(state.state_of("a").unwrap(), NodeState::Synced);
        assert_eq!(state.state_of("b").unwrap(), NodeState::Joining);
    }

    #[test]
    fn test_divergent_equal_version_snapshot_rejected() {
        let mut state = ClusterState::new(&spec(&["a", "b"]), DonorPolicy::RoundRobin);
        let divergent = spec(&["a", "z"]);
        assert_eq!(divergent.version(), state.version);

        let err = state.sync(&divergent).unwrap_err();
        assert!(matches!(err, Error::InconsistentCluster(_)));
        assert_eq!(state.nodes.keys().collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn test_removed_joiner_frees_donor() {
        let mut spec = spec(&["a", "b"]);
        let mut state = founded(&["a", "b"], DonorPolicy::RoundRobin);
        state.begin_join("b", StateTransfer::Snapshot).unwrap();

        spec.remove_member("b");
        state.sync(&spec).unwrap();
        assert_eq!(state.state_of("a").unwrap(), NodeState::Synced);
    }

    #[test]
    fn test_report_load_unknown_node() {
        let mut state = ClusterState::new(&spec(&["a"]), DonorPolicy::LeastLoaded);
        assert!(matches!(
            state.report_load("zz", 10),
            Err(Error::UnknownNode { .. })
        ));
        state.report_load("a", 250).unwrap();
        assert_eq!(state.nodes["a"].load_percent, Some(100));
    }
}
