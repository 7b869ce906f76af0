//! Declarative cluster intent
//!
//! A [`ClusterSpec`] is the control plane's snapshot of one replicated
//! cluster: who the members are, which member founded it, whether genesis
//! already happened and the secret every member shares. Everything derived
//! from it (sizing, membership strings, config profiles) is a pure function of
//! a snapshot passed by value.

pub mod membership;
pub mod sizing;

pub use membership::{MembershipEncoder, NodeRole};
pub use sizing::SizingPolicy;

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Instance identifier
pub type InstanceId = String;

/// Resource profile of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Flavor {
    /// Memory available to the instance in megabytes
    pub ram_mb: i64,
}

impl Flavor {
    pub fn new(ram_mb: i64) -> Self {
        Self { ram_mb }
    }
}

/// Reference to a node assigned to a cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub instance_id: InstanceId,
    pub ip: IpAddr,
    pub flavor: Flavor,
}

impl NodeRef {
    pub fn new(instance_id: impl Into<InstanceId>, ip: IpAddr, flavor: Flavor) -> Self {
        Self {
            instance_id: instance_id.into(),
            ip,
            flavor,
        }
    }
}

/// Replication credential shared by all members.
///
/// Opaque to this crate. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicationSecret(String);

impl ReplicationSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ReplicationSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReplicationSecret(***)")
    }
}

/// Snapshot of a replicated cluster's membership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Cluster name, unique per cluster
    pub name: String,
    /// Members in the order they were added
    members: Vec<NodeRef>,
    /// Shared replication credential
    pub replication_secret: ReplicationSecret,
    /// Member designated founder when the first node was added.
    /// Kept after that member is removed.
    founder: Option<InstanceId>,
    /// Genesis has completed at least once
    established: bool,
    /// Bumped on every mutation
    version: u64,
}

impl ClusterSpec {
    /// Create an empty cluster with no founder
    pub fn new(name: impl Into<String>, replication_secret: ReplicationSecret) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            replication_secret,
            founder: None,
            established: false,
            version: 0,
        }
    }

    pub fn members(&self) -> &[NodeRef] {
        &self.members
    }

    pub fn founder(&self) -> Option<&str> {
        self.founder.as_deref()
    }

    pub fn is_established(&self) -> bool {
        self.established
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn member(&self, instance_id: &str) -> Option<&NodeRef> {
        self.members.iter().find(|m| m.instance_id == instance_id)
    }

    pub fn contains(&self, instance_id: &str) -> bool {
        self.member(instance_id).is_some()
    }

    /// Decode a snapshot received from upstream and check its invariants.
    pub fn from_json(json: &str) -> Result<Self> {
        let spec: ClusterSpec = serde_json::from_str(json)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Add a member. The first member ever added becomes the founder.
    pub fn add_member(&mut self, node: NodeRef) -> Result<()> {
        check_identifier("instance id", &node.instance_id)?;
        if self.contains(&node.instance_id) {
            return Err(Error::InconsistentCluster(format!(
                "instance {} is already a member of cluster {}",
                node.instance_id, self.name
            )));
        }
        if self.founder.is_none() {
            self.founder = Some(node.instance_id.clone());
        }
        self.members.push(node);
        self.version += 1;
        Ok(())
    }

    /// Remove a member, returning it if present. Founder designation is kept.
    pub fn remove_member(&mut self, instance_id: &str) -> Option<NodeRef> {
        let idx = self
            .members
            .iter()
            .position(|m| m.instance_id == instance_id)?;
        self.version += 1;
        Some(self.members.remove(idx))
    }

    /// Record that the cluster has completed genesis.
    pub fn mark_established(&mut self) {
        if !self.established {
            self.established = true;
            self.version += 1;
        }
    }

    /// Check structural invariants of a snapshot received from upstream.
    pub fn validate(&self) -> Result<()> {
        check_identifier("cluster name", &self.name)?;
        if self.established && self.members.is_empty() {
            return Err(Error::InconsistentCluster(format!(
                "established cluster {} has no members",
                self.name
            )));
        }
        if !self.members.is_empty() && self.founder.is_none() {
            return Err(Error::NoFounderDefined {
                cluster: self.name.clone(),
            });
        }
        if let Some(founder) = &self.founder {
            check_identifier("founder", founder)?;
        }
        for (i, member) in self.members.iter().enumerate() {
            check_identifier("instance id", &member.instance_id)?;
            if self.members[..i]
                .iter()
                .any(|m| m.instance_id == member.instance_id)
            {
                return Err(Error::InconsistentCluster(format!(
                    "instance {} appears twice in cluster {}",
                    member.instance_id, self.name
                )));
            }
        }
        Ok(())
    }
}

/// Names and ids end up verbatim in rendered `key=value` lines, so only
/// `[A-Za-z0-9._-]+` is accepted.
fn check_identifier(kind: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
    if valid {
        Ok(())
    } else {
        Err(Error::InconsistentCluster(format!(
            "{} {:?} must match [A-Za-z0-9._-]+",
            kind, value
        )))
    }
}
