//! Per-node engine configuration profiles
//!
//! [`ConfigProfileBuilder::build`] composes sizing, membership and cluster
//! identity into an immutable [`ConfigProfile`]. It is pure: the same
//! [`ClusterSpec`] snapshot and node always produce an equal profile, which
//! in turn renders to identical bytes.

pub mod render;

pub use render::{parse_rendered, read_rendered, write_rendered, TemplateRenderer, WsrepTemplate};

use crate::topology::{ClusterSpec, MembershipEncoder, NodeRef, NodeRole, ReplicationSecret, SizingPolicy};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// State snapshot transfer method used by joiners
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SstMethod {
    Rsync,
    Mysqldump,
    #[default]
    XtrabackupV2,
    Mariabackup,
}

impl SstMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rsync => "rsync",
            Self::Mysqldump => "mysqldump",
            Self::XtrabackupV2 => "xtrabackup-v2",
            Self::Mariabackup => "mariabackup",
        }
    }
}

impl std::str::FromStr for SstMethod {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rsync" => Ok(Self::Rsync),
            "mysqldump" => Ok(Self::Mysqldump),
            "xtrabackup-v2" | "xtrabackup" => Ok(Self::XtrabackupV2),
            "mariabackup" => Ok(Self::Mariabackup),
            other => Err(format!(
                "unknown sst method '{}'; expected one of rsync, mysqldump, xtrabackup-v2, mariabackup",
                other
            )),
        }
    }
}

/// Everything the engine needs to start one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigProfile {
    /// gcache size in megabytes
    pub cache_size_mb: u64,
    pub sst_method: SstMethod,
    /// Encoded peer list; empty when founding a new cluster
    pub membership_address: String,
    pub cluster_name: String,
    pub node_name: String,
    pub node_address: String,
    pub auth_secret: ReplicationSecret,
}

impl ConfigProfile {
    /// Whether this profile makes the engine create a new cluster
    pub fn is_genesis(&self) -> bool {
        self.membership_address.is_empty()
    }
}

/// Builds [`ConfigProfile`]s from cluster snapshots
#[derive(Debug, Clone, Default)]
pub struct ConfigProfileBuilder {
    sizing: SizingPolicy,
    sst_method: SstMethod,
}

impl ConfigProfileBuilder {
    pub fn new(sizing: SizingPolicy, sst_method: SstMethod) -> Self {
        Self { sizing, sst_method }
    }

    pub fn sizing(&self) -> &SizingPolicy {
        &self.sizing
    }

    pub fn sst_method(&self) -> SstMethod {
        self.sst_method
    }

    /// Build the profile for `node` as a member of `cluster`
    pub fn build(&self, cluster: &ClusterSpec, node: &NodeRef) -> Result<ConfigProfile> {
        cluster.validate()?;
        match cluster.member(&node.instance_id) {
            Some(member) if member == node => {}
            Some(_) => {
                return Err(Error::InconsistentCluster(format!(
                    "instance {} differs from its membership record in cluster {}",
                    node.instance_id, cluster.name
                )));
            }
            None => {
                return Err(Error::InconsistentCluster(format!(
                    "instance {} is not a member of cluster {}",
                    node.instance_id, cluster.name
                )));
            }
        }

        let role = MembershipEncoder::decide_role(cluster, node)?;
        let cache_size_mb = self.sizing.compute_cache_size(&node.flavor)?;

        let membership_address = if role == NodeRole::Founder && !cluster.is_established() {
            String::new()
        } else {
            MembershipEncoder::encode_address(cluster.members())
        };

        debug!(
            cluster = %cluster.name,
            node = %node.instance_id,
            role = role.as_str(),
            cache_size_mb,
            version = cluster.version(),
            "Built config profile"
        );

        Ok(ConfigProfile {
            cache_size_mb,
            sst_method: self.sst_method,
            membership_address,
            cluster_name: cluster.name.clone(),
            node_name: node.instance_id.clone(),
            node_address: node.ip.to_string(),
            auth_secret: cluster.replication_secret.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Flavor;

    fn node(id: &str, ip: &str, ram: i64) -> NodeRef {
        NodeRef::new(id, ip.parse().unwrap(), Flavor::new(ram))
    }

    fn three_node_cluster() -> ClusterSpec {
        let mut spec = ClusterSpec::new("prod-db", ReplicationSecret::new("repl:pa55"));
        spec.add_member(node("a", "10.0.0.1", 512)).unwrap();
        spec.add_member(node("b", "10.0.0.2", 1024)).unwrap();
        spec.add_member(node("c", "10.0.0.3", 2048)).unwrap();
        spec
    }

    #[test]
    fn test_founder_first_start_uses_empty_membership() {
        let spec = three_node_cluster();
        let builder = ConfigProfileBuilder::default();
        let profile = builder.build(&spec, &spec.members()[0]).unwrap();

        assert!(profile.is_genesis());
        assert_eq!(profile.cache_size_mb, 128);
        assert_eq!(profile.cluster_name, "prod-db");
        assert_eq!(profile.node_name, "a");
        assert_eq!(profile.node_address, "10.0.0.1");
        assert_eq!(profile.sst_method, SstMethod::XtrabackupV2);
    }

    #[test]
    fn test_founder_restart_and_joiners_use_full_membership() {
        let mut spec = three_node_cluster();
        let builder = ConfigProfileBuilder::default();

        let b = builder.build(&spec, &spec.members()[1]).unwrap();
        let c = builder.build(&spec, &spec.members()[2]).unwrap();
        assert_eq!(b.membership_address, "10.0.0.1,10.0.0.2,10.0.0.3");
        assert_eq!(c.membership_address, "10.0.0.1,10.0.0.2,10.0.0.3");
        assert_eq!(b.cache_size_mb, 256);

        spec.mark_established();
        let a = builder.build(&spec, &spec.members()[0]).unwrap();
        assert_eq!(a.membership_address, "10.0.0.1,10.0.0.2,10.0.0.3");
        assert!(!a.is_genesis());
    }

    #[test]
    fn test_cluster_name_cannot_inject_config_lines() {
        let mut spec = three_node_cluster();
        spec.name = "prod\nwsrep_on=OFF".to_string();
        let err = ConfigProfileBuilder::default()
            .build(&spec, &spec.members()[1])
            .unwrap_err();
        assert!(matches!(err, Error::InconsistentCluster(_)));
    }

    #[test]
    fn test_build_is_deterministic() {
        let spec = three_node_cluster();
        let builder = ConfigProfileBuilder::default();
        let first = builder.build(&spec, &spec.members()[1]).unwrap();
        let second = builder.build(&spec.clone(), &spec.members()[1].clone()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_non_member_rejected() {
        let spec = three_node_cluster();
        let builder = ConfigProfileBuilder::default();

        let stranger = node("z", "10.0.0.26", 512);
        assert!(matches!(
            builder.build(&spec, &stranger),
            Err(Error::InconsistentCluster(_))
        ));

        let impostor = node("b", "10.9.9.9", 1024);
        assert!(matches!(
            builder.build(&spec, &impostor),
            Err(Error::InconsistentCluster(_))
        ));
    }

    #[test]
    fn test_invalid_flavor_surfaces() {
        let mut spec = ClusterSpec::new("c1", ReplicationSecret::new("s"));
        let broken = node("a", "10.0.0.1", 0);
        spec.add_member(broken.clone()).unwrap();
        let err = ConfigProfileBuilder::default()
            .build(&spec, &broken)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFlavor { ram_mb: 0 }));
    }

    #[test]
    fn test_sst_method_parsing() {
        assert_eq!("RSYNC".parse::<SstMethod>().unwrap(), SstMethod::Rsync);
        assert_eq!(
            "xtrabackup".parse::<SstMethod>().unwrap(),
            SstMethod::XtrabackupV2
        );
        assert_eq!(
            " mariabackup ".parse::<SstMethod>().unwrap(),
            SstMethod::Mariabackup
        );
        assert!("clone".parse::<SstMethod>().is_err());
    }
}
