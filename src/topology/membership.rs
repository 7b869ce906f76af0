//! Membership encoding and founder/joiner roles

use super::{ClusterSpec, NodeRef};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Bootstrap role of a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    /// Originates the cluster
    Founder,
    /// Joins an existing cluster from a donor
    Joiner,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Founder => "founder",
            NodeRole::Joiner => "joiner",
        }
    }
}

/// Converts cluster membership into the replication transport's form
pub struct MembershipEncoder;

impl MembershipEncoder {
    /// Comma-separated member addresses ordered by instance id.
    ///
    /// IPv6 addresses are bracketed so the transport can tell them apart
    /// from a port suffix.
    pub fn encode_address(members: &[NodeRef]) -> String {
        let mut ordered: Vec<&NodeRef> = members.iter().collect();
        ordered.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        ordered
            .iter()
            .map(|m| Self::format_ip(&m.ip))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Founder if `node` is the recorded founder, joiner for any other member
    pub fn decide_role(cluster: &ClusterSpec, node: &NodeRef) -> Result<NodeRole> {
        let founder = cluster.founder().ok_or_else(|| Error::NoFounderDefined {
            cluster: cluster.name.clone(),
        })?;
        if !cluster.contains(&node.instance_id) {
            return Err(Error::InconsistentCluster(format!(
                "instance {} is not a member of cluster {}",
                node.instance_id, cluster.name
            )));
        }
        if node.instance_id == founder {
            Ok(NodeRole::Founder)
        } else {
            Ok(NodeRole::Joiner)
        }
    }

    fn format_ip(ip: &IpAddr) -> String {
        match ip {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{}]", v6),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{Flavor, ReplicationSecret};

    fn node(id: &str, ip: &str) -> NodeRef {
        NodeRef::new(id, ip.parse().unwrap(), Flavor::new(512))
    }

    #[test]
    fn test_encode_orders_by_instance_id() {
        let members = vec![
            node("c", "10.0.0.3"),
            node("a", "10.0.0.1"),
            node("b", "10.0.0.2"),
        ];
        assert_eq!(
            MembershipEncoder::encode_address(&members),
            "10.0.0.1,10.0.0.2,10.0.0.3"
        );
    }

    #[test]
    fn test_encode_is_permutation_independent() {
        let a = node("a", "10.0.0.1");
        let b = node("b", "10.0.0.2");
        let c = node("c", "fd00::3");
        let expected = MembershipEncoder::encode_address(&[a.clone(), b.clone(), c.clone()]);
        let perms = [
            vec![a.clone(), c.clone(), b.clone()],
            vec![b.clone(), a.clone(), c.clone()],
            vec![b.clone(), c.clone(), a.clone()],
            vec![c.clone(), a.clone(), b.clone()],
            vec![c, b, a],
        ];
        for perm in perms {
            assert_eq!(MembershipEncoder::encode_address(&perm), expected);
        }
        assert_eq!(expected, "10.0.0.1,10.0.0.2,[fd00::3]");
    }

    #[test]
    fn test_encode_empty() {
        assert_eq!(MembershipEncoder::encode_address(&[]), "");
    }

    #[test]
    fn test_roles() {
        let mut spec = ClusterSpec::new("c1", ReplicationSecret::new("s"));
        let a = node("a", "10.0.0.1");
        let b = node("b", "10.0.0.2");

        let err = MembershipEncoder::decide_role(&spec, &a).unwrap_err();
        assert!(matches!(err, Error::NoFounderDefined { .. }));

        spec.add_member(a.clone()).unwrap();
        spec.add_member(b.clone()).unwrap();
        assert_eq!(
            MembershipEncoder::decide_role(&spec, &a).unwrap(),
            NodeRole::Founder
        );
        assert_eq!(
            MembershipEncoder::decide_role(&spec, &b).unwrap(),
            NodeRole::Joiner
        );

        let stranger = node("z", "10.0.0.26");
        assert!(matches!(
            MembershipEncoder::decide_role(&spec, &stranger),
            Err(Error::InconsistentCluster(_))
        ));
    }

    #[test]
    fn test_later_members_are_joiners_after_founder_removed() {
        let mut spec = ClusterSpec::new("c1", ReplicationSecret::new("s"));
        spec.add_member(node("a", "10.0.0.1")).unwrap();
        spec.add_member(node("b", "10.0.0.2")).unwrap();
        spec.remove_member("a");
        let d = node("0-first-by-order", "10.0.0.4");
        spec.add_member(d.clone()).unwrap();

        assert_eq!(
            MembershipEncoder::decide_role(&spec, &d).unwrap(),
            NodeRole::Joiner
        );
    }
}
