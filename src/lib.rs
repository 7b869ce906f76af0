//! # galera-topology
//!
//! Cluster topology configuration synthesis for synchronous multi-master
//! (Galera-style) database clusters.
//!
//! Given a cluster's membership, each node's flavor and a shared replication
//! secret, this crate computes the exact engine configuration every node
//! needs to either found a new cluster or join an existing one, and sequences
//! node start-up so that exactly one node ever founds the cluster.
//!
//! ## Components
//!
//! - **Topology**: the [`ClusterSpec`](topology::ClusterSpec) snapshot,
//!   gcache [`SizingPolicy`](topology::SizingPolicy) and the
//!   [`MembershipEncoder`](topology::MembershipEncoder)
//! - **Profile**: [`ConfigProfileBuilder`](profile::ConfigProfileBuilder) and
//!   the wsrep option-file renderer
//! - **Coordinator**: [`BootstrapCoordinator`](coordinator::BootstrapCoordinator),
//!   the per-cluster lifecycle state machine with donor selection
//!
//! Sizing, encoding, profile building and rendering are pure and need no
//! synchronization. Only the coordinator holds shared state.

pub mod config;
pub mod coordinator;
pub mod profile;
pub mod telemetry;
pub mod topology;

mod error;

pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::config::TopologyConfig;
    pub use crate::coordinator::{
        BootstrapCoordinator, ClusterStatus, DonorPolicy, JoinPlan, NodeState, StateTransfer,
    };
    pub use crate::profile::{
        read_rendered, write_rendered, ConfigProfile, ConfigProfileBuilder, SstMethod, TemplateRenderer,
        WsrepTemplate,
    };
    pub use crate::topology::{
        ClusterSpec, Flavor, InstanceId, MembershipEncoder, NodeRef, NodeRole, ReplicationSecret,
        SizingPolicy,
    };
    pub use crate::{Error, Result};
}
