//! Node lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a node as tracked by the coordinator
///
/// ```text
/// UNCONFIGURED -> BOOTSTRAPPING -> SYNCED
/// UNCONFIGURED -> JOINING -> SYNCED <-> DONOR
/// any -> FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeState {
    Unconfigured,
    Bootstrapping,
    Joining,
    Synced,
    Donor,
    Failed,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Unconfigured => "UNCONFIGURED",
            NodeState::Bootstrapping => "BOOTSTRAPPING",
            NodeState::Joining => "JOINING",
            NodeState::Synced => "SYNCED",
            NodeState::Donor => "DONOR",
            NodeState::Failed => "FAILED",
        }
    }

    /// A joiner can pull state from a node in this state
    pub fn is_sync_source(&self) -> bool {
        matches!(self, NodeState::Synced | NodeState::Donor)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Failed)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
