//! Error types for galera-topology

use std::fmt;

/// Result type alias for topology operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for galera-topology
#[derive(Debug)]
pub enum Error {
    /// Flavor cannot be sized (non-positive RAM)
    InvalidFlavor { ram_mb: i64 },
    /// Role queried before any node was designated founder
    NoFounderDefined { cluster: String },
    /// Node and cluster snapshot disagree
    InconsistentCluster(String),
    /// Lifecycle transition rejected by a precondition
    IllegalTransition {
        cluster: String,
        node: String,
        from: String,
        to: String,
        reason: String,
    },
    /// Cluster is not registered with the coordinator
    UnknownCluster(String),
    /// Node is not tracked for the cluster
    UnknownNode { cluster: String, node: String },
    /// Offered cluster snapshot is older than the one already applied
    StaleSnapshot { current: u64, offered: u64 },
    /// Configuration errors
    Config(String),
    /// IO errors
    Io(std::io::Error),
    /// Serialization errors
    Serialization(String),
}

impl Error {
    /// Whether the caller may retry the same request after a backoff.
    ///
    /// Only race-induced rejections qualify. Everything else needs the
    /// input or the cluster data fixed first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::IllegalTransition { .. } | Error::StaleSnapshot { .. }
        )
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidFlavor { ram_mb } => {
                write!(f, "Invalid flavor: ram_mb must be positive, got {}", ram_mb)
            }
            Error::NoFounderDefined { cluster } => {
                write!(f, "No founder defined for cluster {}", cluster)
            }
            Error::InconsistentCluster(msg) => write!(f, "Inconsistent cluster: {}", msg),
            Error::IllegalTransition {
                cluster,
                node,
                from,
                to,
                reason,
            } => write!(
                f,
                "Illegal transition for node {} in cluster {}: {} -> {} ({})",
                node, cluster, from, to, reason
            ),
            Error::UnknownCluster(name) => write!(f, "Unknown cluster: {}", name),
            Error::UnknownNode { cluster, node } => {
                write!(f, "Unknown node {} in cluster {}", node, cluster)
            }
            Error::StaleSnapshot { current, offered } => write!(
                f,
                "Stale cluster snapshot: current version {}, offered {}",
                current, offered
            ),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_races_are_retryable() {
        let race = Error::IllegalTransition {
            cluster: "c1".to_string(),
            node: "a".to_string(),
            from: "UNCONFIGURED".to_string(),
            to: "BOOTSTRAPPING".to_string(),
            reason: "another node is bootstrapping".to_string(),
        };
        assert!(race.is_retryable());
        assert!(Error::StaleSnapshot { current: 3, offered: 2 }.is_retryable());
        assert!(!Error::InvalidFlavor { ram_mb: 0 }.is_retryable());
        assert!(!Error::NoFounderDefined {
            cluster: "c1".to_string()
        }
        .is_retryable());
        assert!(!Error::InconsistentCluster("x".to_string()).is_retryable());
    }

    #[test]
    fn test_display_names_transition() {
        let err = Error::IllegalTransition {
            cluster: "c1".to_string(),
            node: "b".to_string(),
            from: "UNCONFIGURED".to_string(),
            to: "JOINING".to_string(),
            reason: "no synced member".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("UNCONFIGURED -> JOINING"));
        assert!(msg.contains("no synced member"));
    }
}
