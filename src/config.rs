//! Engine configuration and startup validation.

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::time::Duration;

use rand::Rng;

use crate::core::NodeId;

/// One member of the fixed, statically known peer set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    /// Cluster-unique identifier.
    pub id: NodeId,
    /// Dial address in `host:port` form.
    pub addr: String,
}

impl Node {
    /// Create a membership entry.
    #[must_use]
    pub fn new(id: NodeId, addr: impl Into<String>) -> Self {
        Self {
            id,
            addr: addr.into(),
        }
    }
}

/// Exponential backoff with jitter between proposal attempts.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Base delay for the first retry.
    pub initial: Duration,
    /// Ceiling the exponential curve is clamped to.
    pub max: Duration,
    /// Growth factor per consecutive quorum shortfall.
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(25),
            max: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Backoff for the given consecutive-shortfall count, jittered.
    #[must_use]
    pub fn duration(&self, retries: u32, rng: &mut impl Rng) -> Duration {
        let base = self.initial.as_secs_f64() * self.multiplier.powi(retries.cast_signed());
        let capped = base.min(self.max.as_secs_f64());
        // Jitter is uniform in 0.5x to 1.5x of the capped base.
        let jitter_factor = rng.random_range(0.5..1.5);
        Duration::from_secs_f64(capped * jitter_factor)
    }
}

/// Everything a node needs to participate in a cluster.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// This node's id; must appear in `members`.
    pub node_id: NodeId,
    /// Local listen address, e.g. `0.0.0.0:9090`.
    pub listen_addr: String,
    /// The full cluster membership, this node included.
    pub members: Vec<Node>,
    /// Per-RPC timeout; an elapsed call counts as a non-vote.
    pub rpc_timeout: Duration,
    /// Backoff between proposal attempts that fall short of a quorum.
    pub backoff: BackoffConfig,
    /// Seed for the backoff RNG; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl EngineConfig {
    /// Configuration with default timeouts and backoff.
    #[must_use]
    pub fn new(node_id: NodeId, listen_addr: impl Into<String>, members: Vec<Node>) -> Self {
        Self {
            node_id,
            listen_addr: listen_addr.into(),
            members,
            rpc_timeout: Duration::from_millis(500),
            backoff: BackoffConfig::default(),
            seed: None,
        }
    }

    /// The smallest node count whose any-two overlap guarantees safety.
    #[must_use]
    pub fn majority(&self) -> usize {
        self.members.len() / 2 + 1
    }

    /// Check the configuration for startup-fatal mistakes.
    ///
    /// # Errors
    ///
    /// Returns the first of: empty membership, this node missing from the
    /// membership, a duplicated node id, or an address that is not
    /// `host:port` shaped.
    pub fn validate(&self) -> Result<(), StartError> {
        if self.members.is_empty() {
            return Err(StartError::EmptyCluster);
        }
        if !self.members.iter().any(|node| node.id == self.node_id) {
            return Err(StartError::UnknownLocalNode {
                node_id: self.node_id,
            });
        }
        let mut seen = BTreeSet::new();
        for node in &self.members {
            if !seen.insert(node.id) {
                return Err(StartError::DuplicateNode { node_id: node.id });
            }
            let well_formed = node
                .addr
                .rsplit_once(':')
                .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
            if !well_formed {
                return Err(StartError::BadAddress {
                    node_id: node.id,
                    addr: node.addr.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Startup-fatal configuration or bind failure.
///
/// Everything after startup is handled internally by retry; this is the only
/// error the engine ever surfaces to the caller.
#[derive(Debug)]
pub enum StartError {
    /// The membership list is empty.
    EmptyCluster,
    /// The local node id does not appear in the membership list.
    UnknownLocalNode { node_id: NodeId },
    /// Two membership entries share an id.
    DuplicateNode { node_id: NodeId },
    /// An address is not `host:port` shaped.
    BadAddress { node_id: NodeId, addr: String },
    /// Binding the listen address failed.
    Bind(io::Error),
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartError::EmptyCluster => write!(f, "cluster membership is empty"),
            StartError::UnknownLocalNode { node_id } => {
                write!(f, "node {node_id} is not in the membership list")
            }
            StartError::DuplicateNode { node_id } => {
                write!(f, "node {node_id} appears twice in the membership list")
            }
            StartError::BadAddress { node_id, addr } => {
                write!(f, "node {node_id} has a malformed address: {addr:?}")
            }
            StartError::Bind(e) => write!(f, "failed to bind listen address: {e}"),
        }
    }
}

impl std::error::Error for StartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StartError::Bind(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StartError {
    fn from(e: io::Error) -> Self {
        StartError::Bind(e)
    }
}
