//! Proposal identifiers and the value-carrying unit of agreement.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Identifies one node in the fixed peer set.
pub type NodeId = u32;

/// A position in the replicated decision log.
pub type SlotId = u32;

/// A totally ordered proposal identifier.
///
/// Ordering compares `round` first and breaks ties by `node`, so two
/// concurrent proposers can never produce equal numbers for distinct
/// proposals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProposalNumber {
    /// Monotonically increasing round counter.
    pub round: u32,
    /// Tie-breaking id of the issuing node.
    pub node: NodeId,
}

impl ProposalNumber {
    /// Create the proposal number for `round` issued by `node`.
    #[must_use]
    pub fn new(round: u32, node: NodeId) -> Self {
        Self { round, node }
    }
}

impl fmt::Display for ProposalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.round, self.node)
    }
}

/// A candidate value for one specific log slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal<V> {
    /// The number under which this proposal competes.
    pub number: ProposalNumber,
    /// The slot this proposal wants to fill.
    pub slot: SlotId,
    /// The application-opaque batch of commands.
    pub value: V,
}

/// Bounds required of a replicated command batch.
///
/// Blanket-implemented; application value types only need to satisfy the
/// listed traits.
pub trait Value:
    Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

impl<T> Value for T where
    T: Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_compares_round_first() {
        assert!(ProposalNumber::new(2, 0) > ProposalNumber::new(1, 9));
        assert!(ProposalNumber::new(5, 1) < ProposalNumber::new(6, 0));
    }

    #[test]
    fn test_order_breaks_ties_by_node() {
        assert!(ProposalNumber::new(3, 2) > ProposalNumber::new(3, 1));
        assert_eq!(ProposalNumber::new(3, 2), ProposalNumber::new(3, 2));
    }

    #[test]
    fn test_display() {
        assert_eq!(ProposalNumber::new(12, 3).to_string(), "12.3");
    }
}
