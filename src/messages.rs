//! Wire messages exchanged between peer consensus engines.
//!
//! Every connection carries one [`PeerReply`] per [`PeerRequest`], in order.

use serde::{Deserialize, Serialize};

use crate::core::{NodeId, Proposal, ProposalNumber, SlotId};

/// A request from one node's proposer driver to a peer's acceptor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PeerRequest<V> {
    /// Phase 1: ask for a promise on `number`. The slot under contention is
    /// included so the acceptor can reveal it as already decided instead.
    Prepare {
        from: NodeId,
        number: ProposalNumber,
        slot: SlotId,
    },
    /// Phase 2: ask the acceptor to record this proposal.
    Accept { proposal: Proposal<V> },
    /// A majority accepted; the decision is safe to apply.
    Decide { proposal: Proposal<V> },
}

/// Which peer RPC a request corresponds to.
///
/// Used by the fault-injection hook to target one protocol phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RpcKind {
    Prepare,
    Accept,
    Decide,
}

impl<V> PeerRequest<V> {
    /// The RPC kind of this request.
    #[must_use]
    pub fn kind(&self) -> RpcKind {
        match self {
            PeerRequest::Prepare { .. } => RpcKind::Prepare,
            PeerRequest::Accept { .. } => RpcKind::Accept,
            PeerRequest::Decide { .. } => RpcKind::Decide,
        }
    }
}

/// The reply to a [`PeerRequest`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PeerReply<V> {
    Prepare(PrepareReply<V>),
    Accept(AcceptReply),
    /// Decide has no failure path; the reply is a bare acknowledgement.
    Decide,
}

/// An acceptor's answer to a phase 1 prepare.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrepareReply<V> {
    /// Promise granted. Carries the acceptor's currently accepted proposal,
    /// which the proposer must push forward instead of its own value.
    Promised { accepted: Option<Proposal<V>> },
    /// A higher-numbered proposal was already seen.
    Rejected,
    /// The hinted slot is already decided; here is its value.
    Decided { slot: SlotId, value: V },
}

/// An acceptor's answer to a phase 2 accept.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceptReply {
    Accepted,
    Rejected,
}
