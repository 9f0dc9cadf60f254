//! Pure acceptor state machine - no I/O, no async, no synchronization.
//!
//! This module contains the per-node state transitions behind the three
//! peer RPCs. The runtime wraps one [`AcceptorState`] and one
//! [`DecisionLog`] in a single lock and calls into here.

use super::log::DecisionLog;
use super::proposal::{NodeId, Proposal, ProposalNumber, SlotId};
use crate::messages::{AcceptReply, PrepareReply};

/// Per-node acceptor state.
///
/// `highest_seen` is global, not per-slot, and only ever increases: it is
/// what makes a stale-numbered prepare from an earlier round lose.
/// `accepted` is scoped to the one slot currently being driven to consensus
/// and is cleared whenever a decide arrives.
#[derive(Clone, Debug)]
pub struct AcceptorState<V> {
    highest_seen: ProposalNumber,
    accepted: Option<Proposal<V>>,
}

impl<V: Clone> AcceptorState<V> {
    /// Initial state for `node`: round 0, nothing accepted.
    #[must_use]
    pub fn new(node: NodeId) -> Self {
        Self {
            highest_seen: ProposalNumber::new(0, node),
            accepted: None,
        }
    }

    /// Issue the next proposal number for `node` and record it as seen.
    ///
    /// A proposer observes its own proposal immediately, so from this point
    /// on a concurrent lower-numbered prepare from a peer is rejected.
    pub fn next_number(&mut self, node: NodeId) -> ProposalNumber {
        let number = ProposalNumber::new(self.highest_seen.round + 1, node);
        self.highest_seen = number;
        number
    }

    /// Handle a phase 1 prepare - pure state transition.
    ///
    /// An already decided slot short-circuits to [`PrepareReply::Decided`] so
    /// the proposer can absorb the value and move to a fresh slot. Otherwise
    /// the prepare is promised unless a strictly higher number has been
    /// seen; the reply carries the currently accepted proposal (if any) so
    /// the proposer pushes that forward instead of its own value.
    pub fn receive_prepare(
        &mut self,
        log: &DecisionLog<V>,
        number: ProposalNumber,
        slot: SlotId,
    ) -> PrepareReply<V> {
        if let Some(value) = log.get(slot) {
            return PrepareReply::Decided {
                slot,
                value: value.clone(),
            };
        }
        if number < self.highest_seen {
            return PrepareReply::Rejected;
        }
        self.highest_seen = number;
        PrepareReply::Promised {
            accepted: self.accepted.clone(),
        }
    }

    /// The proposal this acceptor currently holds as accepted, if any.
    #[must_use]
    pub fn accepted(&self) -> Option<&Proposal<V>> {
        self.accepted.as_ref()
    }

    /// Handle a phase 2 accept - pure state transition.
    ///
    /// Rejected when the number is below this acceptor's promise (a promise
    /// is a commitment to ignore lower-numbered proposals, which is what
    /// makes any two quorums agree) or when the slot was decided in the
    /// meantime. On success the proposal is recorded and `highest_seen`
    /// rises to its number.
    pub fn receive_accept(&mut self, log: &DecisionLog<V>, proposal: Proposal<V>) -> AcceptReply {
        if proposal.number < self.highest_seen || log.get(proposal.slot).is_some() {
            return AcceptReply::Rejected;
        }
        self.highest_seen = proposal.number;
        self.accepted = Some(proposal);
        AcceptReply::Accepted
    }

    /// Handle a decide - infallible.
    ///
    /// Clears the accepted proposal (this node's participation in the round
    /// is over) and records the decided value. Returns `true` when the slot
    /// was newly filled, `false` for a duplicate decide.
    pub fn receive_decide(&mut self, log: &mut DecisionLog<V>, proposal: Proposal<V>) -> bool {
        self.accepted = None;
        log.add(proposal.slot, proposal.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(round: u32, node: NodeId) -> ProposalNumber {
        ProposalNumber::new(round, node)
    }

    fn proposal(round: u32, node: NodeId, slot: SlotId, value: &str) -> Proposal<String> {
        Proposal {
            number: number(round, node),
            slot,
            value: value.to_string(),
        }
    }

    #[test]
    fn test_prepare_empty_promises() {
        let mut acceptor: AcceptorState<String> = AcceptorState::new(0);
        let log = DecisionLog::new();
        let result = acceptor.receive_prepare(&log, number(1, 1), 0);
        assert!(matches!(result, PrepareReply::Promised { accepted: None }));
    }

    #[test]
    fn test_prepare_stale_number_rejected() {
        let mut acceptor: AcceptorState<String> = AcceptorState::new(0);
        let log = DecisionLog::new();
        acceptor.receive_prepare(&log, number(2, 1), 0);
        let result = acceptor.receive_prepare(&log, number(1, 2), 0);
        assert!(matches!(result, PrepareReply::Rejected));
    }

    #[test]
    fn test_prepare_equal_number_promised() {
        // A re-sent prepare with the same number is not stale.
        let mut acceptor: AcceptorState<String> = AcceptorState::new(0);
        let log = DecisionLog::new();
        acceptor.receive_prepare(&log, number(1, 1), 0);
        let result = acceptor.receive_prepare(&log, number(1, 1), 0);
        assert!(matches!(result, PrepareReply::Promised { .. }));
    }

    #[test]
    fn test_prepare_decided_slot_short_circuits() {
        let mut acceptor = AcceptorState::new(0);
        let mut log = DecisionLog::new();
        log.add(0, "won".to_string());
        // Even a higher number cannot contest a decided slot.
        let result = acceptor.receive_prepare(&log, number(9, 1), 0);
        assert!(matches!(
            result,
            PrepareReply::Decided { slot: 0, ref value } if value == "won"
        ));
    }

    #[test]
    fn test_prepare_reveals_accepted_proposal() {
        let mut acceptor = AcceptorState::new(0);
        let log = DecisionLog::new();
        acceptor.receive_accept(&log, proposal(1, 1, 0, "first"));
        let result = acceptor.receive_prepare(&log, number(2, 2), 0);
        match result {
            PrepareReply::Promised { accepted: Some(p) } => {
                assert_eq!(p.number, number(1, 1));
                assert_eq!(p.value, "first");
            }
            other => panic!("expected promise with accepted proposal, got {other:?}"),
        }
    }

    #[test]
    fn test_accept_records_and_raises_highest_seen() {
        let mut acceptor = AcceptorState::new(0);
        let log = DecisionLog::new();
        let result = acceptor.receive_accept(&log, proposal(3, 1, 0, "v"));
        assert_eq!(result, AcceptReply::Accepted);
        // A prepare below the accepted number is now stale.
        let result = acceptor.receive_prepare(&log, number(2, 2), 0);
        assert!(matches!(result, PrepareReply::Rejected));
    }

    #[test]
    fn test_accept_below_bare_promise_rejected() {
        // A promise alone, with nothing accepted yet, already blocks
        // lower-numbered accepts; two overlapping quorums rely on this.
        let mut acceptor: AcceptorState<String> = AcceptorState::new(0);
        let log = DecisionLog::new();
        acceptor.receive_prepare(&log, number(5, 1), 0);
        let result = acceptor.receive_accept(&log, proposal(3, 2, 0, "late"));
        assert_eq!(result, AcceptReply::Rejected);
        assert!(acceptor.accepted().is_none());
    }

    #[test]
    fn test_accept_below_accepted_rejected() {
        let mut acceptor = AcceptorState::new(0);
        let log = DecisionLog::new();
        acceptor.receive_accept(&log, proposal(3, 1, 0, "high"));
        let result = acceptor.receive_accept(&log, proposal(2, 2, 0, "low"));
        assert_eq!(result, AcceptReply::Rejected);
        // The original acceptance is still what a prepare reveals.
        let reveal = acceptor.receive_prepare(&log, number(9, 2), 0);
        assert!(matches!(
            reveal,
            PrepareReply::Promised { accepted: Some(p) } if p.value == "high"
        ));
    }

    #[test]
    fn test_accept_decided_slot_rejected() {
        let mut acceptor = AcceptorState::new(0);
        let mut log = DecisionLog::new();
        log.add(0, "done".to_string());
        let result = acceptor.receive_accept(&log, proposal(5, 1, 0, "late"));
        assert_eq!(result, AcceptReply::Rejected);
    }

    #[test]
    fn test_decide_clears_accepted() {
        let mut acceptor = AcceptorState::new(0);
        let mut log = DecisionLog::new();
        acceptor.receive_accept(&log, proposal(1, 1, 0, "v"));
        assert!(acceptor.receive_decide(&mut log, proposal(1, 1, 0, "v")));
        assert_eq!(log.get(0), Some(&"v".to_string()));
        // Nothing accepted is revealed for the next slot.
        let result = acceptor.receive_prepare(&log, number(2, 2), 1);
        assert!(matches!(result, PrepareReply::Promised { accepted: None }));
    }

    #[test]
    fn test_duplicate_decide_is_noop() {
        let mut acceptor = AcceptorState::new(0);
        let mut log = DecisionLog::new();
        assert!(acceptor.receive_decide(&mut log, proposal(1, 1, 0, "first")));
        assert!(!acceptor.receive_decide(&mut log, proposal(2, 2, 0, "second")));
        assert_eq!(log.get(0), Some(&"first".to_string()));
    }

    #[test]
    fn test_next_number_bumps_round_and_is_observed() {
        let mut acceptor: AcceptorState<String> = AcceptorState::new(7);
        let log = DecisionLog::new();
        let first = acceptor.next_number(7);
        assert_eq!(first, number(1, 7));
        // Our own number is seen immediately; an equal-round peer with a
        // lower id is stale.
        let result = acceptor.receive_prepare(&log, number(1, 3), 0);
        assert!(matches!(result, PrepareReply::Rejected));
        let second = acceptor.next_number(7);
        assert_eq!(second, number(2, 7));
    }
}
