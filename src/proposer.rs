//! The proposal driver and its round controller.
//!
//! Submissions queue on an unbounded channel and the controller consumes
//! them one at a time, so a node never runs competing proposals against
//! itself. Each submission is driven through repeated prepare/accept rounds
//! until this node's own proposal number wins a slot; adopted peer values
//! decided along the way do not satisfy the submission.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use rand::rngs::StdRng;
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace};

use crate::core::{Proposal, Value};
use crate::engine::Inner;
use crate::messages::{AcceptReply, PrepareReply};
use crate::transport::Transport;

/// Outcome of one numbered prepare/accept attempt.
enum AttemptOutcome {
    /// This node's own proposal was decided; the submission is complete.
    DecidedOwn,
    /// An adopted peer proposal was decided instead; the submitted value
    /// still needs a slot.
    DecidedOther,
    /// A peer revealed the target slot as already decided.
    SlotTaken,
    /// Fewer than a majority of promises.
    PrepareShortfall,
    /// Fewer than a majority of accepts.
    AcceptShortfall,
}

/// Consume queued submissions, driving one at a time to a decision.
pub(crate) async fn run_controller<V: Value, T: Transport>(
    inner: Arc<Inner<V, T>>,
    mut submissions: mpsc::UnboundedReceiver<V>,
    mut rng: StdRng,
) {
    while let Some(value) = submissions.recv().await {
        inner.in_flight.store(true, Ordering::SeqCst);
        drive(&inner, value, &mut rng).await;
        inner.in_flight.store(false, Ordering::SeqCst);
    }
    debug!("submission channel closed, controller stopping");
}

/// Drive one submitted value until this node decides it.
#[instrument(skip_all, name = "proposer", fields(node = inner.id))]
async fn drive<V: Value, T: Transport>(inner: &Inner<V, T>, value: V, rng: &mut StdRng) {
    let mut shortfalls = 0u32;
    loop {
        match run_attempt(inner, &value).await {
            AttemptOutcome::DecidedOwn => {
                debug!("own value decided");
                return;
            }
            AttemptOutcome::DecidedOther => {
                trace!("peer value decided, resubmitting for a fresh slot");
                shortfalls = 0;
            }
            AttemptOutcome::SlotTaken => {
                trace!("target slot was stale, retrying at the new frontier");
                shortfalls = 0;
            }
            AttemptOutcome::PrepareShortfall | AttemptOutcome::AcceptShortfall => {
                let backoff = inner.backoff.duration(shortfalls, rng);
                shortfalls += 1;
                trace!(?backoff, "quorum shortfall, backing off");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// One attempt: pick a number and slot, run both phases, announce the
/// decision.
async fn run_attempt<V: Value, T: Transport>(inner: &Inner<V, T>, value: &V) -> AttemptOutcome {
    // A fresh number above everything seen, targeting the current frontier.
    // Taking the number records it locally, so this node's acceptor promises
    // it implicitly; its own accepted proposal joins the adoption pool like
    // any peer's would.
    let (number, slot, mut adopted) = {
        let mut state = inner.state.lock().unwrap();
        let state = &mut *state;
        let number = state.acceptor.next_number(inner.id);
        let slot = state.log.next_unknown_slot();
        let adopted = state.acceptor.accepted().filter(|p| p.slot == slot).cloned();
        (number, slot, adopted)
    };
    trace!(%number, slot, "starting attempt");

    // Phase 1: collect promises, one peer at a time. The local node counts
    // as promised already.
    let mut promises = 1usize;
    for peer in &inner.peers {
        match peer.prepare(inner.id, number, slot).await {
            Ok(PrepareReply::Promised { accepted }) => {
                promises += 1;
                if let Some(proposal) = accepted {
                    if proposal.slot == slot
                        && adopted.as_ref().is_none_or(|a| proposal.number > a.number)
                    {
                        adopted = Some(proposal);
                    }
                }
            }
            Ok(PrepareReply::Rejected) => {}
            Ok(PrepareReply::Decided { slot, value }) => {
                debug!(slot, "slot already decided by a peer");
                inner.absorb_decided(slot, value);
                return AttemptOutcome::SlotTaken;
            }
            Err(e) => trace!(peer = peer.id, error = %e, "prepare failed"),
        }
    }
    if promises < inner.majority {
        trace!(promises, "prepare quorum shortfall");
        return AttemptOutcome::PrepareShortfall;
    }

    // The highest-numbered accepted proposal revealed by the promises may
    // already be chosen somewhere, so its value is the one pushed forward
    // under this attempt's number; this node's own value waits for a later
    // slot.
    let own = adopted.is_none();
    let chosen = Proposal {
        number,
        slot,
        value: adopted.map_or_else(|| value.clone(), |proposal| proposal.value),
    };

    // Phase 2: collect accepts. This node votes through its own acceptor
    // so the vote is durable and revealed to competing prepares.
    let self_accepted = {
        let mut state = inner.state.lock().unwrap();
        let state = &mut *state;
        state.acceptor.receive_accept(&state.log, chosen.clone()) == AcceptReply::Accepted
    };
    let mut accepts = usize::from(self_accepted);
    for peer in &inner.peers {
        match peer.accept(chosen.clone()).await {
            Ok(AcceptReply::Accepted) => accepts += 1,
            Ok(AcceptReply::Rejected) => {}
            Err(e) => trace!(peer = peer.id, error = %e, "accept failed"),
        }
    }
    if accepts < inner.majority {
        trace!(accepts, "accept quorum shortfall");
        return AttemptOutcome::AcceptShortfall;
    }

    // A majority accepted, so the proposal is chosen. The announcement is
    // best-effort; a peer that misses it learns the value from a later
    // prepare against this slot.
    for peer in &inner.peers {
        if let Err(e) = peer.decide(chosen.clone()).await {
            trace!(peer = peer.id, error = %e, "decide failed");
        }
    }

    inner.handle_decide(chosen);
    if own {
        AttemptOutcome::DecidedOwn
    } else {
        AttemptOutcome::DecidedOther
    }
}
