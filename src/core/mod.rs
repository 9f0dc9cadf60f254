//! Pure consensus core - no I/O, no async, no synchronization.
//!
//! Everything in here is a plain state machine the runtime drives from
//! behind a lock, which keeps the protocol rules unit-testable without a
//! network.
//!
//! # Modules
//!
//! - [`proposal`]: proposal identifiers and value bounds
//! - [`log`]: the slot-indexed decision log
//! - [`acceptor`]: the acceptor state transitions

pub(crate) mod acceptor;
pub(crate) mod log;
pub(crate) mod proposal;

pub use acceptor::AcceptorState;
pub use log::DecisionLog;
pub use proposal::{NodeId, Proposal, ProposalNumber, SlotId, Value};
