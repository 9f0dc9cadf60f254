//! Slotted multi-Paxos over a fixed peer set.
//!
//! Each node pairs a proposer driver with an acceptor and a slot-indexed
//! decision log. Submitted values are driven through prepare/accept rounds
//! into the lowest undecided slot, and every node delivers decided values to
//! the application strictly in slot order, with no gaps.
//!
//! # Architecture
//!
//! - [`core`]: the pure protocol rules - proposal numbers, acceptor state
//!   transitions, and the decision log. No I/O.
//! - [`PaxosEngine`]: the runtime - one listener, one proposal controller,
//!   and one delivery task per node, talking postcard-over-length-delimited
//!   frames to peers.
//! - [`Transport`]: the seam between the two, so whole clusters can run
//!   against a simulated network in tests.
//!
//! # Quick Start
//!
//! ```ignore
//! use slot_paxos::{EngineConfig, Node, PaxosEngine};
//!
//! let members = vec![
//!     Node::new(0, "10.0.0.1:9000"),
//!     Node::new(1, "10.0.0.2:9000"),
//!     Node::new(2, "10.0.0.3:9000"),
//! ];
//! let config = EngineConfig::new(0, "0.0.0.0:9000", members);
//!
//! let engine: PaxosEngine<Vec<String>> = PaxosEngine::start(config).await?;
//! engine.set_decided_handler(|batch| apply(batch));
//! engine.propose(vec!["Up".to_string(), "Left".to_string()]);
//! ```

#![warn(clippy::pedantic)]

pub mod codec;
pub mod config;
pub mod core;
mod engine;
pub mod messages;
mod peer;
mod proposer;
mod server;
pub mod transport;

pub use config::{BackoffConfig, EngineConfig, Node, StartError};
pub use engine::{DecidedHandler, PaxosEngine, RpcDelay};
pub use messages::{AcceptReply, PeerReply, PeerRequest, PrepareReply, RpcKind};
pub use transport::{TcpTransport, Transport};

pub use crate::core::{DecisionLog, NodeId, Proposal, ProposalNumber, SlotId, Value};
