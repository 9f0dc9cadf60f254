//! Engine runtime: shared state, RPC dispatch, and task wiring.
//!
//! [`PaxosEngine::start`] spawns three tasks per node: a listener serving
//! peer RPCs, a controller driving queued submissions, and a delivery task
//! draining decided values to the application in slot order. All three share
//! one [`Inner`], whose consensus state sits behind a single short-lived
//! lock; no RPC is ever issued while that lock is held.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace};

use crate::config::{BackoffConfig, EngineConfig, StartError};
use crate::core::{AcceptorState, DecisionLog, NodeId, Proposal, ProposalNumber, SlotId, Value};
use crate::messages::{AcceptReply, PeerReply, PeerRequest, PrepareReply, RpcKind};
use crate::peer::PeerClient;
use crate::transport::{TcpTransport, Transport};
use crate::{proposer, server};

/// The application's in-order sink for decided values.
pub type DecidedHandler<V> = Box<dyn FnMut(V) + Send>;

/// Fault-injection hook: an artificial delay applied before a peer RPC is
/// handled, keyed by this node's id, the RPC kind, and the current frontier
/// slot.
pub type RpcDelay = Arc<dyn Fn(NodeId, RpcKind, SlotId) -> Option<Duration> + Send + Sync>;

/// Consensus state guarded by one lock.
pub(crate) struct SharedState<V> {
    pub(crate) acceptor: AcceptorState<V>,
    pub(crate) log: DecisionLog<V>,
}

/// State shared by the engine handle and its tasks.
pub(crate) struct Inner<V: Value, T: Transport> {
    pub(crate) id: NodeId,
    pub(crate) majority: usize,
    pub(crate) backoff: BackoffConfig,
    pub(crate) peers: Vec<PeerClient<V, T>>,
    pub(crate) state: Mutex<SharedState<V>>,
    decided: Mutex<Option<DecidedHandler<V>>>,
    rpc_delay: Mutex<Option<RpcDelay>>,
    /// Bumped on every log insert; the delivery task watches it.
    log_rev: watch::Sender<u64>,
    pub(crate) in_flight: AtomicBool,
}

impl<V: Value, T: Transport> Inner<V, T> {
    /// Handle one framed peer request.
    pub(crate) async fn dispatch(&self, request: PeerRequest<V>) -> PeerReply<V> {
        if let Some(delay) = self.injected_delay(request.kind()) {
            trace!(?delay, "delaying rpc");
            tokio::time::sleep(delay).await;
        }
        match request {
            PeerRequest::Prepare { from, number, slot } => {
                PeerReply::Prepare(self.handle_prepare(from, number, slot))
            }
            PeerRequest::Accept { proposal } => PeerReply::Accept(self.handle_accept(proposal)),
            PeerRequest::Decide { proposal } => {
                self.handle_decide(proposal);
                PeerReply::Decide
            }
        }
    }

    fn injected_delay(&self, kind: RpcKind) -> Option<Duration> {
        let hook = self.rpc_delay.lock().unwrap().clone()?;
        hook(self.id, kind, self.frontier())
    }

    /// The smallest slot with no locally known decision.
    pub(crate) fn frontier(&self) -> SlotId {
        self.state.lock().unwrap().log.next_unknown_slot()
    }

    fn handle_prepare(
        &self,
        from: NodeId,
        number: ProposalNumber,
        slot: SlotId,
    ) -> PrepareReply<V> {
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;
        let reply = state.acceptor.receive_prepare(&state.log, number, slot);
        match &reply {
            PrepareReply::Promised { accepted } => {
                trace!(from, %number, slot, revealing = accepted.is_some(), "promised");
            }
            PrepareReply::Rejected => trace!(from, %number, slot, "rejected stale prepare"),
            PrepareReply::Decided { .. } => trace!(from, %number, slot, "revealed decided slot"),
        }
        reply
    }

    fn handle_accept(&self, proposal: Proposal<V>) -> AcceptReply {
        let number = proposal.number;
        let slot = proposal.slot;
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;
        let reply = state.acceptor.receive_accept(&state.log, proposal);
        trace!(%number, slot, accepted = reply == AcceptReply::Accepted, "accept");
        reply
    }

    /// Record a decided proposal and wake the delivery task.
    pub(crate) fn handle_decide(&self, proposal: Proposal<V>) {
        let number = proposal.number;
        let slot = proposal.slot;
        let inserted = {
            let mut state = self.state.lock().unwrap();
            let state = &mut *state;
            state.acceptor.receive_decide(&mut state.log, proposal)
        };
        if inserted {
            debug!(%number, slot, "decided");
            self.log_rev.send_modify(|rev| *rev += 1);
        }
    }

    /// Fold a decision revealed by a prepare reply into the log.
    ///
    /// Unlike a decide announcement this leaves the accepted proposal in
    /// place: the revealed slot belongs to an older round, not the one
    /// currently in flight.
    pub(crate) fn absorb_decided(&self, slot: SlotId, value: V) {
        let inserted = self.state.lock().unwrap().log.add(slot, value);
        if inserted {
            debug!(slot, "absorbed decided slot");
            self.log_rev.send_modify(|rev| *rev += 1);
        }
    }

    /// Hand every contiguously decided, not yet delivered value to the
    /// handler. Without a registered handler values stay buffered in the
    /// log and the read cursor does not move.
    fn drain_decided(&self) {
        let mut guard = self.decided.lock().unwrap();
        let Some(handler) = guard.as_mut() else {
            return;
        };
        loop {
            let value = self.state.lock().unwrap().log.take_next_unread();
            let Some(value) = value else { return };
            trace!("delivering value");
            handler(value);
        }
    }
}

/// Drain decided values to the application whenever the log grows.
#[instrument(skip_all, name = "delivery", fields(node = inner.id))]
async fn deliver_loop<V: Value, T: Transport>(
    inner: Arc<Inner<V, T>>,
    mut rev_rx: watch::Receiver<u64>,
) {
    loop {
        inner.drain_decided();
        if rev_rx.changed().await.is_err() {
            return;
        }
    }
}

/// A slotted multi-Paxos engine replicating opaque values across a fixed
/// peer set.
///
/// Dropping the engine aborts its tasks and closes its connections.
pub struct PaxosEngine<V: Value, T: Transport = TcpTransport> {
    inner: Arc<Inner<V, T>>,
    submit_tx: mpsc::UnboundedSender<V>,
    tasks: Vec<JoinHandle<()>>,
}

impl<V: Value, T: Transport> fmt::Debug for PaxosEngine<V, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaxosEngine")
            .field("node_id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

impl<V: Value> PaxosEngine<V> {
    /// Start an engine over TCP.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration or if the listen address cannot be
    /// bound. Nothing after startup surfaces as an error.
    pub async fn start(config: EngineConfig) -> Result<Self, StartError> {
        Self::start_with(TcpTransport, config).await
    }
}

impl<V: Value, T: Transport> PaxosEngine<V, T> {
    /// Start an engine over a custom transport.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration or if the listen address cannot be
    /// bound.
    pub async fn start_with(transport: T, config: EngineConfig) -> Result<Self, StartError> {
        config.validate()?;
        let listener = transport.bind(&config.listen_addr).await?;

        let peers = config
            .members
            .iter()
            .filter(|node| node.id != config.node_id)
            .map(|node| PeerClient::new(node, transport.clone(), config.rpc_timeout))
            .collect();

        let (log_rev, rev_rx) = watch::channel(0u64);
        let inner = Arc::new(Inner {
            id: config.node_id,
            majority: config.majority(),
            backoff: config.backoff.clone(),
            peers,
            state: Mutex::new(SharedState {
                acceptor: AcceptorState::new(config.node_id),
                log: DecisionLog::new(),
            }),
            decided: Mutex::new(None),
            rpc_delay: Mutex::new(None),
            log_rev,
            in_flight: AtomicBool::new(false),
        });

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let (submit_tx, submit_rx) = mpsc::unbounded_channel();
        let tasks = vec![
            tokio::spawn(server::run_listener(Arc::clone(&inner), listener)),
            tokio::spawn(proposer::run_controller(Arc::clone(&inner), submit_rx, rng)),
            tokio::spawn(deliver_loop(Arc::clone(&inner), rev_rx)),
        ];
        debug!(node = inner.id, peers = inner.peers.len(), "engine started");

        Ok(Self {
            inner,
            submit_tx,
            tasks,
        })
    }

    /// Queue `value` for consensus. Never blocks.
    ///
    /// There is no per-call completion signal; the value is decided when the
    /// registered handler observes it.
    pub fn propose(&self, value: V) {
        if self.submit_tx.send(value).is_err() {
            debug!("engine is shut down, dropping submission");
        }
    }

    /// Register the in-order delivery sink.
    ///
    /// Values decided before registration are buffered and flushed, in slot
    /// order, once the handler is in place. The handler runs on the engine's
    /// delivery task: it must not block indefinitely and must not call back
    /// into `set_decided_handler`.
    pub fn set_decided_handler(&self, handler: impl FnMut(V) + Send + 'static) {
        *self.inner.decided.lock().unwrap() = Some(Box::new(handler));
        self.inner.log_rev.send_modify(|rev| *rev += 1);
    }

    /// Install a delay hook consulted at the start of every peer RPC
    /// handler. Purely a testing seam for partial-failure scenarios.
    pub fn set_rpc_delay(
        &self,
        hook: impl Fn(NodeId, RpcKind, SlotId) -> Option<Duration> + Send + Sync + 'static,
    ) {
        *self.inner.rpc_delay.lock().unwrap() = Some(Arc::new(hook));
    }

    /// This node's id.
    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.inner.id
    }

    /// The smallest slot this node knows no decision for.
    #[must_use]
    pub fn frontier(&self) -> SlotId {
        self.inner.frontier()
    }

    /// Whether a submission is currently being driven to consensus.
    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst)
    }
}

impl<V: Value, T: Transport> Drop for PaxosEngine<V, T> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
