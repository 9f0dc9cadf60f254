//! Outbound peer connections.
//!
//! One [`PeerClient`] per remote node. The connection is dialed lazily on
//! first use, cached, and dropped on any failure or timeout so that the next
//! call redials. Dropping on timeout also prevents a late reply from being
//! paired with a later request, since every redial starts a fresh stream.

use std::io;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::codec::ClientCodec;
use crate::config::Node;
use crate::core::{NodeId, Proposal, ProposalNumber, SlotId, Value};
use crate::messages::{AcceptReply, PeerReply, PeerRequest, PrepareReply};
use crate::transport::Transport;

/// Cached outbound connection to one peer.
///
/// Calls are serialized by the connection lock, which also satisfies the
/// one-reply-per-request framing: at most one exchange is in flight per peer
/// at any time.
pub(crate) struct PeerClient<V: Value, T: Transport> {
    pub(crate) id: NodeId,
    addr: String,
    transport: T,
    rpc_timeout: Duration,
    conn: Mutex<Option<Framed<T::Stream, ClientCodec<V>>>>,
}

impl<V: Value, T: Transport> PeerClient<V, T> {
    pub(crate) fn new(node: &Node, transport: T, rpc_timeout: Duration) -> Self {
        Self {
            id: node.id,
            addr: node.addr.clone(),
            transport,
            rpc_timeout,
            conn: Mutex::new(None),
        }
    }

    /// Phase 1: ask this peer for a promise on `number` for `slot`.
    pub(crate) async fn prepare(
        &self,
        from: NodeId,
        number: ProposalNumber,
        slot: SlotId,
    ) -> io::Result<PrepareReply<V>> {
        match self.call(PeerRequest::Prepare { from, number, slot }).await? {
            PeerReply::Prepare(reply) => Ok(reply),
            _ => Err(protocol_violation()),
        }
    }

    /// Phase 2: ask this peer to record `proposal`.
    pub(crate) async fn accept(&self, proposal: Proposal<V>) -> io::Result<AcceptReply> {
        match self.call(PeerRequest::Accept { proposal }).await? {
            PeerReply::Accept(reply) => Ok(reply),
            _ => Err(protocol_violation()),
        }
    }

    /// Announce a decided proposal to this peer.
    pub(crate) async fn decide(&self, proposal: Proposal<V>) -> io::Result<()> {
        match self.call(PeerRequest::Decide { proposal }).await? {
            PeerReply::Decide => Ok(()),
            _ => Err(protocol_violation()),
        }
    }

    /// One request/reply exchange under a single deadline, dialing first if
    /// no connection is cached. Any failure invalidates the cache.
    async fn call(&self, request: PeerRequest<V>) -> io::Result<PeerReply<V>> {
        let mut conn = self.conn.lock().await;
        let exchange = tokio::time::timeout(self.rpc_timeout, self.exchange(&mut conn, request));
        match exchange.await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => {
                debug!(peer = self.id, error = %e, "peer call failed, dropping connection");
                *conn = None;
                Err(e)
            }
            Err(_elapsed) => {
                debug!(peer = self.id, "peer call timed out, dropping connection");
                *conn = None;
                Err(io::Error::new(io::ErrorKind::TimedOut, "peer rpc timed out"))
            }
        }
    }

    async fn exchange(
        &self,
        conn: &mut Option<Framed<T::Stream, ClientCodec<V>>>,
        request: PeerRequest<V>,
    ) -> io::Result<PeerReply<V>> {
        if conn.is_none() {
            let stream = self.transport.connect(&self.addr).await?;
            debug!(peer = self.id, addr = %self.addr, "connected to peer");
            *conn = Some(Framed::new(stream, ClientCodec::new()));
        }
        let framed = conn.as_mut().expect("connection was just established");
        framed.send(request).await?;
        match framed.next().await {
            Some(reply) => reply,
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed the connection",
            )),
        }
    }
}

fn protocol_violation() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "reply does not match request")
}
