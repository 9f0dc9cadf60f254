//! Inbound peer connections.
//!
//! One task accepts connections on the engine's listen address; each accepted
//! stream gets its own task that reads framed requests, dispatches them to
//! the shared acceptor state, and writes one reply per request.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_util::codec::Framed;
use tracing::{debug, instrument, warn};

use crate::codec::ServerCodec;
use crate::core::Value;
use crate::engine::Inner;
use crate::transport::Transport;

pub(crate) async fn run_listener<V: Value, T: Transport>(
    inner: Arc<Inner<V, T>>,
    mut listener: T::Listener,
) {
    loop {
        match T::accept(&mut listener).await {
            Ok(stream) => {
                let inner = Arc::clone(&inner);
                tokio::spawn(serve_peer(inner, stream));
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

#[instrument(skip_all, name = "peer_conn", fields(node = inner.id))]
async fn serve_peer<V: Value, T: Transport>(inner: Arc<Inner<V, T>>, stream: T::Stream) {
    let mut conn = Framed::new(stream, ServerCodec::<V>::new());
    while let Some(request) = conn.next().await {
        let request = match request {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "bad frame from peer");
                return;
            }
        };
        let reply = inner.dispatch(request).await;
        if let Err(e) = conn.send(reply).await {
            debug!(error = %e, "failed to send reply");
            return;
        }
    }
    debug!("peer disconnected");
}
