//! Pluggable network transport.
//!
//! Production code uses [`TcpTransport`]. Simulation tests substitute an
//! implementation backed by a simulated network, so whole clusters run in
//! one process under deterministic fault injection.

use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

/// Dials outbound peer connections and accepts inbound ones.
///
/// The returned futures must be `Send` because connections are established
/// from spawned tasks.
pub trait Transport: Clone + Send + Sync + 'static {
    /// Bidirectional byte stream between two nodes.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;
    /// Listening socket produced by [`bind`](Transport::bind).
    type Listener: Send + 'static;

    /// Connect to a peer at `addr` (a `host:port` string).
    fn connect(&self, addr: &str) -> impl Future<Output = io::Result<Self::Stream>> + Send;

    /// Bind a listener on `addr`.
    fn bind(&self, addr: &str) -> impl Future<Output = io::Result<Self::Listener>> + Send;

    /// Accept the next inbound connection.
    fn accept(
        listener: &mut Self::Listener,
    ) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// The production transport, backed by `tokio::net`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    type Stream = TcpStream;
    type Listener = TcpListener;

    async fn connect(&self, addr: &str) -> io::Result<TcpStream> {
        TcpStream::connect(addr).await
    }

    async fn bind(&self, addr: &str) -> io::Result<TcpListener> {
        TcpListener::bind(addr).await
    }

    async fn accept(listener: &mut TcpListener) -> io::Result<TcpStream> {
        listener.accept().await.map(|(stream, _)| stream)
    }
}
