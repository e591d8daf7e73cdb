use crate::Result;
use std::future::Future;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};

/// Trait for stream transports the fixture can listen on
///
/// This trait defines the interface a transport implementation must provide
/// to work with the generic [`StreamServer`](super::StreamServer) and the
/// HTTP client.
#[allow(async_fn_in_trait)]
pub trait StreamProtocol {
    /// Listener type for this protocol
    type Listener: Send;
    /// Connected stream type for this protocol
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Binds a listener to the given address (server-side)
    ///
    /// Failures surface as [`HelloError::Bind`](crate::HelloError::Bind).
    fn bind(addr: SocketAddr) -> impl Future<Output = Result<Self::Listener>> + Send;

    /// Address the listener is actually bound to
    fn local_addr(listener: &Self::Listener) -> Result<SocketAddr>;

    /// Accepts a new connection from the listener (server-side)
    fn accept(
        listener: &mut Self::Listener,
    ) -> impl Future<Output = Result<(Self::Stream, SocketAddr)>> + Send;

    /// Connects to a server at the given address (client-side)
    async fn connect(addr: SocketAddr) -> Result<Self::Stream>;
}
