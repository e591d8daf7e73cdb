use crate::stream::StreamProtocol;
use crate::{HelloError, Result};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

/// TCP protocol implementation
pub struct TcpProtocol;

impl StreamProtocol for TcpProtocol {
    type Listener = TcpListener;
    type Stream = TcpStream;

    fn bind(addr: SocketAddr) -> impl std::future::Future<Output = Result<TcpListener>> + Send {
        async move {
            TcpListener::bind(addr)
                .await
                .map_err(|source| HelloError::Bind { addr, source })
        }
    }

    fn local_addr(listener: &TcpListener) -> Result<SocketAddr> {
        listener.local_addr().map_err(HelloError::Io)
    }

    fn accept(
        listener: &mut TcpListener,
    ) -> impl std::future::Future<Output = Result<(TcpStream, SocketAddr)>> + Send {
        async move {
            let (stream, addr) = listener.accept().await.map_err(HelloError::Io)?;
            // Responses are single small writes; don't hold them back.
            stream.set_nodelay(true).map_err(HelloError::Io)?;
            Ok((stream, addr))
        }
    }

    async fn connect(addr: SocketAddr) -> Result<TcpStream> {
        TcpStream::connect(addr).await.map_err(HelloError::Io)
    }
}
