use crate::common::{HelloServerTrait, ServerConfig, Variant};
use crate::http::RequestHandler;
use crate::{HelloHandler, Result, StreamServer, TcpProtocol};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Handle to a server spawned for a test
pub struct TestServer {
    pub addr: SocketAddr,
    pub handle: JoinHandle<Result<()>>,
    pub shutdown: broadcast::Sender<()>,
}

impl TestServer {
    /// Sends the shutdown signal and waits for the accept loop to return
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(());
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(crate::HelloError::Config(format!("server task failed: {e}"))),
        }
    }
}

/// Spawns a fixture server on an ephemeral loopback port.
///
/// The listener is bound before this returns, so the address is immediately
/// connectable.
pub async fn spawn_test_server(variant: Variant) -> Result<TestServer> {
    spawn_test_server_with_handler(variant, HelloHandler::default()).await
}

/// Same as [`spawn_test_server`] with a custom handler
pub async fn spawn_test_server_with_handler<H: RequestHandler>(
    variant: Variant,
    handler: H,
) -> Result<TestServer> {
    let config = ServerConfig {
        bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        variant,
        ..ServerConfig::default()
    };

    let server: StreamServer<TcpProtocol, H> = StreamServer::new(config, handler);
    let shutdown = server.shutdown_signal();
    let listening = server.bind().await?;
    let addr = listening.local_addr();
    let handle = tokio::spawn(async move { listening.serve().await });

    Ok(TestServer {
        addr,
        handle,
        shutdown,
    })
}
