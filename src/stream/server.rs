use super::StreamProtocol;
use crate::common::{BindFailurePolicy, HelloServerTrait, ServerConfig};
use crate::http::{connection::serve_connection, RequestHandler};
use crate::Result;
use async_trait::async_trait;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn, Instrument};

/// Pause after a failed accept so a persistent error (EMFILE) doesn't spin
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Generic fixture server over any stream protocol
///
/// The server starts `unbound`. [`StreamServer::bind`] moves it to
/// `listening` and hands back a [`Listening`] whose accept loop dispatches
/// every request to the shared handler.
///
/// # Examples
///
/// ```no_run
/// use hellosrv::common::{HelloServerTrait, ServerConfig, Variant};
/// use hellosrv::{HelloHandler, HelloServer};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ServerConfig::from_env(Variant::Vendored)?;
///     let server = HelloServer::new(config, HelloHandler::default());
///     server.run().await?;
///     Ok(())
/// }
/// ```
pub struct StreamServer<P: StreamProtocol, H: RequestHandler> {
    config: ServerConfig,
    handler: Arc<H>,
    protocol: PhantomData<fn() -> P>,
    shutdown_signal: Arc<broadcast::Sender<()>>,
}

impl<P, H> StreamServer<P, H>
where
    P: StreamProtocol + 'static,
    H: RequestHandler,
{
    /// Creates an unbound server with the given configuration and handler
    pub fn new(config: ServerConfig, handler: H) -> Self {
        let (shutdown_signal, _) = broadcast::channel(1);
        Self {
            config,
            handler: Arc::new(handler),
            protocol: PhantomData,
            shutdown_signal: Arc::new(shutdown_signal),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the configured address.
    ///
    /// The returned [`Listening`] already observes this server's shutdown
    /// signal, so a signal sent before `serve` is called is not lost.
    pub async fn bind(&self) -> Result<Listening<P, H>> {
        let shutdown_rx = self.shutdown_signal.subscribe();
        let listener = P::bind(self.config.bind_addr).await?;
        let local_addr = P::local_addr(&listener)?;

        Ok(Listening {
            listener,
            local_addr,
            config: Arc::new(self.config.clone()),
            handler: self.handler.clone(),
            shutdown_rx,
        })
    }
}

/// A bound server, ready to accept connections
pub struct Listening<P: StreamProtocol, H: RequestHandler> {
    listener: P::Listener,
    local_addr: SocketAddr,
    config: Arc<ServerConfig>,
    handler: Arc<H>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl<P, H> Listening<P, H>
where
    P: StreamProtocol + 'static,
    H: RequestHandler,
{
    /// Address the listener is bound to, with the real port when 0 was requested
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the accept loop until the shutdown signal fires
    pub async fn serve(self) -> Result<()> {
        let Listening {
            mut listener,
            config,
            handler,
            mut shutdown_rx,
            ..
        } = self;
        let mut shutdown_open = true;

        loop {
            tokio::select! {
                accept_result = P::accept(&mut listener) => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            debug!(%peer, "Accepted connection");

                            let config = config.clone();
                            let handler = handler.clone();
                            let span = tracing::info_span!("connection", %peer);
                            tokio::spawn(async move {
                                let result = serve_connection(stream, peer, handler.as_ref(), &config)
                                    .instrument(span)
                                    .await;
                                if let Err(e) = result {
                                    error!(%peer, error = %e, "Error handling connection");
                                }
                                debug!(%peer, "Connection closed");
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        }
                    }
                }
                signal = shutdown_rx.recv(), if shutdown_open => {
                    match signal {
                        // All senders dropped; keep serving.
                        Err(RecvError::Closed) => shutdown_open = false,
                        _ => {
                            info!("Received internal shutdown signal, stopping server");
                            break;
                        }
                    }
                }
            }
        }

        info!("Fixture server stopped");
        Ok(())
    }
}

/// Waits for the shutdown signal without serving anything
async fn linger(mut shutdown_rx: broadcast::Receiver<()>) {
    match shutdown_rx.recv().await {
        Err(RecvError::Closed) => std::future::pending::<()>().await,
        _ => info!("Received internal shutdown signal while idle"),
    }
}

#[async_trait]
impl<P, H> HelloServerTrait for StreamServer<P, H>
where
    P: StreamProtocol + 'static,
    H: RequestHandler,
{
    /// Binds, prints the variant's startup line and serves.
    ///
    /// A bind failure is logged as `something bad happened <error>`; what
    /// follows depends on [`BindFailurePolicy`].
    async fn run(&self) -> Result<()> {
        let idle_rx = self.shutdown_signal.subscribe();

        let listening = match self.bind().await {
            Ok(listening) => listening,
            Err(e) => {
                error!("something bad happened {e}");
                return match self.config.on_bind_failure {
                    BindFailurePolicy::Exit => Err(e),
                    BindFailurePolicy::Linger => {
                        warn!(address = %self.config.bind_addr, "Not serving; waiting to be stopped");
                        linger(idle_rx).await;
                        Ok(())
                    }
                };
            }
        };
        drop(idle_rx);

        let port = listening.local_addr().port();
        info!("{}", self.config.variant.startup_line(port));

        listening.serve().await
    }

    fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown_signal.as_ref().clone()
    }
}
