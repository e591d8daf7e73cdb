use crate::Result;
use async_trait::async_trait;

/// Common interface of the fixture servers
///
/// `run` binds, reports the startup line and serves until the shutdown
/// signal fires.
#[async_trait]
pub trait HelloServerTrait {
    /// Starts the server and serves connections
    async fn run(&self) -> Result<()>;

    /// Returns a sender that stops a running server when a value is sent
    fn shutdown_signal(&self) -> tokio::sync::broadcast::Sender<()>;
}
