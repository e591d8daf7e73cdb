pub mod stream_protocol;

#[cfg(test)]
mod tests;

pub use stream_protocol::TcpProtocol;

use crate::http::HelloHandler;
use crate::stream::StreamServer;

/// The fixture server: TCP transport answering with [`HelloHandler`]
pub type HelloServer = StreamServer<TcpProtocol, HelloHandler>;
