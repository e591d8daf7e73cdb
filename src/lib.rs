use crate::http::codec::HttpCodecError;
use std::net::SocketAddr;
use thiserror::Error;

/// Error types for the hellosrv library
#[derive(Error, Debug)]
pub enum HelloError {
    /// The listener could not bind its address
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Socket errors after the listener is up (accept, read, write)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP framing errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// UTF-8 encoding errors
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl From<HttpCodecError> for HelloError {
    fn from(err: HttpCodecError) -> Self {
        match err {
            HttpCodecError::Io(e) => HelloError::Io(e),
            other => HelloError::Http(other.to_string()),
        }
    }
}

/// Result type for the hellosrv library
pub type Result<T> = std::result::Result<T, HelloError>;

pub mod common;
pub mod http;
pub mod stream;
pub mod tcp;

// Re-export main types for convenience
pub use common::{BindFailurePolicy, HelloServerTrait, ServerConfig, Variant};
pub use crate::http::{HelloHandler, HttpClient, RequestHandler};
pub use stream::{Listening, StreamProtocol, StreamServer};
pub use tcp::{HelloServer, TcpProtocol};
