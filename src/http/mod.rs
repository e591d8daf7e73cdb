//! HTTP/1.1 layer of the fixture
//!
//! This module frames requests and responses, holds the handler that decides
//! what every request gets back, and drives individual connections.

pub mod client;
pub mod codec;
pub mod connection;
pub mod handler;


pub use client::{Client, ClientConfig, ClientResponse, HttpClient};
pub use codec::{HttpCodec, HttpCodecError, IncomingRequest, RequestTarget};
pub use handler::{HelloHandler, RequestHandler, HELLO_BODY};
