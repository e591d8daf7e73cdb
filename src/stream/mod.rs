//! Transport-generic listener
//!
//! This module provides the [`StreamProtocol`] seam and the [`StreamServer`]
//! that binds a protocol's listener and hands each connection to the HTTP
//! layer.

pub mod protocol;
pub mod server;


pub use protocol::StreamProtocol;
pub use server::{Listening, StreamServer};
