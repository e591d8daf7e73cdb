//! Configuration, the server trait and test helpers shared across the crate

pub mod config;
pub mod test_utils;
pub mod traits;

pub use config::{BindFailurePolicy, ServerConfig, Variant};
pub use test_utils::{spawn_test_server, spawn_test_server_with_handler, TestServer};
pub use traits::HelloServerTrait;
