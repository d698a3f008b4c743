//! A tiny in-process RPC layer.
//!
//! Services are declared with [`service!`], registered on a [`Network`] and
//! called through the generated `Client`. The network can be made unreliable
//! and servers can be killed, which is enough to exercise fault-tolerant
//! protocols inside a single process.

mod macros;
pub mod network;
pub mod server;

pub use anyhow;
pub use async_trait::async_trait;
pub use log;
pub use serde;
pub use serde_json;
pub use tokio;

pub use network::{Network, NetworkHandle};
