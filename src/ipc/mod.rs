//! TCP+msgpack RPC transport between the core and its plugins.
//!
//! The core side is [`RpcClient`]; the plugin side is [`PluginServer`],
//! which hosts any [`CostSource`](crate::plugin::CostSource).

pub mod client;
pub mod codec;
pub mod router;
pub mod server;

pub use client::RpcClient;
pub use server::{resolve_port, PluginServer, PORT_ENV};
