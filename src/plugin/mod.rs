//! Plugin lifecycle: process supervision, version negotiation, typed clients
//! and the registry the engine dispatches through.

pub mod client;
pub mod compat;
pub mod host;
pub mod protocol;
pub mod registry;
pub mod source;
pub mod supervisor;

pub use client::PluginClient;
pub use compat::{classify, CompatState, Compatibility, NegotiationState, Negotiator};
pub use host::{LaunchFailure, LaunchReport, PluginHost, PluginSession};
pub use protocol::{PluginMetadata, SPEC_VERSION};
pub use registry::PluginRegistry;
pub use source::CostSource;
pub use supervisor::{PluginProcess, Supervisor};
