//! Core types for the cost engine.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (SessionId, RequestId, PluginName)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for plugins, IPC, and provider defaults

mod config;
mod errors;
mod ids;

pub use config::{
    AwsDefaults, Config, IpcConfig, ObservabilityConfig, PluginConfig, ProviderDefaults,
};
pub use errors::{Error, Result};
pub use ids::{PluginName, RequestId, SessionId, PLUGIN_BINARY_PREFIX};
