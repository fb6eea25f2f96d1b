//! # Cloudcost Core - Plugin Orchestration and Cost Aggregation
//!
//! Prices cloud resources by delegating to out-of-process cost plugins:
//! - Plugin process supervision with a bounded bind handshake
//! - Protocol-version negotiation with best-effort compatibility
//! - Local pre-flight validation before any RPC
//! - Bounded, order-preserving dispatch with per-resource error capture
//! - Aggregation with a runtime-based estimator fallback
//!
//! ## Architecture
//!
//! ```text
//!   ResourceDescriptor[]
//!          │
//!          ▼
//!   ┌──────────────┐   passes    ┌──────────────────┐   RPC    ┌────────────┐
//!   │  CostEngine  │ ──────────▶ │ ProtocolAdapter  │ ───────▶ │  plugin    │
//!   │ + estimator  │ ◀────────── │ validate → call  │ ◀─────── │  process   │
//!   └──────────────┘   rows      └──────────────────┘          └────────────┘
//!          │                              ▲                          ▲
//!          ▼                              │ PluginRegistry           │ Supervisor
//!   CostResultWithErrors           PluginHost::launch_all ───────────┘
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod adapter;
pub mod engine;
pub mod ipc;
pub mod plugin;
pub mod resource;
pub mod types;
pub mod validation;

// Test doubles, public so integration tests and plugin authors can use them
pub mod testing;

// Internal utilities
pub mod observability;

pub use types::{Config, Error, Result};
