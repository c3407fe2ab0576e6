//! # gwsync-core
//!
//! Core crate for the gateway synchronization layer, providing:
//!
//! - **Types** (`types`): contracts, orders, executions, account entities,
//!   tick payloads and the tick-type code tables
//! - **Configuration** (`config`): session connection parameters
//! - **Error types** (`error`): typed `GwError` via thiserror, plus gateway
//!   `(code, message)` classification
//! - **Wire** (`wire`): the `tag::json` frame convention used on the
//!   correlation bus
//! - **Time utilities** (`time_util`): gateway timestamp parsing/formatting
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;
pub mod wire;

// Re-export types at crate root for convenience.
pub use types::*;
