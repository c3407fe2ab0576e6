//! Domain types shared by the synchronization layer and its callers.
//!
//! Everything here is plain data: serde-serializable, clonable, and free of
//! locks. The stateful aggregates that fold these values live in the `gwsync`
//! crate.

pub mod account;
pub mod contract;
pub mod market;
pub mod order;
pub mod ticks;

pub use account::*;
pub use contract::*;
pub use market::*;
pub use order::*;
pub use ticks::*;
