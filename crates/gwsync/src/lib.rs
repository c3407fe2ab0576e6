//! # gwsync
//!
//! Synchronization layer on top of a broker wire-protocol client. The wire
//! client delivers every decoded gateway event through one callback interface
//! on a single delivery thread; this crate turns that push-only stream into:
//!
//! - a correlation bus callers block on or stream from ([`bus`])
//! - an authoritative, concurrently-readable session state store ([`state`])
//! - a per-instrument market-data aggregate ([`ticker`])
//! - a per-order lifecycle aggregate ([`trade`])
//! - the event router that is the sole consumer of the callback stream
//!   ([`router`])
//!
//! Lock discipline: the store lock is held only to look entries up; per-entity
//! locks (ticker, trade) are taken after it is released, never under it.

pub mod bus;
pub mod router;
pub mod state;
pub mod subscription;
pub mod ticker;
pub mod trade;

pub use bus::{EventBus, Topic};
pub use router::{EventRouter, GatewayEvents};
pub use state::{SessionState, StreamKind, TickerId};
pub use subscription::Subscription;
pub use ticker::Ticker;
pub use trade::{DoneSignal, Trade, TradeLogEntry};

pub use gwsync_core as core;
