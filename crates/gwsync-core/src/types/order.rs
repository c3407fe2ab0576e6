//! Order, execution and fill types.
//!
//! [`OrderState`] is the nine-state lifecycle the gateway reports. The
//! `gwsync::trade` aggregate folds [`OrderStatusReport`] and [`Execution`]
//! events into a per-order history; the plain data lives here so callers and
//! the wire layer can use it without pulling in the aggregates.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::contract::Contract;
use crate::time_util::parse_gateway_time;

// ---------------------------------------------------------------------------
// Order lifecycle states
// ---------------------------------------------------------------------------

/// Lifecycle state of an order as reported by the gateway.
///
/// Transitions are driven exclusively by inbound events; the synchronization
/// layer never invents a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    /// Transmitted, not yet acknowledged by the destination.
    PendingSubmit,
    /// Cancel requested, cancellation not yet confirmed.
    PendingCancel,
    /// Accepted by the gateway, held until election criteria are met.
    PreSubmitted,
    /// Accepted by the destination and working.
    Submitted,
    /// Queued on the API side, not yet transmitted.
    ApiPending,
    /// Cancelled through the API before acknowledgement.
    ApiCancelled,
    /// Confirmed cancelled (possibly rejected by the destination).
    Cancelled,
    /// Completely filled.
    Filled,
    /// Received but no longer active (rejected or cancelled upstream).
    Inactive,
}

impl OrderState {
    /// True while the order is working in the market.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::PendingSubmit | Self::ApiPending | Self::PreSubmitted | Self::Submitted
        )
    }

    /// True once the order has reached a terminal state.
    pub fn is_done(self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::ApiCancelled)
    }

    /// Parse the gateway's status string. Unknown strings map to `Inactive`.
    pub fn parse(s: &str) -> Self {
        match s {
            "PendingSubmit" => Self::PendingSubmit,
            "PendingCancel" => Self::PendingCancel,
            "PreSubmitted" => Self::PreSubmitted,
            "Submitted" => Self::Submitted,
            "ApiPending" => Self::ApiPending,
            "ApiCancelled" => Self::ApiCancelled,
            "Cancelled" => Self::Cancelled,
            "Filled" => Self::Filled,
            "Inactive" => Self::Inactive,
            other => {
                tracing::warn!(status = other, "unknown order status string");
                Self::Inactive
            }
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PendingSubmit => "PendingSubmit",
            Self::PendingCancel => "PendingCancel",
            Self::PreSubmitted => "PreSubmitted",
            Self::Submitted => "Submitted",
            Self::ApiPending => "ApiPending",
            Self::ApiCancelled => "ApiCancelled",
            Self::Cancelled => "Cancelled",
            Self::Filled => "Filled",
            Self::Inactive => "Inactive",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Order parameters
// ---------------------------------------------------------------------------

/// Parameters of one order as submitted (and as echoed back by open-order
/// events).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Session-scoped order id, assigned by the client.
    pub order_id: i64,
    /// Client id of the session that owns the order.
    pub client_id: i64,
    /// Broker-assigned permanent id, stable across reconnects.
    pub perm_id: i64,
    /// `"BUY"` or `"SELL"`.
    pub action: String,
    pub total_quantity: Decimal,
    /// `"LMT"`, `"MKT"`, `"STP"`, ...
    pub order_type: String,
    pub lmt_price: f64,
    pub aux_price: f64,
    /// Time in force: `"GTC"`, `"DAY"`, `"IOC"`, ...
    pub tif: String,
    /// Free-form reference set by the caller.
    pub order_ref: String,
    /// Owning account.
    pub account: String,
    /// Parent order id for bracket/child orders.
    pub parent_id: i64,
    /// Filled so far, as echoed by completed-order events.
    pub filled_quantity: Decimal,
}

impl Order {
    /// Two orders denote the same gateway order when their session ids match,
    /// or when both carry the same permanent id.
    pub fn has_same_id(&self, other: &Order) -> bool {
        if self.perm_id != 0 && self.perm_id == other.perm_id {
            return true;
        }
        self.client_id == other.client_id && self.order_id == other.order_id
    }
}

// ---------------------------------------------------------------------------
// Order status report
// ---------------------------------------------------------------------------

/// Snapshot of an order's progress, delivered by order-status events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub order_id: i64,
    pub status: OrderState,
    /// Quantity filled so far.
    pub filled: Decimal,
    /// Quantity remaining.
    pub remaining: Decimal,
    pub avg_fill_price: f64,
    pub perm_id: i64,
    pub parent_id: i64,
    pub last_fill_price: f64,
    pub client_id: i64,
    /// Reason the order is held, if any.
    pub why_held: String,
    pub mkt_cap_price: f64,
}

impl Default for OrderStatusReport {
    fn default() -> Self {
        Self {
            order_id: 0,
            status: OrderState::PendingSubmit,
            filled: Decimal::ZERO,
            remaining: Decimal::ZERO,
            avg_fill_price: 0.0,
            perm_id: 0,
            parent_id: 0,
            last_fill_price: 0.0,
            client_id: 0,
            why_held: String::new(),
            mkt_cap_price: 0.0,
        }
    }
}

impl OrderStatusReport {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_done(&self) -> bool {
        self.status.is_done()
    }
}

// ---------------------------------------------------------------------------
// Executions and fills
// ---------------------------------------------------------------------------

/// One execution as reported by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Unique execution id. Idempotency key for fills.
    pub exec_id: String,
    /// Gateway timestamp string, one of the documented formats.
    pub time: String,
    pub acct_number: String,
    pub exchange: String,
    /// `"BOT"` or `"SLD"`.
    pub side: String,
    pub shares: Decimal,
    pub price: f64,
    pub perm_id: i64,
    pub client_id: i64,
    pub order_id: i64,
    pub liquidation: i64,
    pub cum_qty: Decimal,
    pub avg_price: f64,
}

/// Commission data attached to an execution, delivered by a separate event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommissionReport {
    pub exec_id: String,
    pub commission: f64,
    pub currency: String,
    pub realized_pnl: f64,
    /// Bond yield, when applicable.
    pub yield_: f64,
    pub yield_redemption_date: i64,
}

impl CommissionReport {
    /// True until the commission event for the execution has arrived.
    pub fn is_pending(&self) -> bool {
        self.exec_id.is_empty()
    }
}

/// One fill recorded against an order: execution plus (eventually) its
/// commission report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub contract: Contract,
    pub execution: Execution,
    pub commission_report: CommissionReport,
    pub time: DateTime<Utc>,
}

impl Fill {
    /// Check the fill against an execution filter. Empty/zero filter fields
    /// match anything; the time field is a lower bound.
    pub fn matches(&self, filter: &ExecutionFilter) -> bool {
        if !filter.acct_code.is_empty() && filter.acct_code != self.execution.acct_number {
            return false;
        }
        if filter.client_id != 0 && filter.client_id != self.execution.client_id {
            return false;
        }
        if !filter.exchange.is_empty() && filter.exchange != self.execution.exchange {
            return false;
        }
        if !filter.sec_type.is_empty() && filter.sec_type != self.contract.sec_type {
            return false;
        }
        if !filter.side.is_empty() && filter.side != self.execution.side {
            return false;
        }
        if !filter.symbol.is_empty() && filter.symbol != self.contract.symbol {
            return false;
        }
        if !filter.time.is_empty() {
            match parse_gateway_time(&filter.time) {
                Ok(t) => {
                    if self.time < t {
                        return false;
                    }
                }
                Err(err) => {
                    tracing::error!(%err, time = %filter.time, "bad execution filter time");
                    return false;
                }
            }
        }
        true
    }
}

/// Server-side filter for execution requests; also usable locally via
/// [`Fill::matches`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFilter {
    pub client_id: i64,
    pub acct_code: String,
    /// Lower bound on execution time, gateway time format.
    pub time: String,
    pub symbol: String,
    pub sec_type: String,
    pub exchange: String,
    pub side: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn state_partition_is_disjoint() {
        let all = [
            OrderState::PendingSubmit,
            OrderState::PendingCancel,
            OrderState::PreSubmitted,
            OrderState::Submitted,
            OrderState::ApiPending,
            OrderState::ApiCancelled,
            OrderState::Cancelled,
            OrderState::Filled,
            OrderState::Inactive,
        ];
        for s in all {
            assert!(
                !(s.is_active() && s.is_done()),
                "{s} is both active and done"
            );
        }
        assert!(OrderState::Submitted.is_active());
        assert!(!OrderState::Submitted.is_done());
        assert!(OrderState::Filled.is_done());
        assert!(!OrderState::Filled.is_active());
        // Inactive is neither.
        assert!(!OrderState::Inactive.is_active());
        assert!(!OrderState::Inactive.is_done());
    }

    #[test]
    fn same_id_by_perm_or_session_pair() {
        let a = Order {
            client_id: 1,
            order_id: 7,
            perm_id: 0,
            ..Default::default()
        };
        let b = Order {
            client_id: 1,
            order_id: 7,
            perm_id: 123,
            ..Default::default()
        };
        let c = Order {
            client_id: 2,
            order_id: 9,
            perm_id: 123,
            ..Default::default()
        };
        assert!(a.has_same_id(&b));
        assert!(b.has_same_id(&c)); // shared perm id
        assert!(!a.has_same_id(&c));
    }

    #[test]
    fn fill_filter_matching() {
        let fill = Fill {
            contract: Contract::stock("AAPL", "SMART", "USD"),
            execution: Execution {
                exec_id: "0001.01".into(),
                acct_number: "DU123".into(),
                exchange: "NASDAQ".into(),
                side: "BOT".into(),
                shares: dec!(100),
                price: 187.5,
                client_id: 4,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut filter = ExecutionFilter::default();
        assert!(fill.matches(&filter));
        filter.symbol = "AAPL".into();
        filter.side = "BOT".into();
        assert!(fill.matches(&filter));
        filter.acct_code = "DU999".into();
        assert!(!fill.matches(&filter));
    }
}
