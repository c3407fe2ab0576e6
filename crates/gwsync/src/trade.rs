//! Per-order lifecycle aggregate.
//!
//! A [`Trade`] folds order-status, open-order and execution events into the
//! order's current status, its fill history and an append-only status log.
//! Reaching a terminal status closes the trade's [`DoneSignal`] exactly once;
//! callers block on it for synchronous "wait until the order finishes"
//! semantics. Transitions are driven exclusively by inbound events; the
//! aggregate never transitions itself.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, bounded};
use gwsync_core::error::CodeMsg;
use gwsync_core::types::{Contract, Fill, Order, OrderState, OrderStatusReport};

// ---------------------------------------------------------------------------
// Done signal
// ---------------------------------------------------------------------------

/// One-shot completion signal with idempotent close.
///
/// Closing drops the internal sender; every receiver clone, present or
/// future, then observes disconnection. A second close is a no-op, so
/// concurrent terminal-status delivery can never panic or double-close.
pub struct DoneSignal {
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

impl DoneSignal {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Close the signal. Idempotent.
    pub fn set(&self) {
        let mut tx = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        // Dropping the sender wakes every waiter.
        tx.take();
    }

    pub fn is_set(&self) -> bool {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }

    /// Block until the signal is set.
    pub fn wait(&self) {
        // No message is ever sent; recv returns only on disconnection.
        let _ = self.rx.recv();
    }

    /// Block until the signal is set or the deadline passes. Returns true
    /// when the signal was set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.rx.recv_timeout(timeout).is_err() && self.is_set()
    }
}

impl Default for DoneSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DoneSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DoneSignal").field("set", &self.is_set()).finish()
    }
}

// ---------------------------------------------------------------------------
// Trade log
// ---------------------------------------------------------------------------

/// One entry of a trade's status history.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeLogEntry {
    pub time: DateTime<Utc>,
    pub status: OrderState,
    pub message: String,
    pub error_code: i64,
}

/// Log message recorded when the caller modifies a working order. A
/// `Submitted` status arriving immediately after it is reported as
/// `"Modified"` rather than a fresh submission.
pub const MODIFY_MESSAGE: &str = "Modify";
const MODIFIED_MESSAGE: &str = "Modified";

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

struct TradeInner {
    contract: Contract,
    order: Order,
    status: OrderStatusReport,
    fills: Vec<Arc<Mutex<Fill>>>,
    log: Vec<TradeLogEntry>,
}

/// Full lifecycle of one order.
pub struct Trade {
    inner: Mutex<TradeInner>,
    done: DoneSignal,
}

impl Trade {
    pub fn new(contract: Contract, order: Order, now: DateTime<Utc>) -> Arc<Self> {
        let status = OrderStatusReport {
            order_id: order.order_id,
            client_id: order.client_id,
            perm_id: order.perm_id,
            ..Default::default()
        };
        let log = vec![TradeLogEntry {
            time: now,
            status: status.status,
            message: String::new(),
            error_code: 0,
        }];
        Arc::new(Self {
            inner: Mutex::new(TradeInner {
                contract,
                order,
                status,
                fills: Vec::new(),
                log,
            }),
            done: DoneSignal::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, TradeInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -- event folding (delivery thread) ------------------------------------

    /// Fold an order-status event. Appends a log entry on status change and
    /// closes the done signal on a terminal status.
    pub fn apply_status(&self, report: OrderStatusReport, now: DateTime<Utc>) {
        let done = {
            let mut t = self.lock();
            let changed = t.status.status != report.status;
            if changed {
                let message = match t.log.last() {
                    Some(last)
                        if report.status == OrderState::Submitted
                            && last.message == MODIFY_MESSAGE =>
                    {
                        MODIFIED_MESSAGE.to_string()
                    }
                    _ => String::new(),
                };
                t.log.push(TradeLogEntry {
                    time: now,
                    status: report.status,
                    message,
                    error_code: 0,
                });
            }
            t.status = report;
            t.status.is_done()
        };
        if done {
            self.done.set();
        }
    }

    /// Fold an open-order (or completed-order) event: refresh the order
    /// parameters the gateway echoed back, then fold the attached status.
    pub fn apply_open_order(
        &self,
        order: Order,
        report: OrderStatusReport,
        now: DateTime<Utc>,
    ) {
        {
            let mut t = self.lock();
            t.order = order;
        }
        self.apply_status(report, now);
    }

    /// Record a caller-initiated modification of a working order.
    pub fn log_modify(&self, now: DateTime<Utc>) {
        let mut t = self.lock();
        let status = t.status.status;
        t.log.push(TradeLogEntry {
            time: now,
            status,
            message: MODIFY_MESSAGE.to_string(),
            error_code: 0,
        });
    }

    /// Append one fill and its log entry. Idempotency by execution id is
    /// enforced upstream by the state store.
    pub fn add_fill(&self, fill: Arc<Mutex<Fill>>, now: DateTime<Utc>) {
        let (side, shares, price) = {
            let f = fill.lock().unwrap_or_else(|e| e.into_inner());
            (
                f.execution.side.clone(),
                f.execution.shares,
                f.execution.price,
            )
        };
        let mut t = self.lock();
        let status = t.status.status;
        t.log.push(TradeLogEntry {
            time: now,
            status,
            message: format!("{side} {shares} @ {price}"),
            error_code: 0,
        });
        t.fills.push(fill);
    }

    /// Record a gateway error or warning against the trade's log. Warnings
    /// and errors never transition the status by themselves.
    pub fn log_error(&self, cm: &CodeMsg, now: DateTime<Utc>) {
        let mut t = self.lock();
        let status = t.status.status;
        t.log.push(TradeLogEntry {
            time: now,
            status,
            message: cm.message.clone(),
            error_code: cm.code,
        });
    }

    // -- reads --------------------------------------------------------------

    pub fn contract(&self) -> Contract {
        self.lock().contract.clone()
    }

    pub fn order(&self) -> Order {
        self.lock().order.clone()
    }

    pub fn status(&self) -> OrderStatusReport {
        self.lock().status.clone()
    }

    pub fn is_active(&self) -> bool {
        self.lock().status.is_active()
    }

    pub fn is_done(&self) -> bool {
        self.lock().status.is_done()
    }

    /// Snapshot of the fills, commissions included as patched so far.
    pub fn fills(&self) -> Vec<Fill> {
        self.lock()
            .fills
            .iter()
            .map(|f| f.lock().unwrap_or_else(|e| e.into_inner()).clone())
            .collect()
    }

    pub fn log(&self) -> Vec<TradeLogEntry> {
        self.lock().log.clone()
    }

    /// The completion signal. Set when the trade reaches a terminal status.
    pub fn done(&self) -> &DoneSignal {
        &self.done
    }

    /// Block until the trade reaches a terminal status or the deadline
    /// passes. Returns true when the trade finished.
    pub fn wait_done(&self, timeout: Duration) -> bool {
        self.done.wait_timeout(timeout)
    }

    /// Same gateway order: matching permanent id, or matching session pair.
    pub fn is_same_order(&self, other: &Trade) -> bool {
        self.lock().order.has_same_id(&other.lock().order)
    }
}

impl std::fmt::Debug for Trade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = self.lock();
        f.debug_struct("Trade")
            .field("contract", &t.contract)
            .field("order_id", &t.order.order_id)
            .field("status", &t.status.status)
            .field("fills", &t.fills.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwsync_core::types::Execution;
    use rust_decimal_macros::dec;
    use std::thread;

    fn trade() -> Arc<Trade> {
        let order = Order {
            order_id: 1,
            client_id: 9,
            action: "BUY".into(),
            total_quantity: dec!(100),
            ..Default::default()
        };
        Trade::new(Contract::stock("AAPL", "SMART", "USD"), order, Utc::now())
    }

    fn report(status: OrderState) -> OrderStatusReport {
        OrderStatusReport {
            order_id: 1,
            client_id: 9,
            status,
            ..Default::default()
        }
    }

    #[test]
    fn status_changes_append_log_entries() {
        let t = trade();
        assert_eq!(t.log().len(), 1);
        t.apply_status(report(OrderState::Submitted), Utc::now());
        t.apply_status(report(OrderState::Submitted), Utc::now());
        assert_eq!(t.log().len(), 2);
        t.apply_status(report(OrderState::Filled), Utc::now());
        let log = t.log();
        assert_eq!(log.len(), 3);
        assert_eq!(log[2].status, OrderState::Filled);
    }

    #[test]
    fn terminal_status_sets_done() {
        let t = trade();
        assert!(!t.done().is_set());
        t.apply_status(report(OrderState::Submitted), Utc::now());
        assert!(!t.done().is_set());
        t.apply_status(report(OrderState::Cancelled), Utc::now());
        assert!(t.done().is_set());
        assert!(t.wait_done(Duration::from_millis(100)));
    }

    #[test]
    fn done_signal_closes_once_under_concurrent_terminal_delivery() {
        let t = trade();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let t = Arc::clone(&t);
            handles.push(thread::spawn(move || {
                t.apply_status(report(OrderState::Filled), Utc::now());
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert!(t.done().is_set());
    }

    #[test]
    fn waiters_wake_on_done() {
        let t = trade();
        let waiter = {
            let t = Arc::clone(&t);
            thread::spawn(move || t.wait_done(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        t.apply_status(report(OrderState::Filled), Utc::now());
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn wait_times_out_while_active() {
        let t = trade();
        t.apply_status(report(OrderState::Submitted), Utc::now());
        assert!(!t.wait_done(Duration::from_millis(20)));
    }

    #[test]
    fn submitted_directly_after_modify_logs_modified() {
        let t = trade();
        t.apply_status(report(OrderState::PreSubmitted), Utc::now());
        t.log_modify(Utc::now());
        t.apply_status(report(OrderState::Submitted), Utc::now());
        assert_eq!(t.log().last().unwrap().message, "Modified");
    }

    #[test]
    fn submitted_without_preceding_modify_logs_plain() {
        let t = trade();
        t.apply_status(report(OrderState::PreSubmitted), Utc::now());
        t.apply_status(report(OrderState::Submitted), Utc::now());
        assert_eq!(t.log().last().unwrap().message, "");
    }

    #[test]
    fn fills_and_commission_patches_are_visible() {
        let t = trade();
        let fill = Arc::new(Mutex::new(Fill {
            contract: Contract::stock("AAPL", "SMART", "USD"),
            execution: Execution {
                exec_id: "e1".into(),
                side: "BOT".into(),
                shares: dec!(40),
                price: 187.0,
                ..Default::default()
            },
            ..Default::default()
        }));
        t.add_fill(Arc::clone(&fill), Utc::now());
        assert!(t.fills()[0].commission_report.is_pending());

        // Commission arrives later and patches the shared fill.
        fill.lock().unwrap().commission_report.exec_id = "e1".into();
        fill.lock().unwrap().commission_report.commission = 1.25;
        assert_eq!(t.fills()[0].commission_report.commission, 1.25);

        let log = t.log();
        assert!(log.last().unwrap().message.contains("BOT 40 @ 187"));
    }

    #[test]
    fn error_log_entries_do_not_transition() {
        let t = trade();
        t.apply_status(report(OrderState::Submitted), Utc::now());
        t.log_error(&CodeMsg::new(2104, "farm connection ok"), Utc::now());
        assert!(t.is_active());
        assert_eq!(t.log().last().unwrap().error_code, 2104);
    }
}
