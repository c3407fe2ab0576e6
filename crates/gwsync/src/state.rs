//! Authoritative session state.
//!
//! One mutex guards every table because several events touch more than one
//! table in a single logical update (an execution records a fill and mutates
//! the owning trade). The lock is held only to look entries up or move them;
//! tickers and trades are internally synchronized and are worked on after the
//! store lock is released.
//!
//! Tickers are arena-owned: the store hands out stable [`TickerId`] handles
//! and keeps independent index maps (request id, contract id) pointing at the
//! arena, never at raw instances. Trades are keyed by [`OrderKey`] with a
//! secondary permanent-id index.
//!
//! [`SessionState::reset`] replaces the whole table set instead of clearing
//! in place, so a reader holding data from before a reconnect sees stale but
//! never corrupt values.

use std::sync::{Arc, Mutex, MutexGuard};

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use gwsync_core::types::{
    AccountValue, CommissionReport, Contract, Fill, NewsBulletin, Order, Pnl, PnlSingle,
    PortfolioItem, Position,
};
use rust_decimal::Decimal;

use crate::ticker::Ticker;
use crate::trade::Trade;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Stable handle to an arena-owned ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickerId(u64);

/// Kind of streaming market-data request attached to a ticker. One ticker
/// can serve several concurrently active streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    MarketData,
    Depth,
    TickByTick,
}

/// Primary key of a trade: the session pair while the session order id is
/// known, the broker's permanent id otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderKey {
    Session { client_id: i64, order_id: i64 },
    Perm(i64),
}

impl OrderKey {
    /// Canonical key construction, shared by every call site so lookups and
    /// writes agree.
    pub fn of(client_id: i64, order_id: i64, perm_id: i64) -> Self {
        if order_id > 0 {
            Self::Session {
                client_id,
                order_id,
            }
        } else {
            Self::Perm(perm_id)
        }
    }
}

type AccountValueKey = (String, String, String, String);

// ---------------------------------------------------------------------------
// Inner tables
// ---------------------------------------------------------------------------

struct StateInner {
    accounts: Vec<String>,
    account_values: AHashMap<AccountValueKey, AccountValue>,
    portfolio: AHashMap<(String, i64), PortfolioItem>,
    positions: AHashMap<(String, i64), Position>,

    trades: AHashMap<OrderKey, Arc<Trade>>,
    perm_index: AHashMap<i64, OrderKey>,
    fills: AHashMap<String, Arc<Mutex<Fill>>>,

    tickers: AHashMap<TickerId, Arc<Ticker>>,
    next_ticker_id: u64,
    req_to_ticker: AHashMap<i64, TickerId>,
    con_to_ticker: AHashMap<i64, TickerId>,
    stream_to_req: AHashMap<(StreamKind, TickerId), i64>,

    pnl: AHashMap<i64, Pnl>,
    pnl_req_by_key: AHashMap<(String, String), i64>,
    pnl_single: AHashMap<i64, PnlSingle>,
    pnl_single_req_by_key: AHashMap<(String, String, i64), i64>,

    news_bulletins: AHashMap<i64, NewsBulletin>,

    next_valid_id: i64,
}

impl StateInner {
    fn new() -> Self {
        Self {
            accounts: Vec::new(),
            account_values: AHashMap::new(),
            portfolio: AHashMap::new(),
            positions: AHashMap::new(),
            trades: AHashMap::new(),
            perm_index: AHashMap::new(),
            fills: AHashMap::new(),
            tickers: AHashMap::new(),
            next_ticker_id: 1,
            req_to_ticker: AHashMap::new(),
            con_to_ticker: AHashMap::new(),
            stream_to_req: AHashMap::new(),
            pnl: AHashMap::new(),
            pnl_req_by_key: AHashMap::new(),
            pnl_single: AHashMap::new(),
            pnl_single_req_by_key: AHashMap::new(),
            news_bulletins: AHashMap::new(),
            next_valid_id: 0,
        }
    }
}

/// The session's in-memory database.
pub struct SessionState {
    inner: Mutex<StateInner>,
}

impl SessionState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(StateInner::new()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reinitialize everything, used on reconnect. The old tables are
    /// replaced wholesale, not mutated.
    pub fn reset(&self) {
        *self.lock() = StateInner::new();
    }

    // -- accounts -----------------------------------------------------------

    pub fn set_managed_accounts(&self, accounts: Vec<String>) {
        self.lock().accounts = accounts;
    }

    pub fn managed_accounts(&self) -> Vec<String> {
        self.lock().accounts.clone()
    }

    pub fn update_account_value(&self, value: AccountValue) {
        let key = (
            value.account.clone(),
            value.tag.clone(),
            value.currency.clone(),
            value.model_code.clone(),
        );
        self.lock().account_values.insert(key, value);
    }

    /// Snapshot of all account values, optionally scoped to one account.
    pub fn account_values(&self, account: Option<&str>) -> Vec<AccountValue> {
        let t = self.lock();
        t.account_values
            .values()
            .filter(|v| account.map_or(true, |a| v.account == a))
            .cloned()
            .collect()
    }

    // -- portfolio and positions --------------------------------------------

    /// Upsert a portfolio item; a zero quantity removes the entry.
    pub fn update_portfolio(&self, item: PortfolioItem) {
        let key = (item.account.clone(), item.contract.con_id);
        let mut t = self.lock();
        if item.position == Decimal::ZERO {
            t.portfolio.remove(&key);
        } else {
            t.portfolio.insert(key, item);
        }
    }

    pub fn portfolio(&self, account: &str) -> Vec<PortfolioItem> {
        let t = self.lock();
        t.portfolio
            .iter()
            .filter(|((acct, _), _)| acct == account)
            .map(|(_, item)| item.clone())
            .collect()
    }

    /// Upsert a position; a zero quantity removes the entry.
    pub fn update_position(&self, position: Position) {
        let key = (position.account.clone(), position.contract.con_id);
        let mut t = self.lock();
        if position.position == Decimal::ZERO {
            t.positions.remove(&key);
        } else {
            t.positions.insert(key, position);
        }
    }

    pub fn positions(&self) -> Vec<Position> {
        self.lock().positions.values().cloned().collect()
    }

    // -- order id watermark -------------------------------------------------

    /// Advance the next-valid-id watermark strictly past an observed order
    /// id. Ids from any client count, so sessions sharing a gateway cannot
    /// collide.
    pub fn observe_order_id(&self, order_id: i64) {
        let mut t = self.lock();
        if order_id >= t.next_valid_id {
            t.next_valid_id = order_id + 1;
        }
    }

    pub fn set_next_valid_id(&self, id: i64) {
        let mut t = self.lock();
        if id > t.next_valid_id {
            t.next_valid_id = id;
        }
    }

    pub fn peek_next_valid_id(&self) -> i64 {
        self.lock().next_valid_id
    }

    /// Claim the next order id, advancing the watermark.
    pub fn take_next_valid_id(&self) -> i64 {
        let mut t = self.lock();
        let id = t.next_valid_id;
        t.next_valid_id += 1;
        id
    }

    // -- trades -------------------------------------------------------------

    /// Find a trade by its identifiers, consulting the permanent-id index
    /// when the session pair misses.
    pub fn trade(&self, client_id: i64, order_id: i64, perm_id: i64) -> Option<Arc<Trade>> {
        let t = self.lock();
        let key = OrderKey::of(client_id, order_id, perm_id);
        if let Some(trade) = t.trades.get(&key) {
            return Some(Arc::clone(trade));
        }
        if perm_id != 0 {
            if let Some(key) = t.perm_index.get(&perm_id) {
                return t.trades.get(key).map(Arc::clone);
            }
        }
        None
    }

    /// Find or create the trade for an order. Creation registers both the
    /// primary key and, when known, the permanent-id index entry.
    pub fn ensure_trade(
        &self,
        contract: &Contract,
        order: &Order,
        now: DateTime<Utc>,
    ) -> Arc<Trade> {
        if let Some(existing) = self.trade(order.client_id, order.order_id, order.perm_id) {
            if order.perm_id != 0 {
                let key = OrderKey::of(order.client_id, order.order_id, order.perm_id);
                self.lock().perm_index.insert(order.perm_id, key);
            }
            return existing;
        }
        let key = OrderKey::of(order.client_id, order.order_id, order.perm_id);
        let trade = Trade::new(contract.clone(), order.clone(), now);
        let mut t = self.lock();
        if order.perm_id != 0 {
            t.perm_index.insert(order.perm_id, key);
        }
        Arc::clone(t.trades.entry(key).or_insert(trade))
    }

    /// Find a trade knowing only the session order id, as error events do.
    pub fn trade_by_order_id(&self, order_id: i64) -> Option<Arc<Trade>> {
        let t = self.lock();
        t.trades
            .iter()
            .find(|(key, _)| matches!(key, OrderKey::Session { order_id: id, .. } if *id == order_id))
            .map(|(_, trade)| Arc::clone(trade))
    }

    pub fn trades(&self) -> Vec<Arc<Trade>> {
        self.lock().trades.values().cloned().collect()
    }

    pub fn open_trades(&self) -> Vec<Arc<Trade>> {
        self.lock()
            .trades
            .values()
            .filter(|t| t.is_active())
            .cloned()
            .collect()
    }

    // -- fills --------------------------------------------------------------

    /// Record a fill once per execution id. Returns the shared handle for a
    /// first-time record, `None` for a redelivery.
    pub fn record_fill(&self, fill: Fill) -> Option<Arc<Mutex<Fill>>> {
        let exec_id = fill.execution.exec_id.clone();
        let mut t = self.lock();
        if t.fills.contains_key(&exec_id) {
            return None;
        }
        let shared = Arc::new(Mutex::new(fill));
        t.fills.insert(exec_id, Arc::clone(&shared));
        Some(shared)
    }

    /// Patch the commission of an already-recorded fill in place. Returns
    /// false when no fill with that execution id exists.
    pub fn apply_commission(&self, report: CommissionReport) -> bool {
        let shared = {
            let t = self.lock();
            t.fills.get(&report.exec_id).map(Arc::clone)
        };
        match shared {
            Some(fill) => {
                fill.lock().unwrap_or_else(|e| e.into_inner()).commission_report = report;
                true
            }
            None => false,
        }
    }

    pub fn fills(&self) -> Vec<Fill> {
        self.lock()
            .fills
            .values()
            .map(|f| f.lock().unwrap_or_else(|e| e.into_inner()).clone())
            .collect()
    }

    // -- tickers ------------------------------------------------------------

    /// Attach a streaming request to the contract's ticker, creating the
    /// ticker when the contract has none. One ticker may serve several
    /// concurrently active streams.
    pub fn start_ticker(
        &self,
        req_id: i64,
        contract: &Contract,
        kind: StreamKind,
    ) -> Arc<Ticker> {
        let mut t = self.lock();
        let existing = if contract.con_id != 0 {
            t.con_to_ticker.get(&contract.con_id).copied()
        } else {
            None
        };
        let id = match existing {
            Some(id) => id,
            None => {
                let id = TickerId(t.next_ticker_id);
                t.next_ticker_id += 1;
                t.tickers.insert(id, Ticker::new(contract.clone()));
                if contract.con_id != 0 {
                    t.con_to_ticker.insert(contract.con_id, id);
                }
                id
            }
        };
        t.req_to_ticker.insert(req_id, id);
        t.stream_to_req.insert((kind, id), req_id);
        // The arena owns the ticker for the whole session.
        Arc::clone(&t.tickers[&id])
    }

    /// Detach a request from its ticker on cancel. The ticker itself stays
    /// in the arena; only the request mapping goes away.
    pub fn end_ticker(&self, req_id: i64, kind: StreamKind) {
        let mut t = self.lock();
        if let Some(id) = t.req_to_ticker.remove(&req_id) {
            t.stream_to_req.remove(&(kind, id));
        }
    }

    pub fn ticker_by_req(&self, req_id: i64) -> Option<Arc<Ticker>> {
        let t = self.lock();
        let id = t.req_to_ticker.get(&req_id)?;
        t.tickers.get(id).map(Arc::clone)
    }

    pub fn ticker_by_con(&self, con_id: i64) -> Option<Arc<Ticker>> {
        let t = self.lock();
        let id = t.con_to_ticker.get(&con_id)?;
        t.tickers.get(id).map(Arc::clone)
    }

    /// The request id a given stream kind has open on a contract's ticker,
    /// used by cancel paths.
    pub fn stream_req_id(&self, con_id: i64, kind: StreamKind) -> Option<i64> {
        let t = self.lock();
        let id = t.con_to_ticker.get(&con_id)?;
        t.stream_to_req.get(&(kind, *id)).copied()
    }

    pub fn tickers(&self) -> Vec<Arc<Ticker>> {
        self.lock().tickers.values().cloned().collect()
    }

    // -- P&L subscriptions --------------------------------------------------

    pub fn start_pnl(&self, req_id: i64, account: &str, model_code: &str) {
        let mut t = self.lock();
        t.pnl.insert(
            req_id,
            Pnl {
                account: account.into(),
                model_code: model_code.into(),
                ..Default::default()
            },
        );
        t.pnl_req_by_key
            .insert((account.into(), model_code.into()), req_id);
    }

    pub fn update_pnl(&self, req_id: i64, daily: f64, unrealized: f64, realized: f64) -> bool {
        let mut t = self.lock();
        match t.pnl.get_mut(&req_id) {
            Some(p) => {
                p.daily_pnl = daily;
                p.unrealized_pnl = unrealized;
                p.realized_pnl = realized;
                true
            }
            None => false,
        }
    }

    pub fn end_pnl(&self, req_id: i64) {
        let mut t = self.lock();
        if let Some(p) = t.pnl.remove(&req_id) {
            t.pnl_req_by_key.remove(&(p.account, p.model_code));
        }
    }

    pub fn pnl(&self, account: &str, model_code: &str) -> Option<Pnl> {
        let t = self.lock();
        let req_id = t.pnl_req_by_key.get(&(account.into(), model_code.into()))?;
        t.pnl.get(req_id).cloned()
    }

    pub fn start_pnl_single(&self, req_id: i64, account: &str, model_code: &str, con_id: i64) {
        let mut t = self.lock();
        t.pnl_single.insert(
            req_id,
            PnlSingle {
                account: account.into(),
                model_code: model_code.into(),
                con_id,
                ..Default::default()
            },
        );
        t.pnl_single_req_by_key
            .insert((account.into(), model_code.into(), con_id), req_id);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_pnl_single(
        &self,
        req_id: i64,
        position: Decimal,
        daily: f64,
        unrealized: f64,
        realized: f64,
        value: f64,
    ) -> bool {
        let mut t = self.lock();
        match t.pnl_single.get_mut(&req_id) {
            Some(p) => {
                p.position = position;
                p.daily_pnl = daily;
                p.unrealized_pnl = unrealized;
                p.realized_pnl = realized;
                p.value = value;
                true
            }
            None => false,
        }
    }

    pub fn end_pnl_single(&self, req_id: i64) {
        let mut t = self.lock();
        if let Some(p) = t.pnl_single.remove(&req_id) {
            t.pnl_single_req_by_key
                .remove(&(p.account, p.model_code, p.con_id));
        }
    }

    pub fn pnl_single(&self, account: &str, model_code: &str, con_id: i64) -> Option<PnlSingle> {
        let t = self.lock();
        let req_id = t
            .pnl_single_req_by_key
            .get(&(account.into(), model_code.into(), con_id))?;
        t.pnl_single.get(req_id).cloned()
    }

    // -- news ---------------------------------------------------------------

    pub fn add_news_bulletin(&self, bulletin: NewsBulletin) {
        self.lock().news_bulletins.insert(bulletin.msg_id, bulletin);
    }

    pub fn news_bulletins(&self) -> Vec<NewsBulletin> {
        self.lock().news_bulletins.values().cloned().collect()
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = self.lock();
        f.debug_struct("SessionState")
            .field("trades", &t.trades.len())
            .field("fills", &t.fills.len())
            .field("tickers", &t.tickers.len())
            .field("positions", &t.positions.len())
            .field("next_valid_id", &t.next_valid_id)
            .finish()
    }
}
