//! Per-instrument market-data aggregate.
//!
//! One [`Ticker`] exists per actively-quoted contract. The event router folds
//! every tick category into it on the delivery thread; caller threads read
//! snapshots concurrently. The aggregate carries its own lock, independent of
//! the store lock; the store lock is only ever used to look the instance up.
//!
//! Update rules:
//! - previous-value fields (`prev_bid`, `prev_last`, ...) change only when
//!   the current value actually changes, so callers can detect movement
//! - an unchanged bid, ask or last price is a redelivered quote: it is
//!   dropped with no field mutation and no history append
//! - a last-size update is dropped while no last price has ever been
//!   recorded; price is the signal that a trade happened
//! - unknown tick-type codes are logged and ignored, with no field mutation
//!   and no history append

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use gwsync_core::time_util::parse_gateway_time;
use gwsync_core::types::{
    BookOp, BookSide, Contract, DepthUpdate, Dividends, DomLevel, FundamentalRatios, GenericField,
    GreeksSlot, OptionGreeks, PriceField, SizeField, StringField, TickAttrib, TickByTick,
    TickByTickAllLast, TickByTickBidAsk, TickByTickMidPoint, TickCode, TickRecord,
};
use rust_decimal::Decimal;

// ---------------------------------------------------------------------------
// Inner state
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct TickerInner {
    time: Option<DateTime<Utc>>,

    bid: f64,
    prev_bid: f64,
    bid_size: Decimal,
    prev_bid_size: Decimal,
    ask: f64,
    prev_ask: f64,
    ask_size: Decimal,
    prev_ask_size: Decimal,
    last: f64,
    prev_last: f64,
    last_size: Decimal,
    prev_last_size: Decimal,

    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: Decimal,

    low_13_week: f64,
    high_13_week: f64,
    low_26_week: f64,
    high_26_week: f64,
    low_52_week: f64,
    high_52_week: f64,

    mark_price: f64,
    auction_price: f64,
    auction_volume: Decimal,
    auction_imbalance: Decimal,
    regulatory_imbalance: Decimal,
    bid_yield: f64,
    ask_yield: f64,
    last_yield: f64,

    avg_volume: Decimal,
    call_open_interest: Decimal,
    put_open_interest: Decimal,
    call_volume: Decimal,
    put_volume: Decimal,
    futures_open_interest: Decimal,
    avg_option_volume: Decimal,
    shortable_shares: Decimal,

    hist_volatility: f64,
    implied_volatility: f64,
    rt_hist_volatility: f64,
    index_future_premium: f64,
    halted: f64,
    trade_count: f64,
    trade_rate: f64,
    volume_rate: f64,

    bid_exchange: String,
    ask_exchange: String,
    last_exchange: String,
    last_timestamp: Option<DateTime<Utc>>,

    min_tick: f64,
    bbo_exchange: String,
    snapshot_permissions: i64,
    market_data_type: i64,

    rt_volume: Decimal,
    rt_time: Option<DateTime<Utc>>,
    vwap: f64,

    fundamental_ratios: FundamentalRatios,
    dividends: Dividends,

    bid_greeks: OptionGreeks,
    ask_greeks: OptionGreeks,
    last_greeks: OptionGreeks,
    model_greeks: OptionGreeks,

    ticks: Vec<TickRecord>,
    tick_by_ticks: Vec<TickByTick>,

    dom_bids: BTreeMap<i64, DomLevel>,
    dom_asks: BTreeMap<i64, DomLevel>,
    dom_ticks: Vec<DepthUpdate>,
}

impl TickerInner {
    fn new() -> Self {
        Self {
            time: None,
            bid: f64::NAN,
            prev_bid: f64::NAN,
            bid_size: Decimal::ZERO,
            prev_bid_size: Decimal::ZERO,
            ask: f64::NAN,
            prev_ask: f64::NAN,
            ask_size: Decimal::ZERO,
            prev_ask_size: Decimal::ZERO,
            last: f64::NAN,
            prev_last: f64::NAN,
            last_size: Decimal::ZERO,
            prev_last_size: Decimal::ZERO,
            open: f64::NAN,
            high: f64::NAN,
            low: f64::NAN,
            close: f64::NAN,
            volume: Decimal::ZERO,
            low_13_week: f64::NAN,
            high_13_week: f64::NAN,
            low_26_week: f64::NAN,
            high_26_week: f64::NAN,
            low_52_week: f64::NAN,
            high_52_week: f64::NAN,
            mark_price: f64::NAN,
            auction_price: f64::NAN,
            auction_volume: Decimal::ZERO,
            auction_imbalance: Decimal::ZERO,
            regulatory_imbalance: Decimal::ZERO,
            bid_yield: f64::NAN,
            ask_yield: f64::NAN,
            last_yield: f64::NAN,
            avg_volume: Decimal::ZERO,
            call_open_interest: Decimal::ZERO,
            put_open_interest: Decimal::ZERO,
            call_volume: Decimal::ZERO,
            put_volume: Decimal::ZERO,
            futures_open_interest: Decimal::ZERO,
            avg_option_volume: Decimal::ZERO,
            shortable_shares: Decimal::ZERO,
            hist_volatility: f64::NAN,
            implied_volatility: f64::NAN,
            rt_hist_volatility: f64::NAN,
            index_future_premium: f64::NAN,
            halted: f64::NAN,
            trade_count: f64::NAN,
            trade_rate: f64::NAN,
            volume_rate: f64::NAN,
            bid_exchange: String::new(),
            ask_exchange: String::new(),
            last_exchange: String::new(),
            last_timestamp: None,
            min_tick: f64::NAN,
            bbo_exchange: String::new(),
            snapshot_permissions: 0,
            market_data_type: 0,
            rt_volume: Decimal::ZERO,
            rt_time: None,
            vwap: f64::NAN,
            fundamental_ratios: FundamentalRatios::new(),
            dividends: Dividends::default(),
            bid_greeks: OptionGreeks::default(),
            ask_greeks: OptionGreeks::default(),
            last_greeks: OptionGreeks::default(),
            model_greeks: OptionGreeks::default(),
            ticks: Vec::new(),
            tick_by_ticks: Vec::new(),
            dom_bids: BTreeMap::new(),
            dom_asks: BTreeMap::new(),
            dom_ticks: Vec::new(),
        }
    }
}

/// Set `current` from `new`, moving the old value into `prev` only on change.
fn set_price(current: &mut f64, prev: &mut f64, new: f64) {
    if *current != new && !(current.is_nan() && new.is_nan()) {
        *prev = *current;
        *current = new;
    }
}

fn set_size(current: &mut Decimal, prev: &mut Decimal, new: Decimal) {
    if *current != new {
        *prev = *current;
        *current = new;
    }
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// Live market-data aggregate for one contract.
pub struct Ticker {
    contract: Contract,
    inner: Mutex<TickerInner>,
}

impl Ticker {
    pub fn new(contract: Contract) -> Arc<Self> {
        Arc::new(Self {
            contract,
            inner: Mutex::new(TickerInner::new()),
        })
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    fn lock(&self) -> MutexGuard<'_, TickerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -- update operations (delivery thread) --------------------------------

    /// Fold a price tick. A redelivered bid, ask or last quote (value equal
    /// to the current one) is dropped without touching the history.
    pub fn apply_price(&self, code: TickCode, price: f64, _attrib: TickAttrib, now: DateTime<Utc>) {
        let Some(field) = PriceField::from_code(code) else {
            tracing::warn!(code, contract = %self.contract, "unknown price tick code");
            return;
        };
        let mut t = self.lock();
        let t = &mut *t;
        match field {
            PriceField::Bid => {
                if price == t.bid {
                    return;
                }
                t.prev_bid = t.bid;
                t.bid = price;
            }
            PriceField::Ask => {
                if price == t.ask {
                    return;
                }
                t.prev_ask = t.ask;
                t.ask = price;
            }
            PriceField::Last => {
                if price == t.last {
                    return;
                }
                t.prev_last = t.last;
                t.last = price;
            }
            PriceField::High => t.high = price,
            PriceField::Low => t.low = price,
            PriceField::Open => t.open = price,
            PriceField::Close => t.close = price,
            PriceField::Low13Week => t.low_13_week = price,
            PriceField::High13Week => t.high_13_week = price,
            PriceField::Low26Week => t.low_26_week = price,
            PriceField::High26Week => t.high_26_week = price,
            PriceField::Low52Week => t.low_52_week = price,
            PriceField::High52Week => t.high_52_week = price,
            PriceField::AuctionPrice => t.auction_price = price,
            PriceField::MarkPrice => t.mark_price = price,
            PriceField::BidYield => t.bid_yield = price,
            PriceField::AskYield => t.ask_yield = price,
            PriceField::LastYield => t.last_yield = price,
        }
        t.time = Some(now);
        t.ticks.push(TickRecord {
            time: now,
            code,
            price,
            size: Decimal::ZERO,
        });
    }

    /// Fold a size tick. Redelivered bid and ask sizes are dropped; a
    /// last-size tick is recorded whenever a last price exists, changed or
    /// not, since each one reflects a trade. The history record carries the
    /// matching quote price when one applies.
    pub fn apply_size(&self, code: TickCode, size: Decimal, now: DateTime<Utc>) {
        let Some(field) = SizeField::from_code(code) else {
            tracing::warn!(code, contract = %self.contract, "unknown size tick code");
            return;
        };
        let mut t = self.lock();
        let t = &mut *t;
        let mut price = f64::NAN;
        match field {
            SizeField::BidSize => {
                if size == t.bid_size {
                    return;
                }
                price = t.bid;
                t.prev_bid_size = t.bid_size;
                t.bid_size = size;
            }
            SizeField::AskSize => {
                if size == t.ask_size {
                    return;
                }
                price = t.ask;
                t.prev_ask_size = t.ask_size;
                t.ask_size = size;
            }
            SizeField::LastSize => {
                // No last price yet means no trade to size.
                if t.last.is_nan() {
                    return;
                }
                price = t.last;
                if size != t.last_size {
                    t.prev_last_size = t.last_size;
                    t.last_size = size;
                }
            }
            SizeField::Volume => t.volume = size,
            SizeField::AvgVolume => t.avg_volume = size,
            SizeField::CallOpenInterest => t.call_open_interest = size,
            SizeField::PutOpenInterest => t.put_open_interest = size,
            SizeField::CallVolume => t.call_volume = size,
            SizeField::PutVolume => t.put_volume = size,
            SizeField::AuctionVolume => t.auction_volume = size,
            SizeField::AuctionImbalance => t.auction_imbalance = size,
            SizeField::RegulatoryImbalance => t.regulatory_imbalance = size,
            SizeField::FuturesOpenInterest => t.futures_open_interest = size,
            SizeField::AvgOptionVolume => t.avg_option_volume = size,
            SizeField::ShortableShares => t.shortable_shares = size,
        }
        t.time = Some(now);
        t.ticks.push(TickRecord {
            time: now,
            code,
            price,
            size,
        });
    }

    /// Fold an option-computation tick into one of the four greeks slots.
    pub fn apply_option_computation(&self, code: TickCode, greeks: OptionGreeks) {
        let Some(slot) = GreeksSlot::from_code(code) else {
            tracing::warn!(code, contract = %self.contract, "unknown option computation code");
            return;
        };
        let mut t = self.lock();
        match slot {
            GreeksSlot::Bid => t.bid_greeks = greeks,
            GreeksSlot::Ask => t.ask_greeks = greeks,
            GreeksSlot::Last => t.last_greeks = greeks,
            GreeksSlot::Model => t.model_greeks = greeks,
        }
    }

    /// Record the request parameters the gateway reports once per stream.
    pub fn set_req_params(&self, min_tick: f64, bbo_exchange: &str, snapshot_permissions: i64) {
        let mut t = self.lock();
        t.min_tick = min_tick;
        t.bbo_exchange = bbo_exchange.into();
        t.snapshot_permissions = snapshot_permissions;
    }

    /// Record the market data type (live, frozen, delayed) of the stream.
    pub fn set_market_data_type(&self, market_data_type: i64) {
        self.lock().market_data_type = market_data_type;
    }

    /// Fold a generic numeric tick.
    pub fn apply_generic(&self, code: TickCode, value: f64) {
        let Some(field) = GenericField::from_code(code) else {
            tracing::warn!(code, contract = %self.contract, "unknown generic tick code");
            return;
        };
        let mut t = self.lock();
        match field {
            GenericField::HistVolatility => t.hist_volatility = value,
            GenericField::ImpliedVolatility => t.implied_volatility = value,
            GenericField::IndexFuturePremium => t.index_future_premium = value,
            GenericField::Halted => t.halted = value,
            GenericField::TradeCount => t.trade_count = value,
            GenericField::TradeRate => t.trade_rate = value,
            GenericField::VolumeRate => t.volume_rate = value,
            GenericField::RtHistVolatility => t.rt_hist_volatility = value,
        }
    }

    /// Fold a string tick. Compound payloads parse per-field; a malformed
    /// field is logged and left at its previous value.
    pub fn apply_string(&self, code: TickCode, value: &str, now: DateTime<Utc>) {
        let Some(field) = StringField::from_code(code) else {
            tracing::warn!(code, contract = %self.contract, "unknown string tick code");
            return;
        };
        match field {
            StringField::BidExchange => self.lock().bid_exchange = value.into(),
            StringField::AskExchange => self.lock().ask_exchange = value.into(),
            StringField::LastExchange => self.lock().last_exchange = value.into(),
            StringField::LastTimestamp => match parse_gateway_time(value) {
                Ok(ts) => self.lock().last_timestamp = Some(ts),
                Err(err) => tracing::warn!(%err, value, "bad last-timestamp tick"),
            },
            StringField::FundamentalRatios => self.apply_fundamental_ratios(value),
            StringField::RtVolume | StringField::RtTradeVolume => {
                self.apply_rt_volume(code, value, now)
            }
            StringField::Dividends => self.apply_dividends(value),
        }
    }

    /// `"TAG=value;TAG=value;..."`.
    fn apply_fundamental_ratios(&self, payload: &str) {
        let mut t = self.lock();
        for pair in payload.split(';').filter(|p| !p.is_empty()) {
            let Some((tag, raw)) = pair.split_once('=') else {
                tracing::warn!(pair, "malformed fundamental ratio entry");
                continue;
            };
            match raw.parse::<f64>() {
                // -99999.99 is the gateway's unset sentinel.
                Ok(v) if v != -99999.99 => {
                    t.fundamental_ratios.insert(tag.to_string(), v);
                }
                Ok(_) => {}
                Err(_) => tracing::warn!(tag, raw, "unparseable fundamental ratio value"),
            }
        }
    }

    /// `"price;size;timeMillis;totalVolume;vwap;singleTrade"`. Empty price
    /// means a volume-only report.
    fn apply_rt_volume(&self, code: TickCode, payload: &str, now: DateTime<Utc>) {
        let parts: Vec<&str> = payload.split(';').collect();
        if parts.len() < 5 {
            tracing::warn!(code, payload, "malformed rt-volume tick");
            return;
        }
        let mut t = self.lock();
        let t = &mut *t;
        t.time = Some(now);
        if !parts[0].is_empty() {
            match (parts[0].parse::<f64>(), parts[1].parse::<Decimal>()) {
                (Ok(price), Ok(size)) => {
                    set_price(&mut t.last, &mut t.prev_last, price);
                    set_size(&mut t.last_size, &mut t.prev_last_size, size);
                    t.ticks.push(TickRecord {
                        time: now,
                        code,
                        price,
                        size,
                    });
                }
                _ => tracing::warn!(payload, "unparseable rt-volume trade fields"),
            }
        }
        if let Ok(millis) = parts[2].parse::<i64>() {
            t.rt_time = DateTime::from_timestamp_millis(millis);
        }
        match parts[3].parse::<Decimal>() {
            Ok(vol) => t.rt_volume = vol,
            Err(_) => tracing::warn!(raw = parts[3], "unparseable rt-volume total"),
        }
        match parts[4].parse::<f64>() {
            Ok(vwap) => t.vwap = vwap,
            Err(_) => tracing::warn!(raw = parts[4], "unparseable rt-volume vwap"),
        }
    }

    /// `"past12,next12,nextDate,nextAmount"`.
    fn apply_dividends(&self, payload: &str) {
        let parts: Vec<&str> = payload.split(',').collect();
        if parts.len() != 4 {
            tracing::warn!(payload, "malformed dividends tick");
            return;
        }
        let mut d = Dividends::default();
        match parts[0].parse::<f64>() {
            Ok(v) => d.past_12_months = v,
            Err(_) => tracing::warn!(raw = parts[0], "unparseable past dividends"),
        }
        match parts[1].parse::<f64>() {
            Ok(v) => d.next_12_months = v,
            Err(_) => tracing::warn!(raw = parts[1], "unparseable next dividends"),
        }
        if !parts[2].is_empty() {
            match parse_gateway_time(parts[2]) {
                Ok(ts) => d.next_date = Some(ts),
                Err(err) => tracing::warn!(%err, raw = parts[2], "unparseable dividend date"),
            }
        }
        match parts[3].parse::<f64>() {
            Ok(v) => d.next_amount = v,
            Err(_) => tracing::warn!(raw = parts[3], "unparseable next dividend amount"),
        }
        self.lock().dividends = d;
    }

    /// Fold one order-book mutation and append it to the depth log.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_book_update(
        &self,
        position: i64,
        market_maker: &str,
        op: BookOp,
        side: BookSide,
        price: f64,
        size: Decimal,
        is_smart_depth: bool,
        now: DateTime<Utc>,
    ) {
        let mut t = self.lock();
        t.time = Some(now);
        let book = match side {
            BookSide::Bid => &mut t.dom_bids,
            BookSide::Ask => &mut t.dom_asks,
        };
        match op {
            BookOp::Upsert => {
                book.insert(
                    position,
                    DomLevel {
                        price,
                        size,
                        market_maker: market_maker.into(),
                    },
                );
            }
            BookOp::Delete => {
                book.remove(&position);
            }
        }
        t.dom_ticks.push(DepthUpdate {
            time: now,
            position,
            market_maker: market_maker.into(),
            side,
            op,
            price,
            size,
            is_smart_depth,
        });
    }

    /// Fold one tick-by-tick trade.
    pub fn apply_tick_by_tick_all_last(&self, tick: TickByTickAllLast, now: DateTime<Utc>) {
        let mut t = self.lock();
        let t = &mut *t;
        t.time = Some(now);
        set_price(&mut t.last, &mut t.prev_last, tick.price);
        set_size(&mut t.last_size, &mut t.prev_last_size, tick.size);
        t.tick_by_ticks.push(TickByTick::AllLast(tick));
    }

    /// Fold one tick-by-tick bid/ask update.
    pub fn apply_tick_by_tick_bid_ask(&self, tick: TickByTickBidAsk, now: DateTime<Utc>) {
        let mut t = self.lock();
        let t = &mut *t;
        t.time = Some(now);
        set_price(&mut t.bid, &mut t.prev_bid, tick.bid_price);
        set_price(&mut t.ask, &mut t.prev_ask, tick.ask_price);
        set_size(&mut t.bid_size, &mut t.prev_bid_size, tick.bid_size);
        set_size(&mut t.ask_size, &mut t.prev_ask_size, tick.ask_size);
        t.tick_by_ticks.push(TickByTick::BidAsk(tick));
    }

    /// Fold one tick-by-tick midpoint.
    pub fn apply_tick_by_tick_mid_point(&self, tick: TickByTickMidPoint, now: DateTime<Utc>) {
        let mut t = self.lock();
        t.time = Some(now);
        t.tick_by_ticks.push(TickByTick::MidPoint(tick));
    }

    // -- derived values -----------------------------------------------------

    /// Arithmetic mean of bid and ask; NaN unless both are present and
    /// positive.
    pub fn mid_point(&self) -> f64 {
        let t = self.lock();
        mid_point_of(t.bid, t.ask)
    }

    /// Best estimate of the current price. `last` when inside the spread,
    /// else the midpoint when a spread exists, else `last` unconditionally.
    pub fn market_price(&self) -> f64 {
        let t = self.lock();
        let mid = mid_point_of(t.bid, t.ask);
        if mid.is_nan() {
            return t.last;
        }
        if t.bid <= t.last && t.last <= t.ask {
            t.last
        } else {
            mid
        }
    }

    /// Best available greeks snapshot: average of bid and ask greeks when
    /// both exist, else last-trade greeks, else model greeks.
    pub fn greeks(&self) -> Option<OptionGreeks> {
        let t = self.lock();
        if !t.bid_greeks.is_empty() && !t.ask_greeks.is_empty() {
            return Some(average_greeks(&t.bid_greeks, &t.ask_greeks));
        }
        if !t.last_greeks.is_empty() {
            return Some(t.last_greeks);
        }
        if !t.model_greeks.is_empty() {
            return Some(t.model_greeks);
        }
        None
    }

    // -- snapshot reads -----------------------------------------------------

    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.lock().time
    }

    pub fn bid(&self) -> f64 {
        self.lock().bid
    }

    pub fn prev_bid(&self) -> f64 {
        self.lock().prev_bid
    }

    pub fn bid_size(&self) -> Decimal {
        self.lock().bid_size
    }

    pub fn ask(&self) -> f64 {
        self.lock().ask
    }

    pub fn prev_ask(&self) -> f64 {
        self.lock().prev_ask
    }

    pub fn ask_size(&self) -> Decimal {
        self.lock().ask_size
    }

    pub fn last(&self) -> f64 {
        self.lock().last
    }

    pub fn prev_last(&self) -> f64 {
        self.lock().prev_last
    }

    pub fn last_size(&self) -> Decimal {
        self.lock().last_size
    }

    pub fn open(&self) -> f64 {
        self.lock().open
    }

    pub fn high(&self) -> f64 {
        self.lock().high
    }

    pub fn low(&self) -> f64 {
        self.lock().low
    }

    pub fn close(&self) -> f64 {
        self.lock().close
    }

    pub fn volume(&self) -> Decimal {
        self.lock().volume
    }

    pub fn mark_price(&self) -> f64 {
        self.lock().mark_price
    }

    pub fn halted(&self) -> bool {
        let h = self.lock().halted;
        h == 1.0 || h == 2.0
    }

    pub fn vwap(&self) -> f64 {
        self.lock().vwap
    }

    pub fn min_tick(&self) -> f64 {
        self.lock().min_tick
    }

    pub fn bbo_exchange(&self) -> String {
        self.lock().bbo_exchange.clone()
    }

    pub fn snapshot_permissions(&self) -> i64 {
        self.lock().snapshot_permissions
    }

    pub fn market_data_type(&self) -> i64 {
        self.lock().market_data_type
    }

    pub fn rt_volume(&self) -> Decimal {
        self.lock().rt_volume
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.lock().last_timestamp
    }

    pub fn last_exchange(&self) -> String {
        self.lock().last_exchange.clone()
    }

    pub fn dividends(&self) -> Dividends {
        self.lock().dividends.clone()
    }

    pub fn fundamental_ratios(&self) -> FundamentalRatios {
        self.lock().fundamental_ratios.clone()
    }

    pub fn bid_greeks(&self) -> OptionGreeks {
        self.lock().bid_greeks
    }

    pub fn ask_greeks(&self) -> OptionGreeks {
        self.lock().ask_greeks
    }

    pub fn model_greeks(&self) -> OptionGreeks {
        self.lock().model_greeks
    }

    /// Bid side of the book, best (position 0) first.
    pub fn dom_bids(&self) -> Vec<DomLevel> {
        self.lock().dom_bids.values().cloned().collect()
    }

    /// Ask side of the book, best (position 0) first.
    pub fn dom_asks(&self) -> Vec<DomLevel> {
        self.lock().dom_asks.values().cloned().collect()
    }

    /// Copy of the level-1 tick history.
    pub fn ticks(&self) -> Vec<TickRecord> {
        self.lock().ticks.clone()
    }

    /// Copy of the tick-by-tick log.
    pub fn tick_by_ticks(&self) -> Vec<TickByTick> {
        self.lock().tick_by_ticks.clone()
    }

    /// Copy of the depth mutation log.
    pub fn dom_ticks(&self) -> Vec<DepthUpdate> {
        self.lock().dom_ticks.clone()
    }
}

impl std::fmt::Debug for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = self.lock();
        f.debug_struct("Ticker")
            .field("contract", &self.contract)
            .field("bid", &t.bid)
            .field("ask", &t.ask)
            .field("last", &t.last)
            .finish()
    }
}

fn mid_point_of(bid: f64, ask: f64) -> f64 {
    if bid > 0.0 && ask > 0.0 {
        (bid + ask) / 2.0
    } else {
        f64::NAN
    }
}

fn average_greeks(a: &OptionGreeks, b: &OptionGreeks) -> OptionGreeks {
    OptionGreeks {
        code: a.code,
        tick_attrib: a.tick_attrib,
        implied_vol: (a.implied_vol + b.implied_vol) / 2.0,
        delta: (a.delta + b.delta) / 2.0,
        opt_price: (a.opt_price + b.opt_price) / 2.0,
        pv_dividend: (a.pv_dividend + b.pv_dividend) / 2.0,
        gamma: (a.gamma + b.gamma) / 2.0,
        vega: (a.vega + b.vega) / 2.0,
        theta: (a.theta + b.theta) / 2.0,
        und_price: (a.und_price + b.und_price) / 2.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwsync_core::types::codes;
    use rust_decimal_macros::dec;

    fn ticker() -> Arc<Ticker> {
        Ticker::new(Contract::stock("AAPL", "SMART", "USD"))
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn mid_point_requires_positive_bid_and_ask() {
        let t = ticker();
        assert!(t.mid_point().is_nan());
        t.apply_price(codes::BID, 1.10, TickAttrib::default(), now());
        assert!(t.mid_point().is_nan());
        t.apply_price(codes::ASK, 1.12, TickAttrib::default(), now());
        assert!((t.mid_point() - 1.11).abs() < 1e-9);
    }

    #[test]
    fn market_price_prefers_last_inside_spread() {
        let t = ticker();
        t.apply_price(codes::BID, 1.10, TickAttrib::default(), now());
        t.apply_price(codes::ASK, 1.12, TickAttrib::default(), now());
        t.apply_price(codes::LAST, 1.11, TickAttrib::default(), now());
        assert_eq!(t.market_price(), 1.11);

        // Last outside the spread falls back to the midpoint.
        t.apply_price(codes::LAST, 1.20, TickAttrib::default(), now());
        assert!((t.market_price() - 1.11).abs() < 1e-9);
    }

    #[test]
    fn market_price_without_quotes_is_last() {
        let t = ticker();
        t.apply_price(codes::LAST, 1.15, TickAttrib::default(), now());
        assert_eq!(t.market_price(), 1.15);
    }

    #[test]
    fn greeks_priority_order() {
        let t = ticker();
        assert!(t.greeks().is_none());

        let model = OptionGreeks {
            delta: 0.4,
            ..Default::default()
        };
        t.apply_option_computation(codes::MODEL_OPTION, model);
        assert_eq!(t.greeks().unwrap().delta, 0.4);

        let last = OptionGreeks {
            delta: 0.45,
            ..Default::default()
        };
        t.apply_option_computation(codes::LAST_OPTION_COMPUTATION, last);
        assert_eq!(t.greeks().unwrap().delta, 0.45);

        let bid = OptionGreeks {
            delta: 0.40,
            vega: 0.10,
            ..Default::default()
        };
        let ask = OptionGreeks {
            delta: 0.50,
            vega: 0.20,
            ..Default::default()
        };
        t.apply_option_computation(codes::BID_OPTION_COMPUTATION, bid);
        t.apply_option_computation(codes::ASK_OPTION_COMPUTATION, ask);
        let g = t.greeks().unwrap();
        assert!((g.delta - 0.45).abs() < 1e-9);
        assert!((g.vega - 0.15).abs() < 1e-9);
    }

    #[test]
    fn prev_fields_update_only_on_change() {
        let t = ticker();
        t.apply_price(codes::BID, 10.0, TickAttrib::default(), now());
        assert!(t.prev_bid().is_nan());
        t.apply_price(codes::BID, 10.0, TickAttrib::default(), now());
        assert!(t.prev_bid().is_nan());
        t.apply_price(codes::BID, 10.5, TickAttrib::default(), now());
        assert_eq!(t.prev_bid(), 10.0);
        assert_eq!(t.bid(), 10.5);
    }

    #[test]
    fn last_size_before_any_last_price_is_dropped() {
        let t = ticker();
        t.apply_size(codes::LAST_SIZE, dec!(300), now());
        assert_eq!(t.last_size(), Decimal::ZERO);
        assert!(t.ticks().is_empty());

        t.apply_price(codes::LAST, 50.0, TickAttrib::default(), now());
        t.apply_size(codes::LAST_SIZE, dec!(300), now());
        assert_eq!(t.last_size(), dec!(300));
    }

    #[test]
    fn redelivered_quote_appends_no_history() {
        let t = ticker();
        t.apply_price(codes::BID, 10.0, TickAttrib::default(), now());
        t.apply_price(codes::BID, 10.0, TickAttrib::default(), now());
        assert_eq!(t.ticks().len(), 1);

        t.apply_size(codes::BID_SIZE, dec!(100), now());
        t.apply_size(codes::BID_SIZE, dec!(100), now());
        assert_eq!(t.ticks().len(), 2);
    }

    #[test]
    fn repeated_last_size_is_recorded_each_time() {
        let t = ticker();
        t.apply_price(codes::LAST, 50.0, TickAttrib::default(), now());
        t.apply_size(codes::LAST_SIZE, dec!(300), now());
        t.apply_size(codes::LAST_SIZE, dec!(300), now());
        let ticks = t.ticks();
        // One price record plus one record per trade, changed size or not.
        assert_eq!(ticks.len(), 3);
        assert_eq!(ticks[2].price, 50.0);
        assert_eq!(t.last_size(), dec!(300));
    }

    #[test]
    fn unknown_codes_mutate_nothing() {
        let t = ticker();
        t.apply_price(9999, 1.0, TickAttrib::default(), now());
        t.apply_size(9999, dec!(5), now());
        t.apply_generic(9999, 1.0);
        t.apply_string(9999, "x", now());
        assert!(t.ticks().is_empty());
        assert!(t.bid().is_nan());
    }

    #[test]
    fn delayed_codes_alias_live_fields() {
        let t = ticker();
        t.apply_price(codes::DELAYED_BID, 99.0, TickAttrib::default(), now());
        assert_eq!(t.bid(), 99.0);
    }

    #[test]
    fn book_upsert_and_delete() {
        let t = ticker();
        t.apply_book_update(0, "NSDQ", BookOp::Upsert, BookSide::Bid, 10.0, dec!(100), false, now());
        t.apply_book_update(1, "ARCA", BookOp::Upsert, BookSide::Bid, 9.9, dec!(200), false, now());
        t.apply_book_update(0, "EDGX", BookOp::Upsert, BookSide::Ask, 10.1, dec!(50), false, now());
        assert_eq!(t.dom_bids().len(), 2);
        assert_eq!(t.dom_asks().len(), 1);
        assert_eq!(t.dom_bids()[0].price, 10.0);

        // Update in place.
        t.apply_book_update(0, "NSDQ", BookOp::Upsert, BookSide::Bid, 10.05, dec!(80), false, now());
        assert_eq!(t.dom_bids()[0].price, 10.05);

        t.apply_book_update(1, "ARCA", BookOp::Delete, BookSide::Bid, 0.0, Decimal::ZERO, false, now());
        assert_eq!(t.dom_bids().len(), 1);
        assert_eq!(t.dom_ticks().len(), 5);
    }

    #[test]
    fn rt_volume_payload_updates_trade_fields() {
        let t = ticker();
        t.apply_string(
            codes::RT_VOLUME,
            "701.28;1;1348075471534;67854;701.46;true",
            now(),
        );
        assert_eq!(t.last(), 701.28);
        assert_eq!(t.last_size(), dec!(1));
        assert_eq!(t.rt_volume(), dec!(67854));
        assert_eq!(t.vwap(), 701.46);
    }

    #[test]
    fn rt_volume_without_price_only_updates_volume() {
        let t = ticker();
        t.apply_string(codes::RT_VOLUME, ";0;1348075471534;67854;701.46;false", now());
        assert!(t.last().is_nan());
        assert_eq!(t.rt_volume(), dec!(67854));
    }

    #[test]
    fn fundamental_ratios_parse_per_field() {
        let t = ticker();
        t.apply_string(
            codes::FUNDAMENTAL_RATIOS,
            "MKTCAP=3.1E12;PEEXCLXOR=29.5;BAD=oops;",
            now(),
        );
        let ratios = t.fundamental_ratios();
        assert_eq!(ratios.len(), 2);
        assert_eq!(ratios["PEEXCLXOR"], 29.5);
        assert!(!ratios.contains_key("BAD"));
    }

    #[test]
    fn dividends_payload() {
        let t = ticker();
        t.apply_string(codes::DIVIDENDS, "0.83,0.92,20250213,0.23", now());
        let d = t.dividends();
        assert_eq!(d.past_12_months, 0.83);
        assert_eq!(d.next_12_months, 0.92);
        assert_eq!(d.next_amount, 0.23);
        assert!(d.next_date.is_some());
    }

    #[test]
    fn tick_by_tick_updates_primary_fields() {
        let t = ticker();
        t.apply_tick_by_tick_bid_ask(
            TickByTickBidAsk {
                time: 1_700_000_000,
                bid_price: 5.0,
                ask_price: 5.2,
                bid_size: dec!(10),
                ask_size: dec!(12),
                ..Default::default()
            },
            now(),
        );
        assert_eq!(t.bid(), 5.0);
        assert_eq!(t.ask(), 5.2);

        t.apply_tick_by_tick_all_last(
            TickByTickAllLast {
                time: 1_700_000_001,
                price: 5.1,
                size: dec!(3),
                ..Default::default()
            },
            now(),
        );
        assert_eq!(t.last(), 5.1);
        assert_eq!(t.tick_by_ticks().len(), 2);
    }
}
