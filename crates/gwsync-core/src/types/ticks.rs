//! Tick payloads and the tick-type code tables.
//!
//! The gateway tags every level-1 update with a numeric tick-type code. The
//! code space is large, evolves over time, and several codes alias the same
//! logical field (live vs. delayed). Instead of switching on raw codes at
//! every update site, each tick category maps its codes to a small field enum
//! through one `from_code` table; the `gwsync::ticker` aggregate then updates
//! exactly one field per enum variant. Unknown codes map to `None` and are a
//! recoverable condition for the caller to log.

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Numeric tick-type tag as delivered by the gateway.
pub type TickCode = i64;

/// Well-known tick-type codes.
///
/// Only the codes the aggregate folds are listed; the namespace is the
/// gateway's and grows without notice.
pub mod codes {
    use super::TickCode;

    pub const BID_SIZE: TickCode = 0;
    pub const BID: TickCode = 1;
    pub const ASK: TickCode = 2;
    pub const ASK_SIZE: TickCode = 3;
    pub const LAST: TickCode = 4;
    pub const LAST_SIZE: TickCode = 5;
    pub const HIGH: TickCode = 6;
    pub const LOW: TickCode = 7;
    pub const VOLUME: TickCode = 8;
    pub const CLOSE: TickCode = 9;
    pub const BID_OPTION_COMPUTATION: TickCode = 10;
    pub const ASK_OPTION_COMPUTATION: TickCode = 11;
    pub const LAST_OPTION_COMPUTATION: TickCode = 12;
    pub const MODEL_OPTION: TickCode = 13;
    pub const OPEN: TickCode = 14;
    pub const LOW_13_WEEK: TickCode = 15;
    pub const HIGH_13_WEEK: TickCode = 16;
    pub const LOW_26_WEEK: TickCode = 17;
    pub const HIGH_26_WEEK: TickCode = 18;
    pub const LOW_52_WEEK: TickCode = 19;
    pub const HIGH_52_WEEK: TickCode = 20;
    pub const AVG_VOLUME: TickCode = 21;
    pub const OPTION_HISTORICAL_VOL: TickCode = 23;
    pub const OPTION_IMPLIED_VOL: TickCode = 24;
    pub const OPTION_CALL_OPEN_INTEREST: TickCode = 27;
    pub const OPTION_PUT_OPEN_INTEREST: TickCode = 28;
    pub const OPTION_CALL_VOLUME: TickCode = 29;
    pub const OPTION_PUT_VOLUME: TickCode = 30;
    pub const INDEX_FUTURE_PREMIUM: TickCode = 31;
    pub const BID_EXCH: TickCode = 32;
    pub const ASK_EXCH: TickCode = 33;
    pub const AUCTION_VOLUME: TickCode = 34;
    pub const AUCTION_PRICE: TickCode = 35;
    pub const AUCTION_IMBALANCE: TickCode = 36;
    pub const MARK_PRICE: TickCode = 37;
    pub const LAST_TIMESTAMP: TickCode = 45;
    pub const FUNDAMENTAL_RATIOS: TickCode = 47;
    pub const RT_VOLUME: TickCode = 48;
    pub const HALTED: TickCode = 49;
    pub const BID_YIELD: TickCode = 50;
    pub const ASK_YIELD: TickCode = 51;
    pub const LAST_YIELD: TickCode = 52;
    pub const TRADE_COUNT: TickCode = 54;
    pub const TRADE_RATE: TickCode = 55;
    pub const VOLUME_RATE: TickCode = 56;
    pub const RT_HISTORICAL_VOL: TickCode = 58;
    pub const DIVIDENDS: TickCode = 59;
    pub const REGULATORY_IMBALANCE: TickCode = 61;
    pub const DELAYED_BID: TickCode = 66;
    pub const DELAYED_ASK: TickCode = 67;
    pub const DELAYED_LAST: TickCode = 68;
    pub const DELAYED_BID_SIZE: TickCode = 69;
    pub const DELAYED_ASK_SIZE: TickCode = 70;
    pub const DELAYED_LAST_SIZE: TickCode = 71;
    pub const DELAYED_HIGH: TickCode = 72;
    pub const DELAYED_LOW: TickCode = 73;
    pub const DELAYED_VOLUME: TickCode = 74;
    pub const DELAYED_CLOSE: TickCode = 75;
    pub const DELAYED_OPEN: TickCode = 76;
    pub const RT_TRD_VOLUME: TickCode = 77;
    pub const DELAYED_BID_OPTION: TickCode = 80;
    pub const DELAYED_ASK_OPTION: TickCode = 81;
    pub const DELAYED_LAST_OPTION: TickCode = 82;
    pub const DELAYED_MODEL_OPTION: TickCode = 83;
    pub const LAST_EXCH: TickCode = 84;
    pub const FUTURES_OPEN_INTEREST: TickCode = 86;
    pub const AVG_OPT_VOLUME: TickCode = 87;
    pub const DELAYED_LAST_TIMESTAMP: TickCode = 88;
    pub const SHORTABLE_SHARES: TickCode = 89;
    pub const DELAYED_HALTED: TickCode = 90;
    pub const DELAYED_YIELD_BID: TickCode = 101;
    pub const DELAYED_YIELD_ASK: TickCode = 102;
}

// ---------------------------------------------------------------------------
// Field dispatch tables
// ---------------------------------------------------------------------------

/// Target field of a price tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    Bid,
    Ask,
    Last,
    High,
    Low,
    Open,
    Close,
    Low13Week,
    High13Week,
    Low26Week,
    High26Week,
    Low52Week,
    High52Week,
    AuctionPrice,
    MarkPrice,
    BidYield,
    AskYield,
    LastYield,
}

impl PriceField {
    pub fn from_code(code: TickCode) -> Option<Self> {
        use codes::*;
        Some(match code {
            BID | DELAYED_BID => Self::Bid,
            ASK | DELAYED_ASK => Self::Ask,
            LAST | DELAYED_LAST => Self::Last,
            HIGH | DELAYED_HIGH => Self::High,
            LOW | DELAYED_LOW => Self::Low,
            OPEN | DELAYED_OPEN => Self::Open,
            CLOSE | DELAYED_CLOSE => Self::Close,
            LOW_13_WEEK => Self::Low13Week,
            HIGH_13_WEEK => Self::High13Week,
            LOW_26_WEEK => Self::Low26Week,
            HIGH_26_WEEK => Self::High26Week,
            LOW_52_WEEK => Self::Low52Week,
            HIGH_52_WEEK => Self::High52Week,
            AUCTION_PRICE => Self::AuctionPrice,
            MARK_PRICE => Self::MarkPrice,
            BID_YIELD | DELAYED_YIELD_BID => Self::BidYield,
            ASK_YIELD | DELAYED_YIELD_ASK => Self::AskYield,
            LAST_YIELD => Self::LastYield,
            _ => return None,
        })
    }
}

/// Target field of a size tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeField {
    BidSize,
    AskSize,
    LastSize,
    Volume,
    AvgVolume,
    CallOpenInterest,
    PutOpenInterest,
    CallVolume,
    PutVolume,
    AuctionVolume,
    AuctionImbalance,
    RegulatoryImbalance,
    FuturesOpenInterest,
    AvgOptionVolume,
    ShortableShares,
}

impl SizeField {
    pub fn from_code(code: TickCode) -> Option<Self> {
        use codes::*;
        Some(match code {
            BID_SIZE | DELAYED_BID_SIZE => Self::BidSize,
            ASK_SIZE | DELAYED_ASK_SIZE => Self::AskSize,
            LAST_SIZE | DELAYED_LAST_SIZE => Self::LastSize,
            VOLUME | DELAYED_VOLUME => Self::Volume,
            AVG_VOLUME => Self::AvgVolume,
            OPTION_CALL_OPEN_INTEREST => Self::CallOpenInterest,
            OPTION_PUT_OPEN_INTEREST => Self::PutOpenInterest,
            OPTION_CALL_VOLUME => Self::CallVolume,
            OPTION_PUT_VOLUME => Self::PutVolume,
            AUCTION_VOLUME => Self::AuctionVolume,
            AUCTION_IMBALANCE => Self::AuctionImbalance,
            REGULATORY_IMBALANCE => Self::RegulatoryImbalance,
            FUTURES_OPEN_INTEREST => Self::FuturesOpenInterest,
            AVG_OPT_VOLUME => Self::AvgOptionVolume,
            SHORTABLE_SHARES => Self::ShortableShares,
            _ => return None,
        })
    }
}

/// Target field of a generic numeric tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericField {
    HistVolatility,
    ImpliedVolatility,
    IndexFuturePremium,
    Halted,
    TradeCount,
    TradeRate,
    VolumeRate,
    RtHistVolatility,
}

impl GenericField {
    pub fn from_code(code: TickCode) -> Option<Self> {
        use codes::*;
        Some(match code {
            OPTION_HISTORICAL_VOL => Self::HistVolatility,
            OPTION_IMPLIED_VOL => Self::ImpliedVolatility,
            INDEX_FUTURE_PREMIUM => Self::IndexFuturePremium,
            HALTED | DELAYED_HALTED => Self::Halted,
            TRADE_COUNT => Self::TradeCount,
            TRADE_RATE => Self::TradeRate,
            VOLUME_RATE => Self::VolumeRate,
            RT_HISTORICAL_VOL => Self::RtHistVolatility,
            _ => return None,
        })
    }
}

/// Target of a string tick. The compound payloads carry their own parse
/// rules in the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringField {
    BidExchange,
    AskExchange,
    LastExchange,
    LastTimestamp,
    FundamentalRatios,
    RtVolume,
    RtTradeVolume,
    Dividends,
}

impl StringField {
    pub fn from_code(code: TickCode) -> Option<Self> {
        use codes::*;
        Some(match code {
            BID_EXCH => Self::BidExchange,
            ASK_EXCH => Self::AskExchange,
            LAST_EXCH => Self::LastExchange,
            LAST_TIMESTAMP | DELAYED_LAST_TIMESTAMP => Self::LastTimestamp,
            FUNDAMENTAL_RATIOS => Self::FundamentalRatios,
            RT_VOLUME => Self::RtVolume,
            RT_TRD_VOLUME => Self::RtTradeVolume,
            DIVIDENDS => Self::Dividends,
            _ => return None,
        })
    }
}

/// Which greeks snapshot an option-computation tick updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreeksSlot {
    Bid,
    Ask,
    Last,
    Model,
}

impl GreeksSlot {
    pub fn from_code(code: TickCode) -> Option<Self> {
        use codes::*;
        Some(match code {
            BID_OPTION_COMPUTATION | DELAYED_BID_OPTION => Self::Bid,
            ASK_OPTION_COMPUTATION | DELAYED_ASK_OPTION => Self::Ask,
            LAST_OPTION_COMPUTATION | DELAYED_LAST_OPTION => Self::Last,
            MODEL_OPTION | DELAYED_MODEL_OPTION => Self::Model,
            _ => return None,
        })
    }
}

// ---------------------------------------------------------------------------
// Tick payloads
// ---------------------------------------------------------------------------

/// Attributes delivered with price ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickAttrib {
    pub can_auto_execute: bool,
    pub past_limit: bool,
    pub pre_open: bool,
}

/// Option sensitivity metrics plus the option price they were derived from.
///
/// The all-default value means "no computation received yet"; see
/// [`OptionGreeks::is_empty`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionGreeks {
    pub code: TickCode,
    pub tick_attrib: i64,
    pub implied_vol: f64,
    pub delta: f64,
    pub opt_price: f64,
    pub pv_dividend: f64,
    pub gamma: f64,
    pub vega: f64,
    pub theta: f64,
    pub und_price: f64,
}

impl OptionGreeks {
    /// True when no computation has been recorded in this slot.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Normalized record appended to a ticker's level-1 history log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub time: DateTime<Utc>,
    pub code: TickCode,
    pub price: f64,
    pub size: Decimal,
}

// ---------------------------------------------------------------------------
// Tick-by-tick
// ---------------------------------------------------------------------------

/// One tick-by-tick trade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickByTickAllLast {
    /// Unix seconds.
    pub time: i64,
    pub tick_type: i64,
    pub price: f64,
    pub size: Decimal,
    pub past_limit: bool,
    pub unreported: bool,
    pub exchange: String,
    pub special_conditions: String,
}

/// One tick-by-tick bid/ask update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TickByTickBidAsk {
    pub time: i64,
    pub bid_price: f64,
    pub ask_price: f64,
    pub bid_size: Decimal,
    pub ask_size: Decimal,
    pub bid_past_low: bool,
    pub ask_past_high: bool,
}

/// One tick-by-tick midpoint update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TickByTickMidPoint {
    pub time: i64,
    pub mid_point: f64,
}

/// Time-ordered tick-by-tick log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TickByTick {
    AllLast(TickByTickAllLast),
    BidAsk(TickByTickBidAsk),
    MidPoint(TickByTickMidPoint),
}

// ---------------------------------------------------------------------------
// Order book (DOM)
// ---------------------------------------------------------------------------

/// Side of the order book. Wire encoding: 0 = ask, 1 = bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookSide {
    Ask,
    Bid,
}

impl BookSide {
    pub fn from_code(side: i64) -> Option<Self> {
        match side {
            0 => Some(Self::Ask),
            1 => Some(Self::Bid),
            _ => None,
        }
    }
}

/// Book mutation. Wire encoding: 0 = insert, 1 = update, 2 = delete; insert
/// and update collapse to an upsert on a position-indexed book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookOp {
    Upsert,
    Delete,
}

impl BookOp {
    pub fn from_code(operation: i64) -> Option<Self> {
        match operation {
            0 | 1 => Some(Self::Upsert),
            2 => Some(Self::Delete),
            _ => None,
        }
    }
}

/// One price level of the order book.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomLevel {
    pub price: f64,
    pub size: Decimal,
    pub market_maker: String,
}

impl std::fmt::Display for DomLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} x {} ({})", self.price, self.size, self.market_maker)
    }
}

/// Append-only log entry for every book mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthUpdate {
    pub time: DateTime<Utc>,
    pub position: i64,
    pub market_maker: String,
    pub side: BookSide,
    pub op: BookOp,
    pub price: f64,
    pub size: Decimal,
    pub is_smart_depth: bool,
}

// ---------------------------------------------------------------------------
// Compound string-tick payload targets
// ---------------------------------------------------------------------------

/// Parsed dividends payload: `"past12,next12,nextDate,nextAmount"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dividends {
    pub past_12_months: f64,
    pub next_12_months: f64,
    pub next_date: Option<DateTime<Utc>>,
    pub next_amount: f64,
}

/// Fundamental ratios payload: `"TAG=value;TAG=value;..."`.
pub type FundamentalRatios = AHashMap<String, f64>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_field_table_covers_delayed_aliases() {
        assert_eq!(PriceField::from_code(codes::BID), Some(PriceField::Bid));
        assert_eq!(
            PriceField::from_code(codes::DELAYED_BID),
            Some(PriceField::Bid)
        );
        assert_eq!(
            PriceField::from_code(codes::MARK_PRICE),
            Some(PriceField::MarkPrice)
        );
        assert_eq!(PriceField::from_code(9999), None);
    }

    #[test]
    fn greeks_slot_table() {
        assert_eq!(
            GreeksSlot::from_code(codes::MODEL_OPTION),
            Some(GreeksSlot::Model)
        );
        assert_eq!(
            GreeksSlot::from_code(codes::DELAYED_ASK_OPTION),
            Some(GreeksSlot::Ask)
        );
        assert_eq!(GreeksSlot::from_code(codes::BID), None);
    }

    #[test]
    fn book_codes() {
        assert_eq!(BookSide::from_code(0), Some(BookSide::Ask));
        assert_eq!(BookSide::from_code(1), Some(BookSide::Bid));
        assert_eq!(BookSide::from_code(5), None);
        assert_eq!(BookOp::from_code(0), Some(BookOp::Upsert));
        assert_eq!(BookOp::from_code(1), Some(BookOp::Upsert));
        assert_eq!(BookOp::from_code(2), Some(BookOp::Delete));
        assert_eq!(BookOp::from_code(3), None);
    }

    #[test]
    fn greeks_emptiness() {
        let mut g = OptionGreeks::default();
        assert!(g.is_empty());
        g.delta = 0.5;
        assert!(!g.is_empty());
    }
}
