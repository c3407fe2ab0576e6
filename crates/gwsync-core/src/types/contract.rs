//! Contract identification.
//!
//! A [`Contract`] describes one tradable instrument as the gateway sees it.
//! The wire client resolves ambiguous contracts; by the time events reach the
//! synchronization layer every contract carries its numeric `con_id`, which is
//! the identity used by all store indexes.

use serde::{Deserialize, Serialize};

/// One tradable instrument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    /// Gateway-assigned numeric contract id. Stable identity.
    pub con_id: i64,
    /// Ticker symbol of the underlying (e.g. `"AAPL"`, `"EUR"`).
    pub symbol: String,
    /// Security type tag: `"STK"`, `"OPT"`, `"FUT"`, `"CASH"`, ...
    pub sec_type: String,
    /// Expiry for derivatives: `"YYYYMM"` or `"YYYYMMDD"`.
    pub last_trade_date_or_contract_month: String,
    /// Strike price (options).
    pub strike: f64,
    /// `"C"`/`"CALL"` or `"P"`/`"PUT"` (options).
    pub right: String,
    /// Contract size multiplier.
    pub multiplier: String,
    /// Destination exchange (e.g. `"SMART"`, `"IDEALPRO"`).
    pub exchange: String,
    /// Denomination currency.
    pub currency: String,
    /// Exchange-local symbol, when it differs from `symbol`.
    pub local_symbol: String,
    /// Trading class (options).
    pub trading_class: String,
    /// Listing exchange, for SMART-routed contracts.
    pub primary_exchange: String,
}

impl Contract {
    /// Stock contract on the given exchange and currency.
    pub fn stock(symbol: &str, exchange: &str, currency: &str) -> Self {
        Self {
            symbol: symbol.into(),
            sec_type: "STK".into(),
            exchange: exchange.into(),
            currency: currency.into(),
            ..Default::default()
        }
    }

    /// Forex pair contract (`symbol` is the base, `currency` the quote).
    pub fn forex(symbol: &str, exchange: &str, currency: &str) -> Self {
        Self {
            symbol: symbol.into(),
            sec_type: "CASH".into(),
            exchange: exchange.into(),
            currency: currency.into(),
            ..Default::default()
        }
    }

    /// Option contract on the given underlying.
    pub fn option(
        symbol: &str,
        last_trade_date: &str,
        strike: f64,
        right: &str,
        exchange: &str,
        multiplier: &str,
        currency: &str,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            sec_type: "OPT".into(),
            last_trade_date_or_contract_month: last_trade_date.into(),
            strike,
            right: right.into(),
            exchange: exchange.into(),
            multiplier: multiplier.into(),
            currency: currency.into(),
            ..Default::default()
        }
    }
}

impl std::fmt::Display for Contract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({}", self.sec_type, self.symbol)?;
        if !self.last_trade_date_or_contract_month.is_empty() {
            write!(f, " {}", self.last_trade_date_or_contract_month)?;
        }
        if self.strike != 0.0 {
            write!(f, " {}{}", self.right, self.strike)?;
        }
        write!(f, " {}/{} conId={})", self.exchange, self.currency, self.con_id)
    }
}

/// Full contract description returned by a contract-details request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractDetails {
    pub contract: Contract,
    pub market_name: String,
    /// Minimum price increment.
    pub min_tick: f64,
    pub order_types: String,
    pub valid_exchanges: String,
    pub long_name: String,
    pub time_zone_id: String,
    pub trading_hours: String,
    pub liquid_hours: String,
    /// Underlying contract id (derivatives).
    pub under_con_id: i64,
}
