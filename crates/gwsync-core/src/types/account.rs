//! Account, position and P&L entities held by the state store.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::contract::Contract;

/// One `(account, tag, currency)` fact, e.g. `NetLiquidation = 25000 USD`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountValue {
    pub account: String,
    pub tag: String,
    pub value: String,
    pub currency: String,
    /// Model portfolio code, empty for the default model.
    pub model_code: String,
}

/// A holding reported by the account-update stream, with mark-to-market data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioItem {
    pub contract: Contract,
    pub position: Decimal,
    pub market_price: f64,
    pub market_value: f64,
    pub average_cost: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
    pub account: String,
}

/// A holding reported by the positions stream (no market data attached).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub account: String,
    pub contract: Contract,
    pub position: Decimal,
    pub avg_cost: f64,
}

/// Live account-level P&L subscription value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pnl {
    pub account: String,
    pub model_code: String,
    pub daily_pnl: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
}

/// Live single-position P&L subscription value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PnlSingle {
    pub account: String,
    pub model_code: String,
    pub con_id: i64,
    pub position: Decimal,
    pub daily_pnl: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
    /// Current market value of the position.
    pub value: f64,
}

/// A broadcast news bulletin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsBulletin {
    pub msg_id: i64,
    pub msg_type: i64,
    pub message: String,
    pub origin_exchange: String,
}

/// A news headline delivered on a market-data subscription.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsTick {
    pub timestamp: i64,
    pub provider_code: String,
    pub article_id: String,
    pub headline: String,
    pub extra_data: String,
}
