//! Request/response payloads for historical and scanner style requests.
//!
//! These never touch the state store; the router encodes them straight onto
//! the correlation bus for the caller that issued the request.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::contract::ContractDetails;

/// One historical bar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar start, gateway time format.
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Decimal,
    pub wap: Decimal,
    pub bar_count: i64,
}

/// One five-second real-time bar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealTimeBar {
    /// Bar start, unix seconds.
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Decimal,
    pub wap: Decimal,
    pub count: i64,
}

/// One row of a histogram-data response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramEntry {
    pub price: f64,
    pub size: Decimal,
}

/// One row of a market-scanner response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanData {
    pub rank: i64,
    pub contract_details: ContractDetails,
    pub distance: String,
    pub benchmark: String,
    pub projection: String,
    pub legs_str: String,
}

/// Option chain parameters for one exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionChain {
    pub exchange: String,
    pub underlying_con_id: i64,
    pub trading_class: String,
    pub multiplier: String,
    pub expirations: Vec<String>,
    pub strikes: Vec<f64>,
}

/// A full news article body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub article_type: i64,
    pub article_text: String,
}

/// One historical news headline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalNews {
    pub time: DateTime<Utc>,
    pub provider_code: String,
    pub article_id: String,
    pub headline: String,
}
