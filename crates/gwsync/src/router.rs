//! Event router: the single consumer of the wire client's callback stream.
//!
//! The wire client invokes exactly one [`GatewayEvents`] method per decoded
//! gateway event, on its delivery thread, in arrival order. Every handler
//! (a) looks the affected store entries up, (b) applies the update, and
//! (c) publishes a correlation frame so blocked or streaming callers observe
//! the change. Handlers never panic and never block indefinitely; per-event
//! failures are logged and the event is dropped, since the gateway can
//! legitimately deliver residual events for cancelled or expired requests.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gwsync_core::error::CodeMsg;
use gwsync_core::time_util::parse_gateway_time;
use gwsync_core::types::{
    AccountValue, Bar, CommissionReport, Contract, ContractDetails, Execution, Fill,
    HistogramEntry, HistoricalNews, NewsArticle, NewsBulletin, NewsTick, OptionChain,
    OptionGreeks, Order, OrderState, OrderStatusReport, PnlSingle, PortfolioItem, Position,
    RealTimeBar, ScanData, TickAttrib, TickByTickAllLast, TickByTickBidAsk, TickByTickMidPoint,
    TickCode,
};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::bus::{EventBus, Topic};
use crate::state::{SessionState, StreamKind};
use crate::trade::Trade;

/// Well-known topics for session-wide broadcasts.
pub mod topics {
    pub const NEXT_VALID_ID: &str = "NextValidId";
    pub const MANAGED_ACCOUNTS: &str = "ManagedAccounts";
    pub const CURRENT_TIME: &str = "CurrentTime";
    pub const ACCOUNT_VALUE: &str = "AccountValue";
    pub const ACCOUNT_UPDATE_TIME: &str = "AccountUpdateTime";
    pub const ACCOUNT_DOWNLOAD_END: &str = "AccountDownloadEnd";
    pub const POSITION: &str = "Position";
    pub const POSITION_END: &str = "PositionEnd";
    pub const PORTFOLIO: &str = "Portfolio";
    pub const OPEN_ORDER: &str = "OpenOrder";
    pub const OPEN_ORDER_END: &str = "OpenOrderEnd";
    pub const COMPLETED_ORDER: &str = "CompletedOrder";
    pub const COMPLETED_ORDERS_END: &str = "CompletedOrdersEnd";
    pub const NEWS_BULLETIN: &str = "NewsBulletin";
    pub const CONNECTION_CLOSED: &str = "ConnectionClosed";
}

// ---------------------------------------------------------------------------
// Callback interface
// ---------------------------------------------------------------------------

/// One method per gateway event, called by the wire client on its delivery
/// thread.
#[allow(clippy::too_many_arguments)]
pub trait GatewayEvents {
    // ticks
    fn tick_price(&self, req_id: i64, code: TickCode, price: f64, attrib: TickAttrib);
    fn tick_size(&self, req_id: i64, code: TickCode, size: Decimal);
    fn tick_option_computation(&self, req_id: i64, code: TickCode, greeks: OptionGreeks);
    fn tick_generic(&self, req_id: i64, code: TickCode, value: f64);
    fn tick_string(&self, req_id: i64, code: TickCode, value: &str);
    fn tick_snapshot_end(&self, req_id: i64);
    fn tick_req_params(&self, req_id: i64, min_tick: f64, bbo_exchange: &str, snapshot_permissions: i64);
    fn market_data_type(&self, req_id: i64, market_data_type: i64);
    fn tick_by_tick_all_last(&self, req_id: i64, tick: TickByTickAllLast);
    fn tick_by_tick_bid_ask(&self, req_id: i64, tick: TickByTickBidAsk);
    fn tick_by_tick_mid_point(&self, req_id: i64, tick: TickByTickMidPoint);
    fn update_mkt_depth(&self, req_id: i64, position: i64, operation: i64, side: i64, price: f64, size: Decimal);
    fn update_mkt_depth_l2(&self, req_id: i64, position: i64, market_maker: &str, operation: i64, side: i64, price: f64, size: Decimal, is_smart_depth: bool);

    // orders
    fn next_valid_id(&self, order_id: i64);
    fn order_status(&self, report: OrderStatusReport);
    fn open_order(&self, order_id: i64, contract: Contract, order: Order, report: OrderStatusReport);
    fn open_order_end(&self);
    fn completed_order(&self, contract: Contract, order: Order, status: OrderState);
    fn completed_orders_end(&self);
    fn exec_details(&self, req_id: i64, contract: Contract, execution: Execution);
    fn exec_details_end(&self, req_id: i64);
    fn commission_report(&self, report: CommissionReport);

    // account
    fn update_account_value(&self, tag: &str, value: &str, currency: &str, account: &str);
    fn update_account_time(&self, timestamp: &str);
    fn account_download_end(&self, account: &str);
    fn account_summary(&self, req_id: i64, account: &str, tag: &str, value: &str, currency: &str);
    fn account_summary_end(&self, req_id: i64);
    fn position(&self, position: Position);
    fn position_end(&self);
    fn update_portfolio(&self, item: PortfolioItem);
    fn managed_accounts(&self, accounts: &str);
    fn pnl(&self, req_id: i64, daily: f64, unrealized: f64, realized: f64);
    fn pnl_single(&self, req_id: i64, position: Decimal, daily: f64, unrealized: f64, realized: f64, value: f64);

    // session
    fn current_time(&self, unix_secs: i64);
    fn error(&self, req_id: i64, code: i64, message: &str);
    fn connection_closed(&self);

    // request/response streams
    fn contract_details(&self, req_id: i64, details: ContractDetails);
    fn contract_details_end(&self, req_id: i64);
    fn historical_data(&self, req_id: i64, bar: Bar);
    fn historical_data_update(&self, req_id: i64, bar: Bar);
    fn historical_data_end(&self, req_id: i64, start: &str, end: &str);
    fn realtime_bar(&self, req_id: i64, bar: RealTimeBar);
    fn head_timestamp(&self, req_id: i64, timestamp: &str);
    fn histogram_data(&self, req_id: i64, entries: Vec<HistogramEntry>);
    fn scanner_data(&self, req_id: i64, row: ScanData);
    fn scanner_data_end(&self, req_id: i64);
    fn symbol_samples(&self, req_id: i64, samples: Vec<ContractDetails>);
    fn option_chain(&self, req_id: i64, chain: OptionChain);
    fn option_chain_end(&self, req_id: i64);
    fn fundamental_data(&self, req_id: i64, data: &str);
    fn news_bulletin(&self, bulletin: NewsBulletin);
    fn tick_news(&self, req_id: i64, news: NewsTick);
    fn news_article(&self, req_id: i64, article: NewsArticle);
    fn historical_news(&self, req_id: i64, news: HistoricalNews);
    fn historical_news_end(&self, req_id: i64, has_more: bool);
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Mutates the store and aggregates, then publishes on the bus.
pub struct EventRouter {
    state: Arc<SessionState>,
    bus: Arc<EventBus>,
}

impl EventRouter {
    pub fn new(state: Arc<SessionState>, bus: Arc<EventBus>) -> Self {
        Self { state, bus }
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn publish_tagged<T: Serialize>(&self, topic: impl Into<Topic>, tag: &str, value: &T) {
        match gwsync_core::wire::tagged(tag, value) {
            Ok(frame) => {
                self.bus.publish(topic, &frame);
            }
            Err(err) => tracing::error!(%err, tag, "frame encoding failed"),
        }
    }

    fn publish_end(&self, topic: impl Into<Topic>) {
        self.bus.publish(topic, gwsync_core::wire::END_MARKER);
    }

    fn ticker_for(&self, req_id: i64) -> Option<Arc<crate::ticker::Ticker>> {
        let t = self.state.ticker_by_req(req_id);
        if t.is_none() {
            tracing::debug!(req_id, "tick for unknown request id dropped");
        }
        t
    }

    /// Resolve the trade an order event refers to, via session pair then
    /// permanent-id index.
    fn trade_for(&self, client_id: i64, order_id: i64, perm_id: i64) -> Option<Arc<Trade>> {
        self.state.trade(client_id, order_id, perm_id)
    }
}

impl GatewayEvents for EventRouter {
    // -- ticks --------------------------------------------------------------

    fn tick_price(&self, req_id: i64, code: TickCode, price: f64, attrib: TickAttrib) {
        if let Some(ticker) = self.ticker_for(req_id) {
            ticker.apply_price(code, price, attrib, self.now());
        }
    }

    fn tick_size(&self, req_id: i64, code: TickCode, size: Decimal) {
        if let Some(ticker) = self.ticker_for(req_id) {
            ticker.apply_size(code, size, self.now());
        }
    }

    fn tick_option_computation(&self, req_id: i64, code: TickCode, greeks: OptionGreeks) {
        match self.state.ticker_by_req(req_id) {
            Some(ticker) => ticker.apply_option_computation(code, greeks),
            // Snapshot option calculations have no ticker; the caller blocks
            // on the request topic instead.
            None => self.publish_tagged(req_id, "OptionComputation", &greeks),
        }
    }

    fn tick_generic(&self, req_id: i64, code: TickCode, value: f64) {
        if let Some(ticker) = self.ticker_for(req_id) {
            ticker.apply_generic(code, value);
        }
    }

    fn tick_string(&self, req_id: i64, code: TickCode, value: &str) {
        if let Some(ticker) = self.ticker_for(req_id) {
            ticker.apply_string(code, value, self.now());
        }
    }

    fn tick_snapshot_end(&self, req_id: i64) {
        self.state.end_ticker(req_id, StreamKind::MarketData);
        self.publish_end(req_id);
    }

    fn tick_req_params(
        &self,
        req_id: i64,
        min_tick: f64,
        bbo_exchange: &str,
        snapshot_permissions: i64,
    ) {
        if let Some(ticker) = self.state.ticker_by_req(req_id) {
            ticker.set_req_params(min_tick, bbo_exchange, snapshot_permissions);
        }
        #[derive(Serialize)]
        struct ReqParams<'a> {
            min_tick: f64,
            bbo_exchange: &'a str,
            snapshot_permissions: i64,
        }
        self.publish_tagged(
            req_id,
            "TickReqParams",
            &ReqParams {
                min_tick,
                bbo_exchange,
                snapshot_permissions,
            },
        );
    }

    fn market_data_type(&self, req_id: i64, market_data_type: i64) {
        if let Some(ticker) = self.state.ticker_by_req(req_id) {
            ticker.set_market_data_type(market_data_type);
        }
        self.publish_tagged(req_id, "MarketDataType", &market_data_type);
    }

    fn tick_by_tick_all_last(&self, req_id: i64, tick: TickByTickAllLast) {
        if let Some(ticker) = self.ticker_for(req_id) {
            ticker.apply_tick_by_tick_all_last(tick, self.now());
        }
    }

    fn tick_by_tick_bid_ask(&self, req_id: i64, tick: TickByTickBidAsk) {
        if let Some(ticker) = self.ticker_for(req_id) {
            ticker.apply_tick_by_tick_bid_ask(tick, self.now());
        }
    }

    fn tick_by_tick_mid_point(&self, req_id: i64, tick: TickByTickMidPoint) {
        if let Some(ticker) = self.ticker_for(req_id) {
            ticker.apply_tick_by_tick_mid_point(tick, self.now());
        }
    }

    fn update_mkt_depth(
        &self,
        req_id: i64,
        position: i64,
        operation: i64,
        side: i64,
        price: f64,
        size: Decimal,
    ) {
        self.update_mkt_depth_l2(req_id, position, "", operation, side, price, size, false);
    }

    fn update_mkt_depth_l2(
        &self,
        req_id: i64,
        position: i64,
        market_maker: &str,
        operation: i64,
        side: i64,
        price: f64,
        size: Decimal,
        is_smart_depth: bool,
    ) {
        let Some(ticker) = self.ticker_for(req_id) else {
            return;
        };
        let (Some(op), Some(side)) = (
            gwsync_core::types::BookOp::from_code(operation),
            gwsync_core::types::BookSide::from_code(side),
        ) else {
            tracing::warn!(req_id, operation, side, "unknown book operation or side");
            return;
        };
        ticker.apply_book_update(
            position,
            market_maker,
            op,
            side,
            price,
            size,
            is_smart_depth,
            self.now(),
        );
    }

    // -- orders -------------------------------------------------------------

    fn next_valid_id(&self, order_id: i64) {
        self.state.set_next_valid_id(order_id);
        self.publish_tagged(topics::NEXT_VALID_ID, "NextValidId", &order_id);
    }

    fn order_status(&self, report: OrderStatusReport) {
        self.state.observe_order_id(report.order_id);
        let Some(trade) = self.trade_for(report.client_id, report.order_id, report.perm_id)
        else {
            tracing::warn!(
                order_id = report.order_id,
                perm_id = report.perm_id,
                "order status for unknown order dropped"
            );
            return;
        };
        let order_id = report.order_id;
        trade.apply_status(report.clone(), self.now());
        self.publish_tagged(order_id, "OrderStatus", &report);
    }

    fn open_order(
        &self,
        order_id: i64,
        contract: Contract,
        order: Order,
        report: OrderStatusReport,
    ) {
        self.state.observe_order_id(order_id);
        let trade = self.state.ensure_trade(&contract, &order, self.now());
        trade.apply_open_order(order.clone(), report, self.now());
        self.publish_tagged(order_id, "OpenOrder", &order);
        self.publish_tagged(topics::OPEN_ORDER, "OpenOrder", &order);
    }

    fn open_order_end(&self) {
        self.publish_end(topics::OPEN_ORDER_END);
    }

    fn completed_order(&self, contract: Contract, order: Order, status: OrderState) {
        let trade = self.state.ensure_trade(&contract, &order, self.now());
        let report = OrderStatusReport {
            order_id: order.order_id,
            client_id: order.client_id,
            perm_id: order.perm_id,
            status,
            filled: order.filled_quantity,
            ..Default::default()
        };
        trade.apply_status(report, self.now());
        self.publish_tagged(topics::COMPLETED_ORDER, "CompletedOrder", &order);
    }

    fn completed_orders_end(&self) {
        self.publish_end(topics::COMPLETED_ORDERS_END);
    }

    fn exec_details(&self, req_id: i64, contract: Contract, execution: Execution) {
        let time = match parse_gateway_time(&execution.time) {
            Ok(t) => t,
            Err(err) => {
                tracing::warn!(%err, raw = %execution.time, "bad execution time, using now");
                self.now()
            }
        };
        let fill = Fill {
            contract: contract.clone(),
            execution: execution.clone(),
            commission_report: CommissionReport::default(),
            time,
        };
        let Some(shared) = self.state.record_fill(fill.clone()) else {
            tracing::debug!(exec_id = %execution.exec_id, "duplicate execution dropped");
            return;
        };
        // Executions can precede the open-order event; a placeholder trade
        // keyed by permanent id keeps the fill.
        let trade = match self.trade_for(execution.client_id, execution.order_id, execution.perm_id)
        {
            Some(trade) => trade,
            None => {
                tracing::info!(
                    perm_id = execution.perm_id,
                    order_id = execution.order_id,
                    "execution for unknown order, creating placeholder trade"
                );
                let order = Order {
                    order_id: execution.order_id,
                    client_id: execution.client_id,
                    perm_id: execution.perm_id,
                    account: execution.acct_number.clone(),
                    ..Default::default()
                };
                self.state.ensure_trade(&contract, &order, self.now())
            }
        };
        trade.add_fill(Arc::clone(&shared), self.now());
        if req_id >= 0 {
            self.publish_tagged(req_id, "ExecDetails", &fill);
        }
    }

    fn exec_details_end(&self, req_id: i64) {
        self.publish_end(req_id);
    }

    fn commission_report(&self, report: CommissionReport) {
        if !self.state.apply_commission(report.clone()) {
            tracing::warn!(exec_id = %report.exec_id, "commission report for unknown execution dropped");
        }
    }

    // -- account ------------------------------------------------------------

    fn update_account_value(&self, tag: &str, value: &str, currency: &str, account: &str) {
        let av = AccountValue {
            account: account.into(),
            tag: tag.into(),
            value: value.into(),
            currency: currency.into(),
            model_code: String::new(),
        };
        self.state.update_account_value(av.clone());
        self.publish_tagged(topics::ACCOUNT_VALUE, "AccountValue", &av);
    }

    fn update_account_time(&self, timestamp: &str) {
        self.publish_tagged(topics::ACCOUNT_UPDATE_TIME, "AccountUpdateTime", &timestamp);
    }

    fn account_download_end(&self, account: &str) {
        self.publish_tagged(topics::ACCOUNT_DOWNLOAD_END, "AccountDownloadEnd", &account);
    }

    fn account_summary(&self, req_id: i64, account: &str, tag: &str, value: &str, currency: &str) {
        let av = AccountValue {
            account: account.into(),
            tag: tag.into(),
            value: value.into(),
            currency: currency.into(),
            model_code: String::new(),
        };
        self.state.update_account_value(av.clone());
        self.publish_tagged(req_id, "AccountSummary", &av);
    }

    fn account_summary_end(&self, req_id: i64) {
        self.publish_end(req_id);
    }

    fn position(&self, position: Position) {
        self.state.update_position(position.clone());
        self.publish_tagged(topics::POSITION, "Position", &position);
    }

    fn position_end(&self) {
        self.publish_end(topics::POSITION_END);
    }

    fn update_portfolio(&self, item: PortfolioItem) {
        self.state.update_portfolio(item.clone());
        self.publish_tagged(topics::PORTFOLIO, "PortfolioItem", &item);
    }

    fn managed_accounts(&self, accounts: &str) {
        let list: Vec<String> = accounts
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        self.state.set_managed_accounts(list.clone());
        self.publish_tagged(topics::MANAGED_ACCOUNTS, "ManagedAccounts", &list);
    }

    fn pnl(&self, req_id: i64, daily: f64, unrealized: f64, realized: f64) {
        if !self.state.update_pnl(req_id, daily, unrealized, realized) {
            tracing::debug!(req_id, "pnl for unknown subscription dropped");
            return;
        }
        #[derive(Serialize)]
        struct PnlUpdate {
            daily_pnl: f64,
            unrealized_pnl: f64,
            realized_pnl: f64,
        }
        self.publish_tagged(
            req_id,
            "Pnl",
            &PnlUpdate {
                daily_pnl: daily,
                unrealized_pnl: unrealized,
                realized_pnl: realized,
            },
        );
    }

    fn pnl_single(
        &self,
        req_id: i64,
        position: Decimal,
        daily: f64,
        unrealized: f64,
        realized: f64,
        value: f64,
    ) {
        if !self
            .state
            .update_pnl_single(req_id, position, daily, unrealized, realized, value)
        {
            tracing::debug!(req_id, "pnl-single for unknown subscription dropped");
            return;
        }
        let update = PnlSingle {
            position,
            daily_pnl: daily,
            unrealized_pnl: unrealized,
            realized_pnl: realized,
            value,
            ..Default::default()
        };
        self.publish_tagged(req_id, "PnlSingle", &update);
    }

    // -- session ------------------------------------------------------------

    fn current_time(&self, unix_secs: i64) {
        self.publish_tagged(topics::CURRENT_TIME, "CurrentTime", &unix_secs);
    }

    fn error(&self, req_id: i64, code: i64, message: &str) {
        let cm = CodeMsg::new(code, message);
        if cm.is_warning() {
            tracing::warn!(req_id, code, message, "gateway warning");
        } else {
            tracing::error!(req_id, code, message, "gateway error");
        }
        // Order-scoped errors land in the trade's log; the id spaces for
        // orders and requests are shared, so try both.
        if req_id > 0 {
            if let Some(trade) = self.state.trade_by_order_id(req_id) {
                trade.log_error(&cm, self.now());
            }
            self.bus
                .publish(req_id, &gwsync_core::wire::error_frame(&cm));
        }
    }

    fn connection_closed(&self) {
        tracing::warn!("gateway connection closed");
        self.publish_end(topics::CONNECTION_CLOSED);
    }

    // -- request/response streams -------------------------------------------

    fn contract_details(&self, req_id: i64, details: ContractDetails) {
        self.publish_tagged(req_id, "ContractDetails", &details);
    }

    fn contract_details_end(&self, req_id: i64) {
        self.publish_end(req_id);
    }

    fn historical_data(&self, req_id: i64, bar: Bar) {
        self.publish_tagged(req_id, "HistoricalData", &bar);
    }

    fn historical_data_update(&self, req_id: i64, bar: Bar) {
        self.publish_tagged(req_id, "HistoricalDataUpdate", &bar);
    }

    fn historical_data_end(&self, req_id: i64, _start: &str, _end: &str) {
        self.publish_end(req_id);
    }

    fn realtime_bar(&self, req_id: i64, bar: RealTimeBar) {
        self.publish_tagged(req_id, "RealTimeBar", &bar);
    }

    fn head_timestamp(&self, req_id: i64, timestamp: &str) {
        self.publish_tagged(req_id, "HeadTimestamp", &timestamp);
    }

    fn histogram_data(&self, req_id: i64, entries: Vec<HistogramEntry>) {
        self.publish_tagged(req_id, "HistogramData", &entries);
    }

    fn scanner_data(&self, req_id: i64, row: ScanData) {
        self.publish_tagged(req_id, "ScannerData", &row);
    }

    fn scanner_data_end(&self, req_id: i64) {
        self.publish_end(req_id);
    }

    fn symbol_samples(&self, req_id: i64, samples: Vec<ContractDetails>) {
        self.publish_tagged(req_id, "SymbolSamples", &samples);
    }

    fn option_chain(&self, req_id: i64, chain: OptionChain) {
        self.publish_tagged(req_id, "OptionChain", &chain);
    }

    fn option_chain_end(&self, req_id: i64) {
        self.publish_end(req_id);
    }

    fn fundamental_data(&self, req_id: i64, data: &str) {
        self.publish_tagged(req_id, "FundamentalData", &data);
    }

    fn news_bulletin(&self, bulletin: NewsBulletin) {
        self.state.add_news_bulletin(bulletin.clone());
        self.publish_tagged(topics::NEWS_BULLETIN, "NewsBulletin", &bulletin);
    }

    fn tick_news(&self, req_id: i64, news: NewsTick) {
        self.publish_tagged(req_id, "TickNews", &news);
    }

    fn news_article(&self, req_id: i64, article: NewsArticle) {
        self.publish_tagged(req_id, "NewsArticle", &article);
    }

    fn historical_news(&self, req_id: i64, news: HistoricalNews) {
        self.publish_tagged(req_id, "HistoricalNews", &news);
    }

    fn historical_news_end(&self, req_id: i64, _has_more: bool) {
        self.publish_end(req_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwsync_core::wire;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn router() -> EventRouter {
        EventRouter::new(SessionState::new(), EventBus::new())
    }

    fn aapl() -> Contract {
        Contract {
            con_id: 265598,
            ..Contract::stock("AAPL", "SMART", "USD")
        }
    }

    fn exec(exec_id: &str, perm_id: i64) -> Execution {
        Execution {
            exec_id: exec_id.into(),
            time: "20250117 09:30:00 US/Eastern".into(),
            side: "BOT".into(),
            shares: dec!(100),
            price: 187.5,
            perm_id,
            cum_qty: dec!(100),
            avg_price: 187.5,
            ..Default::default()
        }
    }

    #[test]
    fn ticks_reach_the_registered_ticker() {
        let r = router();
        let ticker = r.state().start_ticker(90, &aapl(), StreamKind::MarketData);
        r.tick_price(90, gwsync_core::types::codes::BID, 187.0, TickAttrib::default());
        r.tick_size(90, gwsync_core::types::codes::BID_SIZE, dec!(500));
        assert_eq!(ticker.bid(), 187.0);
        assert_eq!(ticker.bid_size(), dec!(500));
    }

    #[test]
    fn ticks_for_unknown_request_are_dropped() {
        let r = router();
        // Must not panic or create state.
        r.tick_price(12345, gwsync_core::types::codes::BID, 1.0, TickAttrib::default());
        assert!(r.state().tickers().is_empty());
    }

    #[test]
    fn snapshot_option_computation_publishes_on_request_topic() {
        let r = router();
        let sub = r.bus().subscribe(77);
        let greeks = OptionGreeks {
            implied_vol: 0.3,
            delta: 0.5,
            ..Default::default()
        };
        r.tick_option_computation(77, gwsync_core::types::codes::LAST_OPTION_COMPUTATION, greeks);
        let got: OptionGreeks = sub.recv_decoded(Duration::from_secs(1)).unwrap();
        assert_eq!(got.delta, 0.5);
    }

    #[test]
    fn open_order_then_status_drives_the_trade() {
        let r = router();
        let order = Order {
            order_id: 3,
            client_id: 1,
            perm_id: 500,
            action: "BUY".into(),
            total_quantity: dec!(10),
            ..Default::default()
        };
        r.open_order(3, aapl(), order, OrderStatusReport {
            order_id: 3,
            client_id: 1,
            perm_id: 500,
            status: OrderState::Submitted,
            ..Default::default()
        });
        let trade = r.state().trade(1, 3, 0).unwrap();
        assert!(trade.is_active());

        r.order_status(OrderStatusReport {
            order_id: 3,
            client_id: 1,
            perm_id: 500,
            status: OrderState::Filled,
            filled: dec!(10),
            ..Default::default()
        });
        assert!(trade.is_done());
        assert!(trade.done().is_set());
        // Watermark advanced past the observed order id.
        assert!(r.state().peek_next_valid_id() > 3);
    }

    #[test]
    fn status_for_unknown_order_is_dropped_but_advances_watermark() {
        let r = router();
        r.order_status(OrderStatusReport {
            order_id: 41,
            client_id: 2,
            status: OrderState::Submitted,
            ..Default::default()
        });
        assert!(r.state().trades().is_empty());
        assert_eq!(r.state().peek_next_valid_id(), 42);
    }

    #[test]
    fn execution_before_open_order_creates_placeholder() {
        let r = router();
        r.exec_details(-1, aapl(), exec("x1", 900));
        let trade = r.state().trade(0, 0, 900).expect("placeholder trade");
        assert_eq!(trade.fills().len(), 1);

        // The commission report patches the same shared fill.
        r.commission_report(CommissionReport {
            exec_id: "x1".into(),
            commission: 1.1,
            ..Default::default()
        });
        assert_eq!(trade.fills()[0].commission_report.commission, 1.1);
    }

    #[test]
    fn duplicate_exec_details_record_one_fill() {
        let r = router();
        r.exec_details(-1, aapl(), exec("dup", 901));
        r.exec_details(-1, aapl(), exec("dup", 901));
        let trade = r.state().trade(0, 0, 901).unwrap();
        assert_eq!(trade.fills().len(), 1);
        assert_eq!(r.state().fills().len(), 1);
    }

    #[test]
    fn error_frames_reach_request_subscribers_and_trade_logs() {
        let r = router();
        let order = Order {
            order_id: 8,
            client_id: 1,
            ..Default::default()
        };
        r.open_order(8, aapl(), order, OrderStatusReport {
            order_id: 8,
            client_id: 1,
            status: OrderState::Submitted,
            ..Default::default()
        });
        let sub = r.bus().subscribe(8);
        r.error(8, 201, "Order rejected - reason:");
        let frame = sub.recv_timeout(Duration::from_secs(1)).unwrap();
        let cm = wire::as_error(&frame).unwrap().unwrap();
        assert_eq!(cm.code, 201);
        let trade = r.state().trade(1, 8, 0).unwrap();
        assert_eq!(trade.log().last().unwrap().error_code, 201);
    }

    #[test]
    fn historical_stream_terminates_with_end() {
        let r = router();
        let sub = r.bus().subscribe_with_buffer(60, 16);
        r.historical_data(60, Bar { close: 1.0, ..Default::default() });
        r.historical_data(60, Bar { close: 2.0, ..Default::default() });
        r.historical_data_end(60, "", "");
        let frames = sub.collect_until_end(Duration::from_secs(1)).unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn position_stream_over_named_topics() {
        let r = router();
        let pos_sub = r.bus().subscribe_with_buffer(topics::POSITION, 16);
        let end_sub = r.bus().subscribe(topics::POSITION_END);
        r.position(Position {
            account: "DU1".into(),
            contract: aapl(),
            position: dec!(100),
            avg_cost: 180.0,
        });
        r.position_end();
        let got: Position = pos_sub.recv_decoded(Duration::from_secs(1)).unwrap();
        assert_eq!(got.position, dec!(100));
        assert!(wire::is_end(&end_sub.recv().unwrap()));
        assert_eq!(r.state().positions().len(), 1);
    }

    #[test]
    fn portfolio_updates_broadcast_on_their_own_topic() {
        let r = router();
        let sub = r.bus().subscribe(topics::PORTFOLIO);
        r.update_portfolio(PortfolioItem {
            account: "DU1".into(),
            contract: aapl(),
            position: dec!(100),
            market_price: 187.0,
            market_value: 18_700.0,
            ..Default::default()
        });
        let got: PortfolioItem = sub.recv_decoded(Duration::from_secs(1)).unwrap();
        assert_eq!(got.position, dec!(100));
        assert_eq!(r.state().portfolio("DU1").len(), 1);
    }

    #[test]
    fn managed_accounts_parse_and_broadcast() {
        let r = router();
        r.managed_accounts("DU1,DU2,");
        assert_eq!(r.state().managed_accounts(), vec!["DU1", "DU2"]);
    }

    #[test]
    fn depth_events_build_the_book() {
        let r = router();
        let ticker = r.state().start_ticker(70, &aapl(), StreamKind::Depth);
        // side: 1 = bid, op: 0 = insert.
        r.update_mkt_depth(70, 0, 0, 1, 186.9, dec!(300));
        r.update_mkt_depth_l2(70, 0, "NSDQ", 0, 0, 187.1, dec!(200), false);
        assert_eq!(ticker.dom_bids().len(), 1);
        assert_eq!(ticker.dom_asks().len(), 1);
        // op: 2 = delete.
        r.update_mkt_depth(70, 0, 2, 1, 0.0, Decimal::ZERO);
        assert!(ticker.dom_bids().is_empty());
    }
}
