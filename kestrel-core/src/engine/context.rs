//! Strategy contexts
//!
//! [`Strategy`] is what user code implements. [`StrategyContext`] is the
//! engine-side handle receiving every callback; [`HftContext`] is its
//! standard implementation, binding one strategy to one trader channel and
//! exposing engine services back to the strategy through [`TradeCtx`].

use crate::core::{
    Bar, CoreResult, KlinePeriod, OrderDetailData, OrderQueueData, TickRef, TransactionData,
};
use crate::engine::hft::HftEngine;
use crate::trader::{TradeSink, TraderAdapter};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Services a context offers to its strategy. Every call is safe from any
/// callback.
pub trait TradeCtx: Send + Sync {
    fn id(&self) -> u32;
    fn name(&self) -> &str;

    // Subscriptions
    fn sub_ticks(&self, code: &str);
    fn sub_bars(&self, code: &str, period: KlinePeriod, times: u32);
    fn sub_order_queue(&self, code: &str);
    fn sub_order_detail(&self, code: &str);
    fn sub_transaction(&self, code: &str);

    // Orders
    fn buy(&self, code: &str, price: f64, qty: f64, force_close: bool) -> Vec<u32>;
    fn sell(&self, code: &str, price: f64, qty: f64, force_close: bool) -> Vec<u32>;
    fn open_long(&self, code: &str, price: f64, qty: f64) -> CoreResult<u32>;
    fn open_short(&self, code: &str, price: f64, qty: f64) -> CoreResult<u32>;
    fn close_long(&self, code: &str, price: f64, qty: f64, is_today: bool) -> CoreResult<u32>;
    fn close_short(&self, code: &str, price: f64, qty: f64, is_today: bool) -> CoreResult<u32>;
    fn cancel(&self, local_id: u32) -> bool;
    fn cancel_for(&self, code: &str, is_buy: bool, qty: f64) -> Vec<u32>;

    // Book queries
    fn position(&self, code: &str, valid_only: bool, flag: i32) -> f64;
    fn undone(&self, code: &str) -> f64;

    // Data access
    fn ticks(&self, code: &str, count: usize) -> Vec<TickRef>;
    fn bars(&self, code: &str, period: KlinePeriod, times: u32, count: usize) -> Vec<Bar>;
    fn last_tick(&self, code: &str) -> Option<TickRef>;
    fn order_queue_slice(&self, code: &str, count: usize) -> Vec<OrderQueueData>;
    fn order_detail_slice(&self, code: &str, count: usize) -> Vec<OrderDetailData>;
    fn transaction_slice(&self, code: &str, count: usize) -> Vec<TransactionData>;
}

/// User strategy. Callbacks run on whichever thread delivers the event; the
/// engine never runs two callbacks of the same context concurrently.
#[allow(unused_variables)]
pub trait Strategy: Send {
    fn name(&self) -> &str;

    fn on_init(&mut self, ctx: &dyn TradeCtx) {}
    fn on_session_begin(&mut self, ctx: &dyn TradeCtx, trading_date: u32) {}
    fn on_session_end(&mut self, ctx: &dyn TradeCtx, trading_date: u32) {}

    fn on_tick(&mut self, ctx: &dyn TradeCtx, code: &str, tick: &TickRef) {}
    fn on_bar(
        &mut self,
        ctx: &dyn TradeCtx,
        code: &str,
        period: KlinePeriod,
        times: u32,
        bar: &Bar,
    ) {
    }
    fn on_order_queue(&mut self, ctx: &dyn TradeCtx, code: &str, data: &OrderQueueData) {}
    fn on_order_detail(&mut self, ctx: &dyn TradeCtx, code: &str, data: &OrderDetailData) {}
    fn on_transaction(&mut self, ctx: &dyn TradeCtx, code: &str, data: &TransactionData) {}

    fn on_order(
        &mut self,
        ctx: &dyn TradeCtx,
        local_id: u32,
        code: &str,
        is_buy: bool,
        total: f64,
        left: f64,
        price: f64,
        canceled: bool,
    ) {
    }
    fn on_trade(
        &mut self,
        ctx: &dyn TradeCtx,
        local_id: u32,
        code: &str,
        is_buy: bool,
        qty: f64,
        price: f64,
    ) {
    }
}

/// Engine-side handle of a live strategy; target of all callbacks.
pub trait StrategyContext: Send + Sync {
    fn id(&self) -> u32;
    fn name(&self) -> &str;

    fn on_init(&self);
    fn on_session_begin(&self, trading_date: u32);
    fn on_session_end(&self, trading_date: u32);
    fn on_tick(&self, code: &str, tick: &TickRef);
    fn on_bar(&self, code: &str, period: KlinePeriod, times: u32, bar: &Bar);
    fn on_order_queue(&self, code: &str, data: &OrderQueueData);
    fn on_order_detail(&self, code: &str, data: &OrderDetailData);
    fn on_transaction(&self, code: &str, data: &TransactionData);
    fn on_order(
        &self,
        local_id: u32,
        code: &str,
        is_buy: bool,
        total: f64,
        left: f64,
        price: f64,
        canceled: bool,
    );
    fn on_trade(&self, local_id: u32, code: &str, is_buy: bool, qty: f64, price: f64);
}

/// Standard context: one strategy, one trader channel, a weak link back to
/// the engine (the engine owns the context, not the other way around).
pub struct HftContext {
    id: u32,
    name: String,
    engine: Weak<HftEngine>,
    trader: Arc<TraderAdapter>,
    strategy: Mutex<Box<dyn Strategy>>,
}

impl HftContext {
    pub fn new(
        id: u32,
        name: &str,
        engine: &Arc<HftEngine>,
        trader: Arc<TraderAdapter>,
        strategy: Box<dyn Strategy>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: name.to_string(),
            engine: Arc::downgrade(engine),
            trader,
            strategy: Mutex::new(strategy),
        })
    }

    fn with_engine<T>(&self, f: impl FnOnce(&HftEngine) -> T) -> Option<T> {
        self.engine.upgrade().map(|e| f(&e))
    }
}

impl TradeCtx for HftContext {
    fn id(&self) -> u32 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn sub_ticks(&self, code: &str) {
        let _ = self.with_engine(|e| e.sub_ticks(self.id, code));
    }

    fn sub_bars(&self, code: &str, period: KlinePeriod, times: u32) {
        let _ = self.with_engine(|e| e.sub_bars(self.id, code, period, times));
    }

    fn sub_order_queue(&self, code: &str) {
        let _ = self.with_engine(|e| e.sub_order_queue(self.id, code));
    }

    fn sub_order_detail(&self, code: &str) {
        let _ = self.with_engine(|e| e.sub_order_detail(self.id, code));
    }

    fn sub_transaction(&self, code: &str) {
        let _ = self.with_engine(|e| e.sub_transaction(self.id, code));
    }

    fn buy(&self, code: &str, price: f64, qty: f64, force_close: bool) -> Vec<u32> {
        self.trader.buy(code, price, qty, force_close)
    }

    fn sell(&self, code: &str, price: f64, qty: f64, force_close: bool) -> Vec<u32> {
        self.trader.sell(code, price, qty, force_close)
    }

    fn open_long(&self, code: &str, price: f64, qty: f64) -> CoreResult<u32> {
        self.trader.open_long(code, price, qty)
    }

    fn open_short(&self, code: &str, price: f64, qty: f64) -> CoreResult<u32> {
        self.trader.open_short(code, price, qty)
    }

    fn close_long(&self, code: &str, price: f64, qty: f64, is_today: bool) -> CoreResult<u32> {
        self.trader.close_long(code, price, qty, is_today)
    }

    fn close_short(&self, code: &str, price: f64, qty: f64, is_today: bool) -> CoreResult<u32> {
        self.trader.close_short(code, price, qty, is_today)
    }

    fn cancel(&self, local_id: u32) -> bool {
        self.trader.cancel(local_id)
    }

    fn cancel_for(&self, code: &str, is_buy: bool, qty: f64) -> Vec<u32> {
        self.trader.cancel_for(code, is_buy, qty)
    }

    fn position(&self, code: &str, valid_only: bool, flag: i32) -> f64 {
        self.trader.get_position(code, valid_only, flag)
    }

    fn undone(&self, code: &str) -> f64 {
        self.trader.get_undone(code)
    }

    fn ticks(&self, code: &str, count: usize) -> Vec<TickRef> {
        self.with_engine(|e| e.data().get_tick_slice(code, count))
            .unwrap_or_default()
    }

    fn bars(&self, code: &str, period: KlinePeriod, times: u32, count: usize) -> Vec<Bar> {
        self.with_engine(|e| e.data().get_kline_slice(code, period, times, count))
            .unwrap_or_default()
    }

    fn last_tick(&self, code: &str) -> Option<TickRef> {
        self.with_engine(|e| e.data().grab_last_tick(code)).flatten()
    }

    fn order_queue_slice(&self, code: &str, count: usize) -> Vec<OrderQueueData> {
        self.with_engine(|e| e.data().get_order_queue_slice(code, count))
            .unwrap_or_default()
    }

    fn order_detail_slice(&self, code: &str, count: usize) -> Vec<OrderDetailData> {
        self.with_engine(|e| e.data().get_order_detail_slice(code, count))
            .unwrap_or_default()
    }

    fn transaction_slice(&self, code: &str, count: usize) -> Vec<TransactionData> {
        self.with_engine(|e| e.data().get_transaction_slice(code, count))
            .unwrap_or_default()
    }
}

impl StrategyContext for HftContext {
    fn id(&self) -> u32 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn on_init(&self) {
        self.strategy.lock().on_init(self);
    }

    fn on_session_begin(&self, trading_date: u32) {
        self.strategy.lock().on_session_begin(self, trading_date);
    }

    fn on_session_end(&self, trading_date: u32) {
        self.strategy.lock().on_session_end(self, trading_date);
    }

    fn on_tick(&self, code: &str, tick: &TickRef) {
        self.strategy.lock().on_tick(self, code, tick);
    }

    fn on_bar(&self, code: &str, period: KlinePeriod, times: u32, bar: &Bar) {
        self.strategy.lock().on_bar(self, code, period, times, bar);
    }

    fn on_order_queue(&self, code: &str, data: &OrderQueueData) {
        self.strategy.lock().on_order_queue(self, code, data);
    }

    fn on_order_detail(&self, code: &str, data: &OrderDetailData) {
        self.strategy.lock().on_order_detail(self, code, data);
    }

    fn on_transaction(&self, code: &str, data: &TransactionData) {
        self.strategy.lock().on_transaction(self, code, data);
    }

    fn on_order(
        &self,
        local_id: u32,
        code: &str,
        is_buy: bool,
        total: f64,
        left: f64,
        price: f64,
        canceled: bool,
    ) {
        self.strategy
            .lock()
            .on_order(self, local_id, code, is_buy, total, left, price, canceled);
    }

    fn on_trade(&self, local_id: u32, code: &str, is_buy: bool, qty: f64, price: f64) {
        self.strategy
            .lock()
            .on_trade(self, local_id, code, is_buy, qty, price);
    }
}

/// Broker-side notifications route straight into the strategy callbacks.
impl TradeSink for HftContext {
    fn on_order(
        &self,
        local_id: u32,
        code: &str,
        is_buy: bool,
        total: f64,
        left: f64,
        price: f64,
        canceled: bool,
    ) {
        StrategyContext::on_order(self, local_id, code, is_buy, total, left, price, canceled);
    }

    fn on_trade(&self, local_id: u32, code: &str, is_buy: bool, qty: f64, price: f64) {
        StrategyContext::on_trade(self, local_id, code, is_buy, qty, price);
    }

    fn on_channel_ready(&self) {
        tracing::info!("strategy {} channel ready", self.name);
    }

    fn on_channel_lost(&self) {
        tracing::warn!("strategy {} channel lost", self.name);
    }
}
