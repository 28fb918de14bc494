//! Recording strategy and trade sink for assertion-based tests.

use crate::core::{Bar, KlinePeriod, OrderDetailData, OrderQueueData, TickRef, TransactionData};
use crate::engine::{Strategy, TradeCtx};
use crate::trader::TradeSink;
use parking_lot::Mutex;
use std::sync::Arc;

/// Everything a strategy observed, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyEvent {
    Init,
    SessionBegin(u32),
    SessionEnd(u32),
    Tick { code: String, price: f64 },
    Bar { code: String, period: KlinePeriod, times: u32, time: u32, close: f64 },
    OrderQueue(String),
    OrderDetail(String),
    Transaction(String),
    Order { local_id: u32, code: String, canceled: bool },
    Trade { local_id: u32, code: String, qty: f64 },
}

/// Strategy that records every callback; optionally panics on tick to
/// exercise the dispatch boundary.
pub struct RecordingStrategy {
    name: String,
    pub events: Arc<Mutex<Vec<StrategyEvent>>>,
    pub panic_on_tick: bool,
}

impl RecordingStrategy {
    pub fn new(name: &str) -> (Self, Arc<Mutex<Vec<StrategyEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                name: name.to_string(),
                events: events.clone(),
                panic_on_tick: false,
            },
            events,
        )
    }
}

impl Strategy for RecordingStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_init(&mut self, _ctx: &dyn TradeCtx) {
        self.events.lock().push(StrategyEvent::Init);
    }

    fn on_session_begin(&mut self, _ctx: &dyn TradeCtx, trading_date: u32) {
        self.events.lock().push(StrategyEvent::SessionBegin(trading_date));
    }

    fn on_session_end(&mut self, _ctx: &dyn TradeCtx, trading_date: u32) {
        self.events.lock().push(StrategyEvent::SessionEnd(trading_date));
    }

    fn on_tick(&mut self, _ctx: &dyn TradeCtx, code: &str, tick: &TickRef) {
        if self.panic_on_tick {
            panic!("scripted strategy failure");
        }
        self.events.lock().push(StrategyEvent::Tick {
            code: code.to_string(),
            price: tick.price,
        });
    }

    fn on_bar(
        &mut self,
        _ctx: &dyn TradeCtx,
        code: &str,
        period: KlinePeriod,
        times: u32,
        bar: &Bar,
    ) {
        self.events.lock().push(StrategyEvent::Bar {
            code: code.to_string(),
            period,
            times,
            time: bar.time,
            close: bar.close,
        });
    }

    fn on_order_queue(&mut self, _ctx: &dyn TradeCtx, code: &str, _data: &OrderQueueData) {
        self.events.lock().push(StrategyEvent::OrderQueue(code.to_string()));
    }

    fn on_order_detail(&mut self, _ctx: &dyn TradeCtx, code: &str, _data: &OrderDetailData) {
        self.events.lock().push(StrategyEvent::OrderDetail(code.to_string()));
    }

    fn on_transaction(&mut self, _ctx: &dyn TradeCtx, code: &str, _data: &TransactionData) {
        self.events.lock().push(StrategyEvent::Transaction(code.to_string()));
    }

    fn on_order(
        &mut self,
        _ctx: &dyn TradeCtx,
        local_id: u32,
        code: &str,
        _is_buy: bool,
        _total: f64,
        _left: f64,
        _price: f64,
        canceled: bool,
    ) {
        self.events.lock().push(StrategyEvent::Order {
            local_id,
            code: code.to_string(),
            canceled,
        });
    }

    fn on_trade(
        &mut self,
        _ctx: &dyn TradeCtx,
        local_id: u32,
        code: &str,
        _is_buy: bool,
        qty: f64,
        _price: f64,
    ) {
        self.events.lock().push(StrategyEvent::Trade {
            local_id,
            code: code.to_string(),
            qty,
        });
    }
}

/// Trade-sink events as the adapter fans them out.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Order { local_id: u32, code: String, left: f64, canceled: bool },
    Trade { local_id: u32, code: String, qty: f64, price: f64 },
    Entrust { local_id: u32, success: bool },
    ChannelReady,
    ChannelLost,
    Position { code: String, is_long: bool, total: f64 },
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take(&self) -> Vec<SinkEvent> {
        std::mem::take(&mut self.events.lock())
    }
}

impl TradeSink for RecordingSink {
    fn on_order(
        &self,
        local_id: u32,
        code: &str,
        _is_buy: bool,
        _total: f64,
        left: f64,
        _price: f64,
        canceled: bool,
    ) {
        self.events.lock().push(SinkEvent::Order {
            local_id,
            code: code.to_string(),
            left,
            canceled,
        });
    }

    fn on_trade(&self, local_id: u32, code: &str, _is_buy: bool, qty: f64, price: f64) {
        self.events.lock().push(SinkEvent::Trade {
            local_id,
            code: code.to_string(),
            qty,
            price,
        });
    }

    fn on_entrust(&self, local_id: u32, _code: &str, success: bool, _message: &str) {
        self.events.lock().push(SinkEvent::Entrust { local_id, success });
    }

    fn on_channel_ready(&self) {
        self.events.lock().push(SinkEvent::ChannelReady);
    }

    fn on_channel_lost(&self) {
        self.events.lock().push(SinkEvent::ChannelLost);
    }

    fn on_position(
        &self,
        code: &str,
        is_long: bool,
        pre_vol: f64,
        _pre_avail: f64,
        new_vol: f64,
        _new_avail: f64,
    ) {
        self.events.lock().push(SinkEvent::Position {
            code: code.to_string(),
            is_long,
            total: pre_vol + new_vol,
        });
    }
}
