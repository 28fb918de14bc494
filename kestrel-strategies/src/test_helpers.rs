//! Context stub for strategy unit tests: records every action and serves
//! scripted book/tick state.

use kestrel_core::core::{
    Bar, CoreResult, KlinePeriod, OrderDetailData, OrderQueueData, TickRef, TransactionData,
};
use kestrel_core::engine::TradeCtx;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, PartialEq)]
pub enum CtxAction {
    Buy { code: String, price: f64, qty: f64, force_close: bool },
    Sell { code: String, price: f64, qty: f64, force_close: bool },
    Cancel { local_id: u32 },
    CancelFor { code: String, is_buy: bool, qty: f64 },
    Subscribe { code: String, kind: &'static str },
}

#[derive(Default)]
pub struct MockCtx {
    pub actions: Mutex<Vec<CtxAction>>,
    positions: Mutex<HashMap<String, f64>>,
    undone: Mutex<HashMap<String, f64>>,
    last_tick: Mutex<Option<TickRef>>,
    next_id: AtomicU32,
}

impl MockCtx {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            ..Default::default()
        }
    }

    pub fn set_position(&self, code: &str, qty: f64) {
        self.positions.lock().insert(code.to_string(), qty);
    }

    pub fn set_undone(&self, code: &str, qty: f64) {
        self.undone.lock().insert(code.to_string(), qty);
    }

    pub fn set_last_tick(&self, tick: TickRef) {
        *self.last_tick.lock() = Some(tick);
    }
}

impl TradeCtx for MockCtx {
    fn id(&self) -> u32 {
        0
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn sub_ticks(&self, code: &str) {
        self.actions.lock().push(CtxAction::Subscribe {
            code: code.to_string(),
            kind: "ticks",
        });
    }

    fn sub_bars(&self, code: &str, _period: KlinePeriod, _times: u32) {
        self.actions.lock().push(CtxAction::Subscribe {
            code: code.to_string(),
            kind: "bars",
        });
    }

    fn sub_order_queue(&self, code: &str) {
        self.actions.lock().push(CtxAction::Subscribe {
            code: code.to_string(),
            kind: "order_queue",
        });
    }

    fn sub_order_detail(&self, code: &str) {
        self.actions.lock().push(CtxAction::Subscribe {
            code: code.to_string(),
            kind: "order_detail",
        });
    }

    fn sub_transaction(&self, code: &str) {
        self.actions.lock().push(CtxAction::Subscribe {
            code: code.to_string(),
            kind: "transaction",
        });
    }

    fn buy(&self, code: &str, price: f64, qty: f64, force_close: bool) -> Vec<u32> {
        self.actions.lock().push(CtxAction::Buy {
            code: code.to_string(),
            price,
            qty,
            force_close,
        });
        vec![self.next_id.fetch_add(1, Ordering::SeqCst)]
    }

    fn sell(&self, code: &str, price: f64, qty: f64, force_close: bool) -> Vec<u32> {
        self.actions.lock().push(CtxAction::Sell {
            code: code.to_string(),
            price,
            qty,
            force_close,
        });
        vec![self.next_id.fetch_add(1, Ordering::SeqCst)]
    }

    fn open_long(&self, code: &str, price: f64, qty: f64) -> CoreResult<u32> {
        self.buy(code, price, qty, false);
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn open_short(&self, code: &str, price: f64, qty: f64) -> CoreResult<u32> {
        self.sell(code, price, qty, false);
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn close_long(&self, code: &str, price: f64, qty: f64, _is_today: bool) -> CoreResult<u32> {
        self.sell(code, price, qty, true);
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn close_short(&self, code: &str, price: f64, qty: f64, _is_today: bool) -> CoreResult<u32> {
        self.buy(code, price, qty, true);
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn cancel(&self, local_id: u32) -> bool {
        self.actions.lock().push(CtxAction::Cancel { local_id });
        true
    }

    fn cancel_for(&self, code: &str, is_buy: bool, qty: f64) -> Vec<u32> {
        self.actions.lock().push(CtxAction::CancelFor {
            code: code.to_string(),
            is_buy,
            qty,
        });
        Vec::new()
    }

    fn position(&self, code: &str, _valid_only: bool, _flag: i32) -> f64 {
        self.positions.lock().get(code).copied().unwrap_or(0.0)
    }

    fn undone(&self, code: &str) -> f64 {
        self.undone.lock().get(code).copied().unwrap_or(0.0)
    }

    fn ticks(&self, _code: &str, _count: usize) -> Vec<TickRef> {
        Vec::new()
    }

    fn bars(&self, _code: &str, _period: KlinePeriod, _times: u32, _count: usize) -> Vec<Bar> {
        Vec::new()
    }

    fn last_tick(&self, _code: &str) -> Option<TickRef> {
        self.last_tick.lock().clone()
    }

    fn order_queue_slice(&self, _code: &str, _count: usize) -> Vec<OrderQueueData> {
        Vec::new()
    }

    fn order_detail_slice(&self, _code: &str, _count: usize) -> Vec<OrderDetailData> {
        Vec::new()
    }

    fn transaction_slice(&self, _code: &str, _count: usize) -> Vec<TransactionData> {
        Vec::new()
    }
}
