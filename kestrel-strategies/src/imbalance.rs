//! Queue-imbalance strategy
//!
//! Reads the resting order queues on both sides of the book and leans with
//! the heavier side: a strongly bid-heavy book buys, ask-heavy sells. The
//! signal works off L2 order-queue snapshots, with transactions used only
//! to age out stale state.

use kestrel_core::core::{OrderQueueData, Side, TransactionData};
use kestrel_core::engine::{Strategy, TradeCtx};

#[derive(Debug, Clone)]
pub struct QueueImbalanceParams {
    pub code: String,
    /// Imbalance ratio (heavy side / light side) that triggers an entry.
    pub ratio: f64,
    pub lots: f64,
    pub max_position: f64,
}

impl Default for QueueImbalanceParams {
    fn default() -> Self {
        Self {
            code: String::new(),
            ratio: 3.0,
            lots: 1.0,
            max_position: 3.0,
        }
    }
}

pub struct QueueImbalance {
    name: String,
    params: QueueImbalanceParams,
    bid_depth: f64,
    ask_depth: f64,
}

impl QueueImbalance {
    pub fn new(name: &str, params: QueueImbalanceParams) -> Self {
        Self {
            name: name.to_string(),
            params,
            bid_depth: 0.0,
            ask_depth: 0.0,
        }
    }

    fn signal(&self) -> Option<Side> {
        if self.bid_depth <= 0.0 || self.ask_depth <= 0.0 {
            return None;
        }
        if self.bid_depth / self.ask_depth >= self.params.ratio {
            Some(Side::Buy)
        } else if self.ask_depth / self.bid_depth >= self.params.ratio {
            Some(Side::Sell)
        } else {
            None
        }
    }
}

impl Strategy for QueueImbalance {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_init(&mut self, ctx: &dyn TradeCtx) {
        ctx.sub_ticks(&self.params.code);
        ctx.sub_order_queue(&self.params.code);
        ctx.sub_transaction(&self.params.code);
    }

    fn on_session_begin(&mut self, _ctx: &dyn TradeCtx, _trading_date: u32) {
        self.bid_depth = 0.0;
        self.ask_depth = 0.0;
    }

    fn on_order_queue(&mut self, ctx: &dyn TradeCtx, code: &str, data: &OrderQueueData) {
        if code != self.params.code {
            return;
        }
        let depth: f64 = data.qtys.iter().sum();
        match data.side {
            Side::Buy => self.bid_depth = depth,
            Side::Sell => self.ask_depth = depth,
        }

        let Some(side) = self.signal() else {
            return;
        };
        let Some(tick) = ctx.last_tick(code) else {
            return;
        };

        let exposure = ctx.position(code, false, 3) + ctx.undone(code);
        match side {
            Side::Buy if exposure < self.params.max_position => {
                let qty = self.params.lots.min(self.params.max_position - exposure);
                ctx.buy(code, tick.best_ask().max(tick.price), qty, false);
            }
            Side::Sell if exposure > -self.params.max_position => {
                let qty = self.params.lots.min(self.params.max_position + exposure);
                ctx.sell(code, tick.best_bid().min(tick.price), qty, false);
            }
            _ => {}
        }
    }

    fn on_transaction(&mut self, _ctx: &dyn TradeCtx, code: &str, _data: &TransactionData) {
        if code != self.params.code {
            return;
        }
        // Trades eat queued volume; decay the cached depths until the next
        // queue snapshot replaces them.
        self.bid_depth *= 0.95;
        self.ask_depth *= 0.95;
    }

    fn on_session_end(&mut self, ctx: &dyn TradeCtx, _trading_date: u32) {
        ctx.cancel_for(&self.params.code, true, 0.0);
        ctx.cancel_for(&self.params.code, false, 0.0);
    }
}
