//! Momentum taker
//!
//! Watches one instrument and takes liquidity when the last few ticks
//! drift beyond a threshold: buys into upward drift, sells into downward
//! drift, and flattens at session end. Position and outstanding intent are
//! read back from the trader book before every action so the strategy
//! never pyramids past its cap.

use kestrel_core::core::TickRef;
use kestrel_core::engine::{Strategy, TradeCtx};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct MomentumTakerParams {
    pub code: String,
    /// Ticks in the drift window.
    pub window: usize,
    /// Minimum absolute drift (price units) before acting.
    pub threshold: f64,
    /// Lots per entry.
    pub lots: f64,
    /// Net position cap, either direction.
    pub max_position: f64,
}

impl Default for MomentumTakerParams {
    fn default() -> Self {
        Self {
            code: String::new(),
            window: 16,
            threshold: 2.0,
            lots: 1.0,
            max_position: 5.0,
        }
    }
}

pub struct MomentumTaker {
    name: String,
    params: MomentumTakerParams,
    prices: VecDeque<f64>,
}

impl MomentumTaker {
    pub fn new(name: &str, params: MomentumTakerParams) -> Self {
        Self {
            name: name.to_string(),
            params,
            prices: VecDeque::new(),
        }
    }

    fn drift(&self) -> Option<f64> {
        if self.prices.len() < self.params.window {
            return None;
        }
        Some(self.prices.back()? - self.prices.front()?)
    }
}

impl Strategy for MomentumTaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_init(&mut self, ctx: &dyn TradeCtx) {
        ctx.sub_ticks(&self.params.code);
        tracing::info!(
            "{} watching {} (window {}, threshold {})",
            self.name,
            self.params.code,
            self.params.window,
            self.params.threshold
        );
    }

    fn on_session_begin(&mut self, _ctx: &dyn TradeCtx, _trading_date: u32) {
        self.prices.clear();
    }

    fn on_tick(&mut self, ctx: &dyn TradeCtx, code: &str, tick: &TickRef) {
        if code != self.params.code {
            return;
        }
        self.prices.push_back(tick.price);
        if self.prices.len() > self.params.window {
            self.prices.pop_front();
        }

        let Some(drift) = self.drift() else {
            return;
        };
        if drift.abs() < self.params.threshold {
            return;
        }

        let net = ctx.position(code, false, 3);
        let undone = ctx.undone(code);
        let exposure = net + undone;

        if drift > 0.0 && exposure < self.params.max_position {
            let qty = self.params.lots.min(self.params.max_position - exposure);
            let ids = ctx.buy(code, tick.best_ask().max(tick.price), qty, false);
            if !ids.is_empty() {
                self.prices.clear();
            }
        } else if drift < 0.0 && exposure > -self.params.max_position {
            let qty = self.params.lots.min(self.params.max_position + exposure);
            let ids = ctx.sell(code, tick.best_bid().min(tick.price), qty, false);
            if !ids.is_empty() {
                self.prices.clear();
            }
        }
    }

    fn on_session_end(&mut self, ctx: &dyn TradeCtx, trading_date: u32) {
        // Pull outstanding orders, then flatten whatever remains.
        ctx.cancel_for(&self.params.code, true, 0.0);
        ctx.cancel_for(&self.params.code, false, 0.0);

        let net = ctx.position(&self.params.code, false, 3);
        if let Some(tick) = ctx.last_tick(&self.params.code) {
            if net > 0.0 {
                ctx.sell(&self.params.code, tick.best_bid().min(tick.price), net, true);
            } else if net < 0.0 {
                ctx.buy(&self.params.code, tick.best_ask().max(tick.price), -net, true);
            }
        }
        tracing::info!("{} flattened for {}", self.name, trading_date);
    }

    fn on_trade(
        &mut self,
        _ctx: &dyn TradeCtx,
        _local_id: u32,
        code: &str,
        is_buy: bool,
        qty: f64,
        price: f64,
    ) {
        tracing::debug!(
            "{} filled {} {} {}@{}",
            self.name,
            if is_buy { "buy" } else { "sell" },
            code,
            qty,
            price
        );
    }
}
