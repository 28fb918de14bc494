//! Test doubles shared by unit and integration tests.

mod mock_broker;
mod recorders;

pub use mock_broker::MockBroker;
pub use recorders::{RecordingSink, RecordingStrategy, SinkEvent, StrategyEvent};

use crate::core::{Tick, TickRef};
use std::sync::Arc;

/// Tick with a populated top of book, for dispatch tests.
pub fn make_tick(code: &str, date: u32, time: u32, price: f64) -> TickRef {
    let mut tick = Tick::new(code, date, time, price);
    tick.bid_prices[0] = price - 1.0;
    tick.bid_qtys[0] = 10.0;
    tick.ask_prices[0] = price + 1.0;
    tick.ask_qtys[0] = 10.0;
    Arc::new(tick)
}
