//! HFT engine: strategy registry, subscription fan-out, session events.

mod context;
mod hft;
mod registry;

pub use context::{HftContext, Strategy, StrategyContext, TradeCtx};
pub use hft::HftEngine;
pub use registry::{StrategyFactory, StrategyRegistry};
