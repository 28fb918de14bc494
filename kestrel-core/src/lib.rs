//! Kestrel Core - Event-Driven HFT Engine
//!
//! Kestrel is a single-process runtime that ingests real-time market data
//! (ticks, L2 order queues, order details, transactions), fans it out to
//! user strategies, routes orders through broker adapters, and enforces
//! trading-risk, position-accounting and self-match invariants on every
//! outbound action.
//!
//! ## Core Modules
//! - `core`: market/order types and the error taxonomy
//! - `pool`: bounded worker pool with scheduling/shutdown policies, futures
//! - `policy`: per-product action rules (open/close/close-today splits)
//! - `trader`: broker channels, order lifecycle, positions, risk gate
//! - `data`: live tick/L2/bar caches and slice retrieval
//! - `ticker`: session clock, minute-close scheduling, forced session end
//! - `engine`: strategy contexts, subscription routing, session events
//!
//! ## Threading
//! Broker and feed adapters deliver callbacks from their own threads; the
//! ticker runs one background thread; strategies run on whichever thread
//! delivers the event and are never called concurrently for one context.

pub mod config;
pub mod core;
pub mod data;
pub mod engine;
pub mod notifier;
pub mod policy;
pub mod pool;
pub mod ticker;
pub mod trader;

// Test doubles; compiled for tests and for downstream crates' tests.
pub mod testing;

// Re-export core types
pub use crate::core::{
    AdjustFlag, Bar, CoreError, CoreResult, KlinePeriod, Offset, OrderInfo, OrderState, Side,
    Tick, TickRef,
};
pub use engine::{HftContext, HftEngine, Strategy, StrategyContext, StrategyFactory, TradeCtx};
pub use trader::{AdapterState, TraderAdapter, TraderAdapterMgr};

// Re-export error types
pub use anyhow::{Error, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::core::{
        AdjustFlag, Bar, KlinePeriod, Offset, OrderInfo, OrderState, Side, Tick, TickRef,
    };
    pub use crate::data::DataManager;
    pub use crate::engine::{
        HftContext, HftEngine, Strategy, StrategyContext, StrategyFactory, StrategyRegistry,
        TradeCtx,
    };
    pub use crate::policy::{ActionPolicy, ActionRule, ActionType};
    pub use crate::pool::{schedule_future, Future, SchedulePolicy, ShutdownPolicy, WorkerPool};
    pub use crate::ticker::{RtTicker, SessionInfo};
    pub use crate::trader::{RiskParams, TraderAdapter, TraderAdapterMgr};
    pub use crate::{CoreError, CoreResult};
}
