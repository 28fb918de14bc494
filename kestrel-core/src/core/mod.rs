//! Core types and errors shared by every other module.

pub mod errors;
pub mod types;

pub use errors::{CoreError, CoreResult};
pub use types::{
    product_of, AdjustFlag, Bar, KlinePeriod, Offset, OrderDetailData, OrderInfo, OrderQueueData,
    OrderState, Side, Tick, TickRef, TransactionData, DEPTH_LEVELS,
};
