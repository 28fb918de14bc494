//! Trader adapter: order lifecycle, position accounting, risk enforcement.

mod adapter;
pub mod broker;
mod position;
mod risk;

pub use adapter::{AdapterState, TraderAdapter, TraderAdapterMgr};
pub use broker::{
    BrokerApi, BrokerOrder, BrokerPosition, BrokerSpi, BrokerTrade, CancelAction, ChannelEvent,
    Entrust, TradeSink,
};
pub use position::{PositionItem, SidePosition};
pub use risk::{RiskMonitor, RiskParams, RiskVerdict};
