//! Broker channel seams
//!
//! The trader adapter talks to a concrete broker through [`BrokerApi`] and
//! receives that broker's asynchronous callbacks through [`BrokerSpi`]
//! (implemented by the adapter itself). Strategies observe the adapter
//! through [`TradeSink`]. The concrete network protocols live outside the
//! core; tests drive the Spi directly.

use crate::core::{Offset, OrderState, Side};
use std::sync::Arc;

/// Outgoing order as handed to a broker.
#[derive(Debug, Clone)]
pub struct Entrust {
    pub local_id: u32,
    pub code: String,
    pub side: Side,
    pub offset: Offset,
    pub price: f64,
    pub qty: f64,
}

/// Cancel request for a previously acknowledged order.
#[derive(Debug, Clone)]
pub struct CancelAction {
    pub local_id: u32,
    pub order_ref: String,
    pub code: String,
}

/// Order snapshot as reported by a broker (query response or push).
#[derive(Debug, Clone)]
pub struct BrokerOrder {
    pub local_id: u32,
    /// Broker-side order reference; stable across pushes.
    pub order_ref: String,
    pub code: String,
    pub side: Side,
    pub offset: Offset,
    pub price: f64,
    pub total: f64,
    pub left: f64,
    pub state: OrderState,
}

/// Fill as reported by a broker.
#[derive(Debug, Clone)]
pub struct BrokerTrade {
    pub order_ref: String,
    /// Exchange trade id; both sides of a self-match carry the same one.
    pub trade_ref: String,
    pub code: String,
    pub side: Side,
    pub offset: Offset,
    pub price: f64,
    pub qty: f64,
}

/// Yesterday/today position snapshot from the query phase.
#[derive(Debug, Clone)]
pub struct BrokerPosition {
    pub code: String,
    pub long: bool,
    pub pre_vol: f64,
    pub pre_avail: f64,
    pub new_vol: f64,
    pub new_avail: f64,
}

/// Channel-level events a broker reports outside the normal callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
}

/// Driver side of a broker connection. One implementation per counterparty
/// protocol; all calls are non-blocking requests whose answers arrive on
/// the Spi.
pub trait BrokerApi: Send + Sync {
    /// Open the connection and start the login flow. Responses land on
    /// `spi` from the broker's own thread.
    fn connect(&self, spi: Arc<dyn BrokerSpi>);

    fn submit(&self, entrust: &Entrust) -> anyhow::Result<()>;

    fn cancel(&self, action: &CancelAction) -> anyhow::Result<()>;

    fn query_account(&self);
    fn query_positions(&self);
    fn query_orders(&self);
    fn query_trades(&self);
}

/// Receiver side of a broker connection; the trader adapter implements it.
/// Callbacks arrive on the broker's I/O thread.
pub trait BrokerSpi: Send + Sync {
    fn on_channel_event(&self, event: ChannelEvent);

    fn on_login_result(&self, success: bool, message: &str, trading_date: u32);

    /// Entrust acknowledgment; `error` set means the order never reached
    /// the book.
    fn on_entrust_result(&self, local_id: u32, code: &str, error: Option<&str>);

    fn on_account(&self, balance: f64, available: f64);
    fn on_positions(&self, positions: &[BrokerPosition]);
    fn on_orders(&self, orders: &[BrokerOrder]);
    fn on_trades(&self, trades: &[BrokerTrade]);

    fn on_push_order(&self, order: &BrokerOrder);
    fn on_push_trade(&self, trade: &BrokerTrade);
}

/// Notifications the adapter fans out to interested parties (strategy
/// contexts, monitors).
pub trait TradeSink: Send + Sync {
    /// Order progress; `canceled` covers both cancels and rejects.
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

    /// Entrust outcome before any book change.
    fn on_entrust(&self, _local_id: u32, _code: &str, _success: bool, _message: &str) {}

    fn on_channel_ready(&self) {}
    fn on_channel_lost(&self) {}

    /// Replayed once per known position when the channel becomes ready.
    fn on_position(
        &self,
        _code: &str,
        _is_long: bool,
        _pre_vol: f64,
        _pre_avail: f64,
        _new_vol: f64,
        _new_avail: f64,
    ) {
    }
}
