//! Core market and order types
//!
//! Everything here is plain data: ticks, L2 events, bars, orders. Prices and
//! quantities are f64 end-to-end, matching the upstream broker wire formats.
//! Dates are encoded `YYYYMMDD`, intraday times `HHMMSSmmm` (milliseconds).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Depth of the bid/ask ladder carried on every tick.
pub const DEPTH_LEVELS: usize = 10;

/// Suffix marking a back-adjusted subscription (`code+`).
pub const SUFFIX_BACK_ADJUSTED: char = '+';
/// Suffix marking a forward-adjusted subscription (`code-`).
pub const SUFFIX_FORWARD_ADJUSTED: char = '-';

/// Price adjustment mode for a subscription.
///
/// Encoded as the numeric flag stored in subscription tables:
/// 0 = none, 1 = forward, 2 = backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AdjustFlag {
    None = 0,
    Forward = 1,
    Backward = 2,
}

impl AdjustFlag {
    /// Split `code+` / `code-` into the bare code and its adjustment flag.
    pub fn split_code(code: &str) -> (&str, AdjustFlag) {
        if let Some(stripped) = code.strip_suffix(SUFFIX_BACK_ADJUSTED) {
            (stripped, AdjustFlag::Backward)
        } else if let Some(stripped) = code.strip_suffix(SUFFIX_FORWARD_ADJUSTED) {
            (stripped, AdjustFlag::Forward)
        } else {
            (code, AdjustFlag::None)
        }
    }

    /// Re-attach the suffix this flag stands for.
    pub fn decorate(&self, code: &str) -> String {
        match self {
            AdjustFlag::None => code.to_string(),
            AdjustFlag::Forward => format!("{}{}", code, SUFFIX_FORWARD_ADJUSTED),
            AdjustFlag::Backward => format!("{}{}", code, SUFFIX_BACK_ADJUSTED),
        }
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    Buy = 0,
    Sell = 1,
}

impl Side {
    #[inline]
    pub fn is_buy(&self) -> bool {
        matches!(self, Side::Buy)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Offset of a concrete order: whether it opens exposure or closes an
/// existing bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Offset {
    Open = 0,
    /// Close without day preference: yesterday's bucket drains first.
    Close = 1,
    CloseToday = 2,
    CloseYesterday = 3,
}

impl Offset {
    #[inline]
    pub fn is_close(&self) -> bool {
        !matches!(self, Offset::Open)
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Offset::Open => write!(f, "open"),
            Offset::Close => write!(f, "close"),
            Offset::CloseToday => write!(f, "closetoday"),
            Offset::CloseYesterday => write!(f, "closeyesterday"),
        }
    }
}

/// Order lifecycle state.
///
/// Terminal states are exactly `Filled`, `Canceled` and `Error`; everything
/// else can still receive fills or acknowledgments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderState {
    New = 0,
    Submitted = 1,
    PartFilled = 2,
    Filled = 3,
    Canceled = 4,
    Error = 5,
}

impl OrderState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Filled | OrderState::Canceled | OrderState::Error)
    }
}

/// Local view of an order, keyed by the process-monotonic `local_id`.
#[derive(Debug, Clone)]
pub struct OrderInfo {
    pub local_id: u32,
    pub code: String,
    pub side: Side,
    pub offset: Offset,
    pub price: f64,
    /// Original order quantity.
    pub total: f64,
    /// Quantity still live at the exchange.
    pub left: f64,
    pub state: OrderState,
    /// Broker-side order reference, once acknowledged.
    pub order_ref: Option<String>,
}

impl OrderInfo {
    pub fn new(local_id: u32, code: &str, side: Side, offset: Offset, price: f64, qty: f64) -> Self {
        Self {
            local_id,
            code: code.to_string(),
            side,
            offset,
            price,
            total: qty,
            left: qty,
            state: OrderState::New,
            order_ref: None,
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.state.is_terminal()
    }
}

/// Immutable market snapshot for one instrument.
///
/// Created by the feed; the engine clones and rescales price fields when it
/// delivers a back-adjusted view, so the struct stays `Clone`. Shared between
/// caches via `Arc<Tick>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub code: String,
    /// Calendar date the quote was generated, `YYYYMMDD`.
    pub action_date: u32,
    /// Intraday time, `HHMMSSmmm`.
    pub action_time: u32,
    /// Trading date the quote belongs to (differs from `action_date` in
    /// overnight sessions), `YYYYMMDD`.
    pub trading_date: u32,
    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub bid_prices: [f64; DEPTH_LEVELS],
    pub bid_qtys: [f64; DEPTH_LEVELS],
    pub ask_prices: [f64; DEPTH_LEVELS],
    pub ask_qtys: [f64; DEPTH_LEVELS],
}

impl Tick {
    pub fn new(code: &str, action_date: u32, action_time: u32, price: f64) -> Self {
        Self {
            code: code.to_string(),
            action_date,
            action_time,
            trading_date: action_date,
            price,
            open: price,
            high: price,
            low: price,
            volume: 0.0,
            bid_prices: [0.0; DEPTH_LEVELS],
            bid_qtys: [0.0; DEPTH_LEVELS],
            ask_prices: [0.0; DEPTH_LEVELS],
            ask_qtys: [0.0; DEPTH_LEVELS],
        }
    }

    #[inline]
    pub fn best_bid(&self) -> f64 {
        self.bid_prices[0]
    }

    #[inline]
    pub fn best_ask(&self) -> f64 {
        self.ask_prices[0]
    }

    /// Intraday minute, `HHMM`.
    #[inline]
    pub fn minute(&self) -> u32 {
        self.action_time / 100_000
    }

    /// Clone with open/high/low/price multiplied by `factor` and the code
    /// rewritten; used for back-adjusted delivery.
    pub fn adjusted(&self, code: &str, factor: f64) -> Tick {
        let mut t = self.clone();
        t.code = code.to_string();
        t.open *= factor;
        t.high *= factor;
        t.low *= factor;
        t.price *= factor;
        t
    }
}

/// One level-2 order queue snapshot (resting volume per queue position).
#[derive(Debug, Clone)]
pub struct OrderQueueData {
    pub code: String,
    pub action_date: u32,
    pub action_time: u32,
    pub side: Side,
    pub price: f64,
    pub qtys: Vec<f64>,
}

/// One level-2 order detail event (a single placed/pulled order).
#[derive(Debug, Clone)]
pub struct OrderDetailData {
    pub code: String,
    pub action_date: u32,
    pub action_time: u32,
    pub side: Side,
    pub price: f64,
    pub qty: f64,
}

/// One level-2 transaction event (an exchange match).
#[derive(Debug, Clone)]
pub struct TransactionData {
    pub code: String,
    pub action_date: u32,
    pub action_time: u32,
    pub side: Side,
    pub price: f64,
    pub qty: f64,
}

/// Bar period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KlinePeriod {
    Minute1,
    Minute5,
    Day,
}

impl KlinePeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            KlinePeriod::Minute1 => "m1",
            KlinePeriod::Minute5 => "m5",
            KlinePeriod::Day => "d1",
        }
    }

    pub fn parse(s: &str) -> Option<KlinePeriod> {
        match s {
            "m1" => Some(KlinePeriod::Minute1),
            "m5" => Some(KlinePeriod::Minute5),
            "d1" => Some(KlinePeriod::Day),
            _ => None,
        }
    }

    /// Base length in session minutes (0 for day bars).
    pub fn minutes(&self) -> u32 {
        match self {
            KlinePeriod::Minute1 => 1,
            KlinePeriod::Minute5 => 5,
            KlinePeriod::Day => 0,
        }
    }
}

impl fmt::Display for KlinePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed (or in-flight) K-line bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub date: u32,
    /// Closing minute of the bar, `HHMM`.
    pub time: u32,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn from_tick(tick: &Tick, time: u32) -> Self {
        Self {
            date: tick.action_date,
            time,
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: tick.price,
            volume: tick.volume,
        }
    }

    /// Fold one more tick into an in-flight bar.
    pub fn merge_tick(&mut self, tick: &Tick) {
        self.high = self.high.max(tick.price);
        self.low = self.low.min(tick.price);
        self.close = tick.price;
        self.volume += tick.volume;
    }
}

/// Shared tick handle as handed to caches and strategies.
pub type TickRef = Arc<Tick>;

/// Product id of an instrument code: the alphabetic head of the symbol,
/// exchange prefix dropped. `"SHFE.rb2501"` and `"rb2501"` both map to
/// `"rb"`.
pub fn product_of(code: &str) -> &str {
    let symbol = code.rsplit('.').next().unwrap_or(code);
    let head = symbol
        .char_indices()
        .find(|(_, c)| c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(symbol.len());
    &symbol[..head]
}
