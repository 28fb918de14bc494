//! Trader adapter
//!
//! One adapter per broker channel. It owns the order lifecycle (local id
//! allocation, state tracking, bidirectional broker-ref mapping), the
//! position and undone books, the risk gate, self-match detection, and the
//! translation of direction-only intents into concrete offset orders via
//! the action policy.
//!
//! Orders may only leave while the channel is `AllReady`; nothing is
//! buffered in earlier states, so callers check
//! [`TraderAdapter::is_ready`].

use super::broker::{
    BrokerApi, BrokerOrder, BrokerPosition, BrokerSpi, BrokerTrade, CancelAction, ChannelEvent,
    Entrust, TradeSink,
};
use super::position::PositionItem;
use super::risk::{RiskMonitor, RiskParams, RiskVerdict};
use crate::core::{product_of, CoreError, CoreResult, Offset, OrderInfo, OrderState, Side};
use crate::notifier::{notify_error, EventNotifier};
use crate::policy::{ActionPolicy, ActionRule, ActionType};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

/// Channel readiness progression. Failure at login parks the adapter in
/// `LoginFailed` until the next retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AdapterState {
    NotLoggedIn = 0,
    LoggingIn = 1,
    LoggedIn = 2,
    LoginFailed = 3,
    PositionQueried = 4,
    OrdersQueried = 5,
    TradesQueried = 6,
    AllReady = 7,
}

impl AdapterState {
    fn from_u8(v: u8) -> AdapterState {
        match v {
            1 => AdapterState::LoggingIn,
            2 => AdapterState::LoggedIn,
            3 => AdapterState::LoginFailed,
            4 => AdapterState::PositionQueried,
            5 => AdapterState::OrdersQueried,
            6 => AdapterState::TradesQueried,
            7 => AdapterState::AllReady,
            _ => AdapterState::NotLoggedIn,
        }
    }
}

/// Quantities below this are treated as zero.
const QTY_EPSILON: f64 = 1e-9;

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

pub struct TraderAdapter {
    id: String,
    state: AtomicU8,
    trading_day: AtomicU32,
    next_local_id: AtomicU32,

    broker: Mutex<Option<Arc<dyn BrokerApi>>>,
    /// Self-handle for connect and reconnect; set at construction.
    self_spi: Mutex<Weak<TraderAdapter>>,

    policy: Arc<ActionPolicy>,
    notifier: Mutex<Option<Arc<dyn EventNotifier>>>,
    sinks: RwLock<Vec<Arc<dyn TradeSink>>>,

    positions: Mutex<HashMap<String, PositionItem>>,
    orders: Mutex<HashMap<u32, OrderInfo>>,
    /// Broker order-ref to local id.
    order_refs: Mutex<HashMap<String, u32>>,
    /// Broker refs already folded into the book (query/push dedup).
    seen_order_refs: Mutex<HashSet<String>>,

    /// Exchange trade id -> order ref of the first own order seen on it.
    trade_refs: Mutex<HashMap<String, String>>,
    self_matches: Mutex<HashSet<String>>,
    ignore_self_match: bool,

    /// Signed outstanding intent per code: + buy, - sell.
    undone: Mutex<HashMap<String, f64>>,

    risk: Mutex<RiskMonitor>,
}

impl TraderAdapter {
    pub fn new(id: &str, policy: Arc<ActionPolicy>) -> Arc<Self> {
        Self::with_risk(id, policy, RiskMonitor::new(false, RiskParams::default()), false)
    }

    pub fn with_risk(
        id: &str,
        policy: Arc<ActionPolicy>,
        risk: RiskMonitor,
        ignore_self_match: bool,
    ) -> Arc<Self> {
        let adapter = Arc::new(Self {
            id: id.to_string(),
            state: AtomicU8::new(AdapterState::NotLoggedIn as u8),
            trading_day: AtomicU32::new(0),
            next_local_id: AtomicU32::new(1),
            broker: Mutex::new(None),
            self_spi: Mutex::new(Weak::new()),
            policy,
            notifier: Mutex::new(None),
            sinks: RwLock::new(Vec::new()),
            positions: Mutex::new(HashMap::new()),
            orders: Mutex::new(HashMap::new()),
            order_refs: Mutex::new(HashMap::new()),
            seen_order_refs: Mutex::new(HashSet::new()),
            trade_refs: Mutex::new(HashMap::new()),
            self_matches: Mutex::new(HashSet::new()),
            ignore_self_match,
            undone: Mutex::new(HashMap::new()),
            risk: Mutex::new(risk),
        });
        *adapter.self_spi.lock() = Arc::downgrade(&adapter);
        adapter
    }

    pub fn set_notifier(&self, notifier: Arc<dyn EventNotifier>) {
        *self.notifier.lock() = Some(notifier);
    }

    /// Surface a recoverable error through the wired notifier.
    fn emit(&self, err: &CoreError) {
        let notifier = self.notifier.lock().clone();
        notify_error(notifier.as_deref(), err);
    }

    pub fn set_broker(&self, broker: Arc<dyn BrokerApi>) {
        *self.broker.lock() = Some(broker);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> AdapterState {
        AdapterState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: AdapterState) {
        self.state.store(state as u8, Ordering::Release);
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state() == AdapterState::AllReady
    }

    pub fn trading_day(&self) -> u32 {
        self.trading_day.load(Ordering::Acquire)
    }

    pub fn add_sink(&self, sink: Arc<dyn TradeSink>) {
        self.sinks.write().push(sink);
    }

    /// Connect the broker channel and start the login/query cycle.
    pub fn run(&self) {
        eprintln!("DBG run start");
        let broker = self.broker.lock().clone();
        let spi = self.self_spi.lock().upgrade();
        match (broker, spi) {
            (Some(api), Some(spi)) => {
                self.set_state(AdapterState::LoggingIn);
                eprintln!("DBG before connect");
                api.connect(spi);
                eprintln!("DBG after connect");
            }
            (None, _) => tracing::error!("trader {} has no broker channel bound", self.id),
            _ => tracing::error!("trader {} self handle lost", self.id),
        }
    }

    // ------------------------------------------------------------------
    // Book queries
    // ------------------------------------------------------------------

    /// Signed position for a code; `flag` selects sides (1 long, 2 short,
    /// 3 both).
    pub fn get_position(&self, code: &str, valid_only: bool, flag: i32) -> f64 {
        self.positions
            .lock()
            .get(code)
            .map(|p| p.net_position(valid_only, flag))
            .unwrap_or(0.0)
    }

    pub fn get_undone(&self, code: &str) -> f64 {
        self.undone.lock().get(code).copied().unwrap_or(0.0)
    }

    /// Snapshot of the orders currently alive for `code`.
    pub fn orders_for(&self, code: &str) -> Vec<OrderInfo> {
        self.orders
            .lock()
            .values()
            .filter(|o| o.code == code && o.is_alive())
            .cloned()
            .collect()
    }

    /// Walk every known position item.
    pub fn enum_position<F>(&self, mut cb: F)
    where
        F: FnMut(&str, bool, f64, f64, f64, f64),
    {
        for (code, item) in self.positions.lock().iter() {
            for is_long in [true, false] {
                let side = item.side(is_long);
                cb(
                    code,
                    is_long,
                    side.pre_vol,
                    side.pre_avail,
                    side.new_vol,
                    side.new_avail,
                );
            }
        }
    }

    pub fn is_self_matched(&self, code: &str) -> bool {
        if self.ignore_self_match {
            return false;
        }
        self.self_matches.lock().contains(code)
    }

    /// Operator reset of a risk exclusion.
    pub fn clear_exclusion(&self, code: &str) {
        self.risk.lock().clear_exclusion(code);
    }

    /// Ask the broker for a fresh funds snapshot; the answer lands on
    /// `on_account`.
    pub fn query_account(&self) {
        if self.is_ready() {
            if let Some(api) = self.broker.lock().clone() {
                api.query_account();
            }
        }
    }

    // ------------------------------------------------------------------
    // Outbound orders
    // ------------------------------------------------------------------

    pub fn open_long(&self, code: &str, price: f64, qty: f64) -> CoreResult<u32> {
        self.do_entrust(code, Side::Buy, Offset::Open, price, qty)
    }

    pub fn open_short(&self, code: &str, price: f64, qty: f64) -> CoreResult<u32> {
        self.do_entrust(code, Side::Sell, Offset::Open, price, qty)
    }

    pub fn close_long(&self, code: &str, price: f64, qty: f64, is_today: bool) -> CoreResult<u32> {
        let offset = if is_today { Offset::CloseToday } else { Offset::Close };
        self.do_entrust(code, Side::Sell, offset, price, qty)
    }

    pub fn close_short(&self, code: &str, price: f64, qty: f64, is_today: bool) -> CoreResult<u32> {
        let offset = if is_today { Offset::CloseToday } else { Offset::Close };
        self.do_entrust(code, Side::Buy, offset, price, qty)
    }

    /// Translate a buy intent into offset orders under the product's rule
    /// group. Children are emitted rule by rule until the intent is spent
    /// or the rules are exhausted.
    pub fn buy(&self, code: &str, price: f64, qty: f64, force_close: bool) -> Vec<u32> {
        self.split_intent(code, Side::Buy, price, qty, force_close)
    }

    /// Mirror of [`buy`](Self::buy).
    pub fn sell(&self, code: &str, price: f64, qty: f64, force_close: bool) -> Vec<u32> {
        self.split_intent(code, Side::Sell, price, qty, force_close)
    }

    fn split_intent(
        &self,
        code: &str,
        side: Side,
        price: f64,
        qty: f64,
        force_close: bool,
    ) -> Vec<u32> {
        let mut ids = Vec::new();
        if !self.is_ready() {
            tracing::warn!("trader {} not ready, {} {} dropped", self.id, side, code);
            return ids;
        }

        let group = self.policy.rules_for(product_of(code)).clone();
        // Close-family first when the caller forces closing.
        let ordered: Vec<ActionRule> = if force_close {
            let (closes, opens): (Vec<_>, Vec<_>) = group
                .into_iter()
                .partition(|r| r.action != ActionType::Open);
            closes.into_iter().chain(opens).collect()
        } else {
            group
        };

        let mut left = qty;
        for rule in ordered {
            if left <= QTY_EPSILON {
                break;
            }
            let permitted = self.permitted_qty(code, side, &rule, left);
            if permitted <= QTY_EPSILON {
                continue;
            }
            match self.do_entrust(code, side, rule.action.offset(), price, permitted) {
                Ok(local_id) => {
                    ids.push(local_id);
                    left -= permitted;
                }
                Err(err) => {
                    tracing::warn!("{} split on {} stopped: {}", side, code, err);
                    self.emit(&err);
                    break;
                }
            }
        }

        if left > QTY_EPSILON {
            tracing::warn!(
                "{} intent on {} not fully expressible: {} of {} left",
                side,
                code,
                left,
                qty
            );
        }
        ids
    }

    /// Quantity a rule may contribute given caps and the current book.
    fn permitted_qty(&self, code: &str, side: Side, rule: &ActionRule, want: f64) -> f64 {
        // Buy-open grows the long book, buy-close shrinks the short book.
        let (book_is_long, side_cap) = match (side, rule.action) {
            (Side::Buy, ActionType::Open) => (true, rule.limit_long),
            (Side::Sell, ActionType::Open) => (false, rule.limit_short),
            (Side::Buy, _) => (false, rule.limit_short),
            (Side::Sell, _) => (true, rule.limit_long),
        };

        let positions = self.positions.lock();
        let item = positions.get(code).copied().unwrap_or_default();
        let book = item.side(book_is_long);

        // Close-family rules are additionally bounded by what the book can
        // still release; opens are not.
        let mut allowed = want;
        match rule.action {
            ActionType::Open => {}
            ActionType::Close | ActionType::CloseToday | ActionType::CloseYesterday => {
                if rule.pure {
                    let other_bucket = match rule.action {
                        ActionType::CloseToday => book.pre_vol,
                        ActionType::CloseYesterday => book.new_vol,
                        _ => 0.0,
                    };
                    if other_bucket > QTY_EPSILON {
                        return 0.0;
                    }
                }
                allowed = allowed.min(book.closable(rule.action.offset()));
            }
        }

        // limit / limit_l / limit_s are flat caps on what one order under
        // this rule may carry; 0 leaves the dimension unbounded.
        for cap in [rule.limit, side_cap] {
            if cap > 0 {
                allowed = allowed.min(f64::from(cap));
            }
        }
        allowed
    }

    /// The single gate every outbound order passes.
    fn do_entrust(
        &self,
        code: &str,
        side: Side,
        offset: Offset,
        price: f64,
        qty: f64,
    ) -> CoreResult<u32> {
        eprintln!("DBG do_entrust start");
        if !self.is_ready() {
            return Err(CoreError::OrderRejected {
                code: code.to_string(),
                reason: format!("channel {} not ready", self.id),
            });
        }
        if qty <= QTY_EPSILON {
            return Err(CoreError::OrderRejected {
                code: code.to_string(),
                reason: "zero quantity".into(),
            });
        }
        if self.is_self_matched(code) {
            let err = CoreError::SelfMatch {
                code: code.to_string(),
            };
            self.emit(&err);
            return Err(err);
        }
        match self.risk.lock().check_order(code, now_millis()) {
            RiskVerdict::Pass => {}
            _ => {
                let err = CoreError::RiskViolation {
                    code: code.to_string(),
                    reason: "order flow bounds".into(),
                };
                self.emit(&err);
                return Err(err);
            }
        }

        let local_id = self.next_local_id.fetch_add(1, Ordering::AcqRel);
        let order = OrderInfo::new(local_id, code, side, offset, price, qty);

        // Reserve closeable volume and record the intent before the wire
        // call so broker callbacks always see a consistent book.
        if offset.is_close() {
            let mut positions = self.positions.lock();
            positions
                .entry(code.to_string())
                .or_default()
                .book_for(side, offset)
                .reserve(offset, qty);
        }
        self.adjust_undone(code, signed_qty(side, qty));
        self.orders.lock().insert(local_id, order);

        let entrust = Entrust {
            local_id,
            code: code.to_string(),
            side,
            offset,
            price,
            qty,
        };
        let broker = self.broker.lock().clone();
        eprintln!("DBG before submit");
        let submit_result = match broker {
            Some(api) => api.submit(&entrust),
            None => Err(anyhow::anyhow!("no broker channel")),
        };
        eprintln!("DBG after submit");

        if let Err(e) = submit_result {
            self.rollback_entrust(local_id);
            return Err(CoreError::OrderRejected {
                code: code.to_string(),
                reason: format!("submit failed: {}", e),
            });
        }

        tracing::debug!(
            "[{}] entrust #{} {} {} {} {}@{}",
            self.id,
            local_id,
            code,
            side,
            offset,
            qty,
            price
        );
        Ok(local_id)
    }

    /// Undo reservation/undone/book entry after a failed submit or an
    /// entrust-level error.
    fn rollback_entrust(&self, local_id: u32) {
        let order = {
            let mut orders = self.orders.lock();
            match orders.get_mut(&local_id) {
                Some(o) if o.is_alive() => {
                    o.state = OrderState::Error;
                    o.clone()
                }
                _ => return,
            }
        };
        if order.offset.is_close() {
            let mut positions = self.positions.lock();
            if let Some(item) = positions.get_mut(&order.code) {
                item.book_for(order.side, order.offset)
                    .release(order.offset, order.left);
            }
        }
        self.adjust_undone(&order.code, -signed_qty(order.side, order.left));
    }

    /// Cancel one order by local id.
    pub fn cancel(&self, local_id: u32) -> bool {
        let order = match self.orders.lock().get(&local_id) {
            Some(o) if o.is_alive() => o.clone(),
            _ => return false,
        };
        let Some(order_ref) = order.order_ref.clone() else {
            tracing::warn!("order #{} not yet acknowledged, cannot cancel", local_id);
            return false;
        };
        if !self
            .risk
            .lock()
            .check_cancel(&order.code, now_millis())
            .passed()
        {
            let err = CoreError::RiskViolation {
                code: order.code.clone(),
                reason: "cancel flow bounds".into(),
            };
            self.emit(&err);
            return false;
        }

        let action = CancelAction {
            local_id,
            order_ref,
            code: order.code.clone(),
        };
        let broker = self.broker.lock().clone();
        match broker {
            Some(api) => match api.cancel(&action) {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!("cancel #{} failed: {}", local_id, e);
                    false
                }
            },
            None => false,
        }
    }

    /// Cancel outstanding orders on `code` matching the side, up to `qty`
    /// (0 cancels everything). Returns the local ids a cancel went out for.
    pub fn cancel_for(&self, code: &str, is_buy: bool, qty: f64) -> Vec<u32> {
        let targets: Vec<OrderInfo> = self
            .orders
            .lock()
            .values()
            .filter(|o| o.code == code && o.is_alive() && o.side.is_buy() == is_buy)
            .cloned()
            .collect();

        let mut out = Vec::new();
        let mut remaining = qty;
        for order in targets {
            if qty > 0.0 && remaining <= QTY_EPSILON {
                break;
            }
            if self.cancel(order.local_id) {
                out.push(order.local_id);
                remaining -= order.left;
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Internals shared by the Spi
    // ------------------------------------------------------------------

    fn adjust_undone(&self, code: &str, delta: f64) {
        if delta == 0.0 {
            return;
        }
        let mut undone = self.undone.lock();
        let slot = undone.entry(code.to_string()).or_insert(0.0);
        *slot += delta;
        if slot.abs() < QTY_EPSILON {
            *slot = 0.0;
        }
        tracing::debug!("[{}] undone {} -> {}", self.id, code, *slot);
    }

    fn each_sink<F>(&self, f: F)
    where
        F: Fn(&dyn TradeSink),
    {
        for sink in self.sinks.read().iter() {
            f(sink.as_ref());
        }
    }

    fn notify_ready(&self) {
        self.set_state(AdapterState::AllReady);
        tracing::info!("trader {} all ready", self.id);
        self.each_sink(|s| s.on_channel_ready());
        // Snapshot first: sinks may query the book from the callback.
        let snapshot: Vec<(String, PositionItem)> = self
            .positions
            .lock()
            .iter()
            .map(|(code, item)| (code.clone(), *item))
            .collect();
        for (code, item) in snapshot {
            for is_long in [true, false] {
                let side = item.side(is_long);
                if side.total() > QTY_EPSILON {
                    self.each_sink(|s| {
                        s.on_position(
                            &code,
                            is_long,
                            side.pre_vol,
                            side.pre_avail,
                            side.new_vol,
                            side.new_avail,
                        )
                    });
                }
            }
        }
    }

    /// Fold a broker order snapshot into the local book. Returns the local
    /// view after the merge, or `None` when the push was a duplicate of a
    /// terminal order.
    fn merge_order(&self, pushed: &BrokerOrder) -> Option<OrderInfo> {
        let mut orders = self.orders.lock();

        let local_id = self
            .order_refs
            .lock()
            .get(&pushed.order_ref)
            .copied()
            .or_else(|| orders.contains_key(&pushed.local_id).then_some(pushed.local_id));

        let local_id = match local_id {
            Some(id) => id,
            None => {
                // A push for an order this process never placed: keep a
                // phantom record so restarts reconcile against the broker.
                let id = if pushed.local_id != 0 && !orders.contains_key(&pushed.local_id) {
                    pushed.local_id
                } else {
                    self.next_local_id.fetch_add(1, Ordering::AcqRel)
                };
                tracing::warn!(
                    "[{}] unknown order push ref={} code={}, keeping phantom #{}",
                    self.id,
                    pushed.order_ref,
                    pushed.code,
                    id
                );
                let mut phantom = OrderInfo::new(
                    id,
                    &pushed.code,
                    pushed.side,
                    pushed.offset,
                    pushed.price,
                    pushed.total,
                );
                phantom.left = pushed.left;
                phantom.state = pushed.state;
                phantom.order_ref = Some(pushed.order_ref.clone());
                let alive = phantom.is_alive();
                self.order_refs.lock().insert(pushed.order_ref.clone(), id);
                orders.insert(id, phantom);
                drop(orders);
                if alive {
                    self.adjust_undone(&pushed.code, signed_qty(pushed.side, pushed.left));
                }
                return None;
            }
        };

        let order = orders.get_mut(&local_id)?;
        if order.state.is_terminal() {
            return None;
        }
        if order.order_ref.is_none() {
            order.order_ref = Some(pushed.order_ref.clone());
            self.order_refs
                .lock()
                .insert(pushed.order_ref.clone(), local_id);
        }

        let previous_left = order.left;
        order.left = pushed.left;
        order.state = pushed.state;
        let mut merged = order.clone();
        drop(orders);

        if merged.state.is_terminal() {
            // Whatever is still outstanding comes back: reservation for
            // closes, intent for everyone.
            if merged.state != OrderState::Filled && merged.left > QTY_EPSILON {
                if merged.offset.is_close() {
                    let mut positions = self.positions.lock();
                    if let Some(item) = positions.get_mut(&merged.code) {
                        item.book_for(merged.side, merged.offset)
                            .release(merged.offset, merged.left);
                    }
                }
                self.adjust_undone(&merged.code, -signed_qty(merged.side, merged.left));
            }
            if merged.state == OrderState::Filled {
                merged.left = 0.0;
            }
        } else if previous_left < merged.left {
            tracing::warn!(
                "[{}] order #{} left grew {} -> {}",
                self.id,
                merged.local_id,
                previous_left,
                merged.left
            );
        }
        Some(merged)
    }

    /// Record a trade ref and return true when it reveals a self-match.
    fn record_trade_ref(&self, trade: &BrokerTrade) -> bool {
        let mut refs = self.trade_refs.lock();
        match refs.get(&trade.trade_ref) {
            Some(existing) if *existing != trade.order_ref => {
                drop(refs);
                self.self_matches.lock().insert(trade.code.clone());
                let err = CoreError::SelfMatch {
                    code: trade.code.clone(),
                };
                tracing::error!("[{}] {}", self.id, err);
                self.emit(&err);
                true
            }
            Some(_) => false,
            None => {
                refs.insert(trade.trade_ref.clone(), trade.order_ref.clone());
                false
            }
        }
    }
}

#[inline]
fn signed_qty(side: Side, qty: f64) -> f64 {
    match side {
        Side::Buy => qty,
        Side::Sell => -qty,
    }
}

impl BrokerSpi for TraderAdapter {
    fn on_channel_event(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                tracing::info!("trader {} channel connected", self.id);
            }
            ChannelEvent::Disconnected => {
                tracing::warn!("trader {} channel lost, will re-login", self.id);
                self.set_state(AdapterState::NotLoggedIn);
                self.each_sink(|s| s.on_channel_lost());
                // Re-run the whole login/query cycle. The weak handle is
                // resolved before run() so no lock is held across it.
                let this = self.self_spi.lock().upgrade();
                if let Some(this) = this {
                    this.run();
                }
            }
        }
    }

    fn on_login_result(&self, success: bool, message: &str, trading_date: u32) {
        eprintln!("DBG on_login_result start");
        if !success {
            self.set_state(AdapterState::LoginFailed);
            let err = CoreError::BrokerLogin {
                channel: self.id.clone(),
                message: message.to_string(),
            };
            tracing::error!("{}", err);
            self.emit(&err);
            return;
        }

        self.trading_day.store(trading_date, Ordering::Release);
        self.set_state(AdapterState::LoggedIn);
        tracing::info!(
            "trader {} logged in, trading day {}",
            self.id,
            trading_date
        );
        eprintln!("DBG on_login_result before query_account");
        if let Some(api) = self.broker.lock().clone() {
            api.query_account();
        }
        eprintln!("DBG on_login_result done");
    }

    fn on_entrust_result(&self, local_id: u32, code: &str, error: Option<&str>) {
        match error {
            None => {
                if let Some(order) = self.orders.lock().get_mut(&local_id) {
                    if order.state == OrderState::New {
                        order.state = OrderState::Submitted;
                    }
                }
                self.each_sink(|s| s.on_entrust(local_id, code, true, ""));
            }
            Some(msg) => {
                tracing::error!("[{}] entrust #{} refused: {}", self.id, local_id, msg);
                self.rollback_entrust(local_id);
                let err = CoreError::OrderRejected {
                    code: code.to_string(),
                    reason: msg.to_string(),
                };
                self.emit(&err);
                self.each_sink(|s| s.on_entrust(local_id, code, false, msg));
                if let Some(order) = self.orders.lock().get(&local_id) {
                    self.each_sink(|s| {
                        s.on_order(
                            local_id,
                            code,
                            order.side.is_buy(),
                            order.total,
                            0.0,
                            order.price,
                            true,
                        )
                    });
                }
            }
        }
    }

    fn on_account(&self, balance: f64, available: f64) {
        eprintln!("DBG on_account start");
        tracing::info!(
            "trader {} funds: balance={:.2} available={:.2}",
            self.id,
            balance,
            available
        );
        eprintln!("DBG on_account after tracing");
        if self.state() == AdapterState::LoggedIn {
            eprintln!("DBG on_account before query_positions");
            if let Some(api) = self.broker.lock().clone() {
                api.query_positions();
            }
            eprintln!("DBG on_account after query_positions");
        }
        eprintln!("DBG on_account done");
    }

    fn on_positions(&self, positions: &[BrokerPosition]) {
        {
            let mut book = self.positions.lock();
            for pos in positions {
                let item = book.entry(pos.code.clone()).or_default();
                let side = if pos.long { &mut item.long } else { &mut item.short };
                side.pre_vol = pos.pre_vol;
                side.pre_avail = pos.pre_avail;
                side.new_vol = pos.new_vol;
                side.new_avail = pos.new_avail;
                tracing::info!(
                    "[{}] position {} {} pre {}/{} new {}/{}",
                    self.id,
                    pos.code,
                    if pos.long { "long" } else { "short" },
                    pos.pre_avail,
                    pos.pre_vol,
                    pos.new_avail,
                    pos.new_vol
                );
            }
        }
        if self.state() == AdapterState::LoggedIn {
            self.set_state(AdapterState::PositionQueried);
            if let Some(api) = self.broker.lock().clone() {
                api.query_orders();
            }
        }
    }

    fn on_orders(&self, orders: &[BrokerOrder]) {
        for order in orders {
            if !self.seen_order_refs.lock().insert(order.order_ref.clone()) {
                continue;
            }
            // Orders the book already tracks (a reconnect re-query) are
            // reconciled in place; their intent was counted at submission.
            let known = self.order_refs.lock().contains_key(&order.order_ref)
                || self.orders.lock().contains_key(&order.local_id);
            if known {
                self.merge_order(order);
                continue;
            }
            // Recover the submitter's local id when the broker echoes one;
            // orders placed by other processes get a fresh id.
            let local_id = if order.local_id != 0 {
                self.next_local_id
                    .fetch_max(order.local_id + 1, Ordering::AcqRel);
                order.local_id
            } else {
                self.next_local_id.fetch_add(1, Ordering::AcqRel)
            };
            let mut book = self.orders.lock();
            let mut info = OrderInfo::new(
                local_id,
                &order.code,
                order.side,
                order.offset,
                order.price,
                order.total,
            );
            info.left = order.left;
            info.state = order.state;
            info.order_ref = Some(order.order_ref.clone());
            self.order_refs
                .lock()
                .insert(order.order_ref.clone(), info.local_id);
            let alive = info.is_alive();
            let code = info.code.clone();
            let side = info.side;
            let left = info.left;
            book.insert(info.local_id, info);
            drop(book);
            if alive {
                self.adjust_undone(&code, signed_qty(side, left));
            }
        }
        if self.state() == AdapterState::PositionQueried {
            self.set_state(AdapterState::OrdersQueried);
            if let Some(api) = self.broker.lock().clone() {
                api.query_trades();
            }
        }
    }

    fn on_trades(&self, trades: &[BrokerTrade]) {
        for trade in trades {
            // Seed the ref table so a restart still sees today's matches.
            self.record_trade_ref(trade);
        }
        if self.state() == AdapterState::OrdersQueried {
            self.set_state(AdapterState::TradesQueried);
            self.notify_ready();
        }
    }

    fn on_push_order(&self, order: &BrokerOrder) {
        let Some(merged) = self.merge_order(order) else {
            return;
        };
        let canceled =
            matches!(merged.state, OrderState::Canceled | OrderState::Error);
        self.each_sink(|s| {
            s.on_order(
                merged.local_id,
                &merged.code,
                merged.side.is_buy(),
                merged.total,
                merged.left,
                merged.price,
                canceled,
            )
        });
    }

    fn on_push_trade(&self, trade: &BrokerTrade) {
        let self_matched = self.record_trade_ref(trade);
        if self_matched && !self.ignore_self_match {
            tracing::warn!(
                "[{}] {} locked out after self-match",
                self.id,
                trade.code
            );
        }

        let local_id = self.order_refs.lock().get(&trade.order_ref).copied();
        let Some(local_id) = local_id else {
            tracing::warn!(
                "[{}] trade for unknown order ref {} on {}",
                self.id,
                trade.order_ref,
                trade.code
            );
            return;
        };

        // Fill consumes intent and moves volume. The terminal transition
        // stays with the order push so it is announced exactly once.
        {
            let mut orders = self.orders.lock();
            if let Some(order) = orders.get_mut(&local_id) {
                order.left = (order.left - trade.qty).max(0.0);
                if !order.state.is_terminal() {
                    order.state = OrderState::PartFilled;
                }
            }
        }
        {
            let mut positions = self.positions.lock();
            positions
                .entry(trade.code.clone())
                .or_default()
                .book_for(trade.side, trade.offset)
                .on_fill(trade.offset, trade.qty);
        }
        self.adjust_undone(&trade.code, -signed_qty(trade.side, trade.qty));

        self.each_sink(|s| {
            s.on_trade(
                local_id,
                &trade.code,
                trade.side.is_buy(),
                trade.qty,
                trade.price,
            )
        });
    }
}

/// Named collection of adapters, as wired by the runner.
#[derive(Default)]
pub struct TraderAdapterMgr {
    adapters: RwLock<HashMap<String, Arc<TraderAdapter>>>,
}

impl TraderAdapterMgr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, adapter: Arc<TraderAdapter>) -> bool {
        let mut map = self.adapters.write();
        if map.contains_key(adapter.id()) {
            tracing::error!("duplicate trader id {}", adapter.id());
            return false;
        }
        map.insert(adapter.id().to_string(), adapter);
        true
    }

    pub fn get(&self, id: &str) -> Option<Arc<TraderAdapter>> {
        self.adapters.read().get(id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.adapters.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Start every channel.
    pub fn run(&self) {
        for adapter in self.adapters.read().values() {
            adapter.run();
        }
    }

    /// Periodic funds refresh across every ready channel.
    pub fn refresh_funds(&self) {
        for adapter in self.adapters.read().values() {
            adapter.query_account();
        }
    }
}
