//! HFT engine
//!
//! Owns the strategy contexts, routes market data to subscribers (with
//! per-subscription price adjustment for ticks), broadcasts session
//! events, and drives the real-time ticker. Subscription maps are touched
//! only under their shard locks; no strategy callback runs while one is
//! held.

use crate::core::{
    AdjustFlag, Bar, CoreError, KlinePeriod, OrderDetailData, OrderQueueData, Tick, TickRef,
    TransactionData,
};
use crate::data::{BarSink, DataManager};
use crate::engine::context::StrategyContext;
use crate::notifier::{notify_error, EventNotifier};
use crate::ticker::{RtTicker, SessionInfo};
use crate::trader::TraderAdapterMgr;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

/// Subscribers of one key: strategy id to `(strategy id, adjust flag)`.
type SubList = BTreeMap<u32, (u32, u8)>;

fn bar_key(code: &str, period: KlinePeriod, times: u32) -> String {
    format!("{}-{}-{}", code, period, times)
}

pub struct HftEngine {
    contexts: RwLock<BTreeMap<u32, Arc<dyn StrategyContext>>>,

    tick_subs: DashMap<String, SubList>,
    bar_subs: DashMap<String, SubList>,
    ordque_subs: DashMap<String, SubList>,
    orddtl_subs: DashMap<String, SubList>,
    trans_subs: DashMap<String, SubList>,

    /// Latest price per spelled code (bare, `code-`, `code+`).
    prices: DashMap<String, f64>,

    data_mgr: Arc<DataManager>,
    adapters: Arc<TraderAdapterMgr>,
    notifier: Option<Arc<dyn EventNotifier>>,

    session: SessionInfo,
    base_dir: PathBuf,

    ready: AtomicBool,
    session_active: AtomicBool,
    cur_date: AtomicU32,
    cur_time: AtomicU32,
    cur_secs: AtomicU32,
    trading_date: AtomicU32,

    ticker: Mutex<Option<Arc<RtTicker>>>,
    /// Weak self-handle so `run` can hand the ticker an owning reference.
    self_weak: Mutex<Weak<HftEngine>>,
}

impl HftEngine {
    pub fn new(
        session: SessionInfo,
        data_mgr: Arc<DataManager>,
        adapters: Arc<TraderAdapterMgr>,
        notifier: Option<Arc<dyn EventNotifier>>,
        base_dir: PathBuf,
    ) -> Arc<Self> {
        let engine = Arc::new(Self {
            contexts: RwLock::new(BTreeMap::new()),
            tick_subs: DashMap::new(),
            bar_subs: DashMap::new(),
            ordque_subs: DashMap::new(),
            orddtl_subs: DashMap::new(),
            trans_subs: DashMap::new(),
            prices: DashMap::new(),
            data_mgr,
            adapters,
            notifier,
            session,
            base_dir,
            ready: AtomicBool::new(false),
            session_active: AtomicBool::new(false),
            cur_date: AtomicU32::new(0),
            cur_time: AtomicU32::new(0),
            cur_secs: AtomicU32::new(0),
            trading_date: AtomicU32::new(0),
            ticker: Mutex::new(None),
            self_weak: Mutex::new(Weak::new()),
        });

        *engine.self_weak.lock() = Arc::downgrade(&engine);
        let sink: Arc<dyn BarSink> = engine.clone();
        engine.data_mgr.set_bar_sink(&sink);
        engine
    }

    pub fn data(&self) -> &Arc<DataManager> {
        &self.data_mgr
    }

    pub fn adapters(&self) -> &Arc<TraderAdapterMgr> {
        &self.adapters
    }

    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn trading_date(&self) -> u32 {
        self.trading_date.load(Ordering::Acquire)
    }

    pub fn set_trading_date(&self, date: u32) {
        self.trading_date.store(date, Ordering::Release);
    }

    pub fn set_date_time(&self, date: u32, hhmm: u32, secs_ms: u32) {
        self.cur_date.store(date, Ordering::Release);
        self.cur_time.store(hhmm, Ordering::Release);
        self.cur_secs.store(secs_ms, Ordering::Release);
    }

    pub fn current_date_time(&self) -> (u32, u32, u32) {
        (
            self.cur_date.load(Ordering::Acquire),
            self.cur_time.load(Ordering::Acquire),
            self.cur_secs.load(Ordering::Acquire),
        )
    }

    /// Latest known price under the spelled code (`bare`, `bare-`, `bare+`).
    pub fn price_of(&self, code: &str) -> Option<f64> {
        self.prices.get(code).map(|p| *p.value())
    }

    // ------------------------------------------------------------------
    // Context registry
    // ------------------------------------------------------------------

    pub fn add_context(&self, ctx: Arc<dyn StrategyContext>) {
        self.contexts.write().insert(ctx.id(), ctx);
    }

    pub fn get_context(&self, id: u32) -> Option<Arc<dyn StrategyContext>> {
        self.contexts.read().get(&id).cloned()
    }

    fn context_list(&self) -> Vec<Arc<dyn StrategyContext>> {
        self.contexts.read().values().cloned().collect()
    }

    /// Run one strategy callback behind the panic boundary. A panicking
    /// strategy is logged and surfaced, never unregistered.
    fn guard(&self, ctx: &Arc<dyn StrategyContext>, hook: &str, f: impl FnOnce()) {
        if catch_unwind(AssertUnwindSafe(f)).is_err() {
            let err = CoreError::Strategy {
                name: ctx.name().to_string(),
                hook: hook.to_string(),
            };
            tracing::error!("{}", err);
            notify_error(self.notifier.as_deref(), &err);
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Initialize every strategy, persist the running-state marker and
    /// start the session clock.
    pub fn run(&self) {
        for ctx in self.context_list() {
            self.guard(&ctx, "on_init", || ctx.on_init());
        }

        self.write_marker();

        let this = self.self_weak.lock().upgrade();
        let Some(this) = this else {
            tracing::error!("engine self handle lost, cannot start ticker");
            return;
        };
        let ticker = Arc::new(RtTicker::new(
            this,
            self.data_mgr.clone(),
            self.session.clone(),
        ));
        ticker.run();
        *self.ticker.lock() = Some(ticker);
    }

    pub fn stop(&self) {
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.stop();
        }
    }

    /// `marker.json`: the engine kind, running strategies and trader
    /// channels, for operators and tooling.
    fn write_marker(&self) {
        let marks: Vec<String> = self
            .context_list()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let marker = serde_json::json!({
            "engine": "HFT",
            "marks": marks,
            "channels": self.adapters.ids(),
        });
        let path = self.base_dir.join("marker.json");
        match serde_json::to_string_pretty(&marker) {
            Ok(body) => {
                if let Err(e) = std::fs::write(&path, body) {
                    tracing::error!("cannot write {}: {}", path.display(), e);
                }
            }
            Err(e) => tracing::error!("marker serialization failed: {}", e),
        }
    }

    pub fn on_session_begin(&self) {
        if self.session_active.swap(true, Ordering::AcqRel) {
            return;
        }
        let tdate = self.trading_date();
        tracing::info!("trading day {} begun", tdate);
        for ctx in self.context_list() {
            self.guard(&ctx, "on_session_begin", || ctx.on_session_begin(tdate));
        }
        if let Some(n) = &self.notifier {
            n.on_session_event(tdate, true);
        }
        self.ready.store(true, Ordering::Release);
    }

    pub fn on_session_end(&self) {
        if !self.session_active.swap(false, Ordering::AcqRel) {
            return;
        }
        let tdate = self.trading_date();
        self.data_mgr.on_session_end(tdate);
        for ctx in self.context_list() {
            self.guard(&ctx, "on_session_end", || ctx.on_session_end(tdate));
        }
        tracing::info!("trading day {} ended", tdate);
        if let Some(n) = &self.notifier {
            n.on_session_event(tdate, false);
        }
    }

    /// Minute close: HFT strategies are tick-driven, nothing is scheduled
    /// here.
    pub fn on_minute_end(&self, _date: u32, _time: u32) {}

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Subscribe ticks; a `+`/`-` suffix on `code` selects the adjusted
    /// delivery mode and is remembered per subscription.
    pub fn sub_ticks(&self, sid: u32, code: &str) {
        let (bare, flag) = AdjustFlag::split_code(code);
        self.tick_subs
            .entry(bare.to_string())
            .or_default()
            .insert(sid, (sid, flag as u8));
        if flag == AdjustFlag::Backward {
            self.data_mgr.enable_adjusted_ticks(bare);
        }
        tracing::debug!("strategy {} subscribed ticks of {}", sid, code);
    }

    pub fn sub_bars(&self, sid: u32, code: &str, period: KlinePeriod, times: u32) {
        let (bare, _) = AdjustFlag::split_code(code);
        self.bar_subs
            .entry(bar_key(bare, period, times))
            .or_default()
            .insert(sid, (sid, 0));
        self.data_mgr.subscribe_bars(bare, period, times);
    }

    /// L2 subscriptions never adjust; the suffix is stripped and the flag
    /// stays 0.
    pub fn sub_order_queue(&self, sid: u32, code: &str) {
        let (bare, _) = AdjustFlag::split_code(code);
        self.ordque_subs
            .entry(bare.to_string())
            .or_default()
            .insert(sid, (sid, 0));
    }

    pub fn sub_order_detail(&self, sid: u32, code: &str) {
        let (bare, _) = AdjustFlag::split_code(code);
        self.orddtl_subs
            .entry(bare.to_string())
            .or_default()
            .insert(sid, (sid, 0));
    }

    pub fn sub_transaction(&self, sid: u32, code: &str) {
        let (bare, _) = AdjustFlag::split_code(code);
        self.trans_subs
            .entry(bare.to_string())
            .or_default()
            .insert(sid, (sid, 0));
    }

    // ------------------------------------------------------------------
    // Market data dispatch
    // ------------------------------------------------------------------

    /// Tick fan-out. The subscription lock is released before any strategy
    /// runs.
    pub fn on_tick(&self, code: &str, tick: &TickRef) {
        self.prices.insert(code.to_string(), tick.price);
        self.data_mgr.handle_push_quote(code, tick);

        if !self.is_ready() {
            return;
        }

        let subscribers: Vec<(u32, u8)> = match self.tick_subs.get(code) {
            Some(subs) => subs.values().copied().collect(),
            None => return,
        };

        for (sid, flag) in subscribers {
            let Some(ctx) = self.get_context(sid) else {
                continue;
            };
            match flag {
                1 => {
                    let spelled = AdjustFlag::Forward.decorate(code);
                    self.guard(&ctx, "on_tick", || ctx.on_tick(&spelled, tick));
                }
                2 => {
                    let spelled = AdjustFlag::Backward.decorate(code);
                    let factor = self.data_mgr.get_adjusting_factor(code, tick.trading_date);
                    let adjusted: TickRef = Arc::new(tick.adjusted(&spelled, factor));
                    self.prices.insert(spelled.clone(), adjusted.price);
                    self.guard(&ctx, "on_tick", || ctx.on_tick(&spelled, &adjusted));
                }
                _ => {
                    self.guard(&ctx, "on_tick", || ctx.on_tick(code, tick));
                }
            }
        }
    }

    pub fn on_order_queue(&self, data: OrderQueueData) {
        let code = data.code.clone();
        self.data_mgr.handle_push_order_queue(data.clone());
        let subscribers: Vec<u32> = match self.ordque_subs.get(&code) {
            Some(subs) => subs.keys().copied().collect(),
            None => return,
        };
        for sid in subscribers {
            if let Some(ctx) = self.get_context(sid) {
                self.guard(&ctx, "on_order_queue", || ctx.on_order_queue(&code, &data));
            }
        }
    }

    pub fn on_order_detail(&self, data: OrderDetailData) {
        let code = data.code.clone();
        self.data_mgr.handle_push_order_detail(data.clone());
        let subscribers: Vec<u32> = match self.orddtl_subs.get(&code) {
            Some(subs) => subs.keys().copied().collect(),
            None => return,
        };
        for sid in subscribers {
            if let Some(ctx) = self.get_context(sid) {
                self.guard(&ctx, "on_order_detail", || {
                    ctx.on_order_detail(&code, &data)
                });
            }
        }
    }

    pub fn on_transaction(&self, data: TransactionData) {
        let code = data.code.clone();
        self.data_mgr.handle_push_transaction(data.clone());
        let subscribers: Vec<u32> = match self.trans_subs.get(&code) {
            Some(subs) => subs.keys().copied().collect(),
            None => return,
        };
        for sid in subscribers {
            if let Some(ctx) = self.get_context(sid) {
                self.guard(&ctx, "on_transaction", || ctx.on_transaction(&code, &data));
            }
        }
    }

    // ------------------------------------------------------------------
    // Slice access on behalf of strategy contexts
    // ------------------------------------------------------------------

    pub fn get_order_queue_slice(&self, _sid: u32, code: &str, count: usize) -> Vec<OrderQueueData> {
        self.data_mgr.get_order_queue_slice(code, count)
    }

    pub fn get_order_detail_slice(
        &self,
        _sid: u32,
        code: &str,
        count: usize,
    ) -> Vec<OrderDetailData> {
        self.data_mgr.get_order_detail_slice(code, count)
    }

    pub fn get_transaction_slice(&self, _sid: u32, code: &str, count: usize) -> Vec<TransactionData> {
        self.data_mgr.get_transaction_slice(code, count)
    }

    /// Convenience for feeds that hand the engine a raw tick.
    pub fn handle_push_quote(&self, tick: Tick) {
        let ticker = self.ticker.lock().clone();
        let shared: TickRef = Arc::new(tick);
        match ticker {
            Some(t) => t.on_tick(shared),
            None => self.on_tick(&shared.code.clone(), &shared),
        }
    }
}

impl BarSink for HftEngine {
    fn on_bar(&self, code: &str, period: KlinePeriod, times: u32, bar: &Bar) {
        let subscribers: Vec<u32> = match self.bar_subs.get(&bar_key(code, period, times)) {
            Some(subs) => subs.keys().copied().collect(),
            None => return,
        };
        for sid in subscribers {
            if let Some(ctx) = self.get_context(sid) {
                self.guard(&ctx, "on_bar", || ctx.on_bar(code, period, times, bar));
            }
        }
    }
}
