//! Market-data manager
//!
//! Rolling caches of live ticks, L2 events and aggregated bars, slice
//! retrieval for strategies, and the adjustment-factor seam. Historical
//! storage and resampling live outside the core behind
//! [`AdjustFactorSource`] and the cache feed; everything here is filled by
//! live pushes.

use crate::core::{
    AdjustFlag, Bar, KlinePeriod, OrderDetailData, OrderQueueData, TickRef, TransactionData,
};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

/// Per-code cap on every rolling cache.
const CACHE_DEPTH: usize = 4096;

/// Multiplicative price-correction source, per code and trading date.
pub trait AdjustFactorSource: Send + Sync {
    fn factor_for(&self, code: &str, date: u32) -> f64;
}

/// Unit factors; the default when no corrections are wired in.
#[derive(Debug, Default)]
pub struct FlatAdjustFactors;

impl AdjustFactorSource for FlatAdjustFactors {
    fn factor_for(&self, _code: &str, _date: u32) -> f64 {
        1.0
    }
}

/// Receiver of completed bars (the engine).
pub trait BarSink: Send + Sync {
    fn on_bar(&self, code: &str, period: KlinePeriod, times: u32, bar: &Bar);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BarKey {
    code: String,
    period: KlinePeriod,
    times: u32,
}

impl BarKey {
    fn new(code: &str, period: KlinePeriod, times: u32) -> Self {
        Self {
            code: code.to_string(),
            period,
            times: times.max(1),
        }
    }

    /// Span of one bar in session minutes (0 = closes only at session end).
    fn span_minutes(&self) -> u32 {
        self.period.minutes() * self.times
    }
}

#[derive(Debug)]
struct BarCache {
    closed: VecDeque<Bar>,
    live: Option<Bar>,
}

impl BarCache {
    fn new() -> Self {
        Self {
            closed: VecDeque::new(),
            live: None,
        }
    }
}

pub struct DataManager {
    ticks: DashMap<String, VecDeque<TickRef>>,
    /// Back-adjusted tick series per bare code; forward and non-adjusted
    /// views are recomputable and never cached.
    ticks_adjusted: DashMap<String, VecDeque<TickRef>>,
    last_ticks: DashMap<String, TickRef>,

    order_queues: DashMap<String, VecDeque<OrderQueueData>>,
    order_details: DashMap<String, VecDeque<OrderDetailData>>,
    transactions: DashMap<String, VecDeque<TransactionData>>,

    bars: Mutex<std::collections::HashMap<BarKey, BarCache>>,
    bar_sink: RwLock<Option<Weak<dyn BarSink>>>,

    adjust_factors: Arc<dyn AdjustFactorSource>,
    adjust_flag: AdjustFlag,
}

impl DataManager {
    pub fn new() -> Self {
        Self::with_adjusting(Arc::new(FlatAdjustFactors), AdjustFlag::None)
    }

    pub fn with_adjusting(
        adjust_factors: Arc<dyn AdjustFactorSource>,
        adjust_flag: AdjustFlag,
    ) -> Self {
        Self {
            ticks: DashMap::new(),
            ticks_adjusted: DashMap::new(),
            last_ticks: DashMap::new(),
            order_queues: DashMap::new(),
            order_details: DashMap::new(),
            transactions: DashMap::new(),
            bars: Mutex::new(std::collections::HashMap::new()),
            bar_sink: RwLock::new(None),
            adjust_factors,
            adjust_flag,
        }
    }

    pub fn set_bar_sink(&self, sink: &Arc<dyn BarSink>) {
        *self.bar_sink.write() = Some(Arc::downgrade(sink));
    }

    fn bar_sink(&self) -> Option<Arc<dyn BarSink>> {
        self.bar_sink.read().as_ref().and_then(Weak::upgrade)
    }

    // ------------------------------------------------------------------
    // Push side
    // ------------------------------------------------------------------

    /// Fold a live tick into every cache it touches and the open bars.
    pub fn handle_push_quote(&self, code: &str, tick: &TickRef) {
        push_bounded(&self.ticks, code, tick.clone());
        self.last_ticks.insert(code.to_string(), tick.clone());

        // Maintain the back-adjusted series only when someone reads it.
        if self.ticks_adjusted.contains_key(code) {
            let factor = self.adjust_factors.factor_for(code, tick.trading_date);
            let adjusted = Arc::new(tick.adjusted(
                &AdjustFlag::Backward.decorate(code),
                factor,
            ));
            push_bounded(&self.ticks_adjusted, code, adjusted);
        }

        let mut bars = self.bars.lock();
        for (_, cache) in bars.iter_mut().filter(|(k, _)| k.code == code) {
            match cache.live.as_mut() {
                Some(bar) => bar.merge_tick(tick),
                None => cache.live = Some(Bar::from_tick(tick, tick.minute())),
            }
        }
    }

    pub fn handle_push_order_queue(&self, data: OrderQueueData) {
        push_bounded_plain(&self.order_queues, &data.code.clone(), data);
    }

    pub fn handle_push_order_detail(&self, data: OrderDetailData) {
        push_bounded_plain(&self.order_details, &data.code.clone(), data);
    }

    pub fn handle_push_transaction(&self, data: TransactionData) {
        push_bounded_plain(&self.transactions, &data.code.clone(), data);
    }

    /// Minute close from the ticker: seal bars whose span is complete and
    /// hand them to the sink. `time` is the start label of the closed
    /// minute.
    pub fn on_minute_end(&self, date: u32, time: u32) {
        let mut done: Vec<(BarKey, Bar)> = Vec::new();
        {
            let mut bars = self.bars.lock();
            for (key, cache) in bars.iter_mut() {
                let span = key.span_minutes();
                if span == 0 {
                    continue;
                }
                // Minute-of-day arithmetic keeps multi-minute bars aligned
                // to the hour grid.
                let closed_index = (time / 100) * 60 + time % 100;
                if span > 1 && (closed_index + 1) % span != 0 {
                    continue;
                }
                if let Some(mut bar) = cache.live.take() {
                    bar.date = date;
                    bar.time = time;
                    cache.closed.push_back(bar);
                    if cache.closed.len() > CACHE_DEPTH {
                        cache.closed.pop_front();
                    }
                    done.push((key.clone(), bar));
                }
            }
        }

        if done.is_empty() {
            return;
        }
        if let Some(sink) = self.bar_sink() {
            for (key, bar) in &done {
                tracing::debug!(
                    "bar {}-{}-{} closed at {}.{:04}",
                    key.code,
                    key.period,
                    key.times,
                    date,
                    time
                );
                sink.on_bar(&key.code, key.period, key.times, bar);
            }
        }
    }

    /// Session close: seal day bars.
    pub fn on_session_end(&self, date: u32) {
        let mut done: Vec<(BarKey, Bar)> = Vec::new();
        {
            let mut bars = self.bars.lock();
            for (key, cache) in bars.iter_mut() {
                if key.span_minutes() != 0 {
                    continue;
                }
                if let Some(mut bar) = cache.live.take() {
                    bar.date = date;
                    cache.closed.push_back(bar);
                    done.push((key.clone(), bar));
                }
            }
        }
        if let Some(sink) = self.bar_sink() {
            for (key, bar) in &done {
                sink.on_bar(&key.code, key.period, key.times, bar);
            }
        }
    }

    // ------------------------------------------------------------------
    // Subscription plumbing
    // ------------------------------------------------------------------

    /// Ensure a bar cache exists for the key.
    pub fn subscribe_bars(&self, code: &str, period: KlinePeriod, times: u32) {
        self.bars
            .lock()
            .entry(BarKey::new(code, period, times))
            .or_insert_with(BarCache::new);
    }

    /// Start maintaining the back-adjusted tick series for a bare code.
    pub fn enable_adjusted_ticks(&self, code: &str) {
        self.ticks_adjusted.entry(code.to_string()).or_default();
    }

    // ------------------------------------------------------------------
    // Slice retrieval
    // ------------------------------------------------------------------

    /// Last `count` ticks for `code`. A `+` suffix serves the cached
    /// back-adjusted series; a `-` suffix rescales the raw series on the
    /// fly; a bare code returns raw ticks.
    pub fn get_tick_slice(&self, code: &str, count: usize) -> Vec<TickRef> {
        let (bare, flag) = AdjustFlag::split_code(code);
        match flag {
            AdjustFlag::None => tail(&self.ticks, bare, count),
            AdjustFlag::Backward => tail(&self.ticks_adjusted, bare, count),
            AdjustFlag::Forward => tail(&self.ticks, bare, count)
                .into_iter()
                .map(|t| {
                    let factor = self.adjust_factors.factor_for(bare, t.trading_date);
                    Arc::new(t.adjusted(code, factor))
                })
                .collect(),
        }
    }

    pub fn get_order_queue_slice(&self, code: &str, count: usize) -> Vec<OrderQueueData> {
        tail_plain(&self.order_queues, code, count)
    }

    pub fn get_order_detail_slice(&self, code: &str, count: usize) -> Vec<OrderDetailData> {
        tail_plain(&self.order_details, code, count)
    }

    pub fn get_transaction_slice(&self, code: &str, count: usize) -> Vec<TransactionData> {
        tail_plain(&self.transactions, code, count)
    }

    /// Last `count` sealed bars for the subscription key.
    pub fn get_kline_slice(
        &self,
        code: &str,
        period: KlinePeriod,
        times: u32,
        count: usize,
    ) -> Vec<Bar> {
        let bars = self.bars.lock();
        match bars.get(&BarKey::new(code, period, times)) {
            Some(cache) => {
                let skip = cache.closed.len().saturating_sub(count);
                cache.closed.iter().skip(skip).copied().collect()
            }
            None => Vec::new(),
        }
    }

    pub fn grab_last_tick(&self, code: &str) -> Option<TickRef> {
        self.last_ticks.get(code).map(|t| t.value().clone())
    }

    pub fn get_adjusting_factor(&self, code: &str, date: u32) -> f64 {
        self.adjust_factors.factor_for(code, date)
    }

    pub fn get_adjusting_flag(&self) -> AdjustFlag {
        self.adjust_flag
    }
}

impl Default for DataManager {
    fn default() -> Self {
        Self::new()
    }
}

fn push_bounded(map: &DashMap<String, VecDeque<TickRef>>, code: &str, value: TickRef) {
    let mut entry = map.entry(code.to_string()).or_default();
    entry.push_back(value);
    if entry.len() > CACHE_DEPTH {
        entry.pop_front();
    }
}

fn push_bounded_plain<T>(map: &DashMap<String, VecDeque<T>>, code: &str, value: T) {
    let mut entry = map.entry(code.to_string()).or_default();
    entry.push_back(value);
    if entry.len() > CACHE_DEPTH {
        entry.pop_front();
    }
}

fn tail(map: &DashMap<String, VecDeque<TickRef>>, code: &str, count: usize) -> Vec<TickRef> {
    match map.get(code) {
        Some(entry) => {
            let skip = entry.len().saturating_sub(count);
            entry.iter().skip(skip).cloned().collect()
        }
        None => Vec::new(),
    }
}

fn tail_plain<T: Clone>(map: &DashMap<String, VecDeque<T>>, code: &str, count: usize) -> Vec<T> {
    match map.get(code) {
        Some(entry) => {
            let skip = entry.len().saturating_sub(count);
            entry.iter().skip(skip).cloned().collect()
        }
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Side, Tick};

    fn tick(code: &str, time: u32, price: f64) -> TickRef {
        Arc::new(Tick::new(code, 20240105, time, price))
    }

    #[test]
    fn test_tick_cache_and_last() {
        let mgr = DataManager::new();
        for i in 0..5 {
            mgr.handle_push_quote("rb2501", &tick("rb2501", 93000_000 + i, 4000.0 + i as f64));
        }
        let slice = mgr.get_tick_slice("rb2501", 3);
        assert_eq!(slice.len(), 3);
        assert_eq!(slice.last().unwrap().price, 4004.0);
        assert_eq!(mgr.grab_last_tick("rb2501").unwrap().price, 4004.0);
        assert!(mgr.grab_last_tick("unknown").is_none());
    }

    struct DoubleFactors;
    impl AdjustFactorSource for DoubleFactors {
        fn factor_for(&self, _code: &str, _date: u32) -> f64 {
            2.0
        }
    }

    #[test]
    fn test_adjusted_cache_only_when_enabled() {
        let mgr = DataManager::with_adjusting(Arc::new(DoubleFactors), AdjustFlag::Backward);
        mgr.handle_push_quote("rb2501", &tick("rb2501", 93000_000, 4000.0));
        assert!(mgr.get_tick_slice("rb2501+", 10).is_empty());

        mgr.enable_adjusted_ticks("rb2501");
        mgr.handle_push_quote("rb2501", &tick("rb2501", 93001_000, 4100.0));
        let slice = mgr.get_tick_slice("rb2501+", 10);
        assert_eq!(slice.len(), 1);
        assert_eq!(slice[0].code, "rb2501+");
        assert_eq!(slice[0].price, 8200.0);

        // Forward view is recomputed from the raw series.
        let fwd = mgr.get_tick_slice("rb2501-", 10);
        assert_eq!(fwd.len(), 2);
        assert_eq!(fwd[1].code, "rb2501-");
        assert_eq!(fwd[1].price, 8200.0);
    }

    struct CollectBars(Mutex<Vec<(String, KlinePeriod, u32, Bar)>>);
    impl BarSink for CollectBars {
        fn on_bar(&self, code: &str, period: KlinePeriod, times: u32, bar: &Bar) {
            self.0.lock().push((code.to_string(), period, times, *bar));
        }
    }

    #[test]
    fn test_minute_bar_aggregation() {
        let mgr = DataManager::new();
        let sink = Arc::new(CollectBars(Mutex::new(Vec::new())));
        let sink_dyn: Arc<dyn BarSink> = sink.clone();
        mgr.set_bar_sink(&sink_dyn);
        mgr.subscribe_bars("rb2501", KlinePeriod::Minute1, 1);

        mgr.handle_push_quote("rb2501", &tick("rb2501", 93000_500, 4000.0));
        mgr.handle_push_quote("rb2501", &tick("rb2501", 93030_000, 4006.0));
        mgr.on_minute_end(20240105, 930);

        let bars = sink.0.lock();
        assert_eq!(bars.len(), 1);
        let (code, period, times, bar) = &bars[0];
        assert_eq!(code, "rb2501");
        assert_eq!(*period, KlinePeriod::Minute1);
        assert_eq!(*times, 1);
        assert_eq!(bar.open, 4000.0);
        assert_eq!(bar.close, 4006.0);
        assert_eq!(bar.time, 930);
        drop(bars);

        assert_eq!(
            mgr.get_kline_slice("rb2501", KlinePeriod::Minute1, 1, 10).len(),
            1
        );
    }

    #[test]
    fn test_l2_caches() {
        let mgr = DataManager::new();
        mgr.handle_push_transaction(TransactionData {
            code: "rb2501".into(),
            action_date: 20240105,
            action_time: 93000_000,
            side: Side::Buy,
            price: 4000.0,
            qty: 2.0,
        });
        assert_eq!(mgr.get_transaction_slice("rb2501", 5).len(), 1);
        assert!(mgr.get_order_queue_slice("rb2501", 5).is_empty());
    }
}
