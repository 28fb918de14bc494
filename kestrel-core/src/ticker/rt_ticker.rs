//! Real-time session ticker
//!
//! Drives wall-clock progress and minute-close detection from two sides:
//! the tick path (a tick of minute M+1 closes minute M) and a background
//! thread that closes minutes when the feed goes quiet and force-closes the
//! session after the last trading minute. `last_emit_pos` under the clock
//! mutex guarantees each minute closes exactly once no matter which side
//! gets there first.

use crate::core::TickRef;
use crate::data::DataManager;
use crate::engine::HftEngine;
use crate::ticker::session::SessionInfo;
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, Timelike};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Sentinel: no tick has set the clock yet today.
const TIME_UNSET: u32 = u32::MAX;

/// Poll cadence inside trading hours.
const POLL_IN_SESSION: Duration = Duration::from_millis(10);
/// Poll cadence outside trading hours.
const POLL_OFF_SESSION: Duration = Duration::from_secs(10);

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

fn local_hhmm() -> u32 {
    let now = chrono::Local::now();
    now.hour() * 100 + now.minute()
}

fn next_date(yyyymmdd: u32) -> u32 {
    let date = NaiveDate::from_ymd_opt(
        (yyyymmdd / 10000) as i32,
        yyyymmdd / 100 % 100,
        yyyymmdd % 100,
    );
    match date {
        Some(d) => {
            let n = d + ChronoDuration::days(1);
            n.year() as u32 * 10000 + n.month() * 100 + n.day()
        }
        None => yyyymmdd + 1,
    }
}

struct TickerClock {
    date: u32,
    /// Last tick time, `HHMMSSmmm`; `TIME_UNSET` before the first tick.
    time: u32,
    /// Wall-clock ms after which the poller may close the current minute.
    next_check_ms: u64,
    /// Completed session minutes implied by the newest tick.
    cur_pos: u32,
    /// Completed session minutes already announced.
    last_emit_pos: u32,
}

/// Everything the tick path and the poller share.
struct TickerCore {
    engine: Arc<HftEngine>,
    store: Arc<DataManager>,
    session: SessionInfo,
    clock: Mutex<TickerClock>,
}

impl TickerCore {
    fn trigger_price(&self, tick: &TickRef) {
        self.engine.on_tick(&tick.code, tick);
    }

    /// Close the minute `clock.cur_pos` completes, exactly once.
    ///
    /// Caller holds the clock mutex. The minute label is the start time of
    /// the minute being closed.
    fn emit_minute_close(&self, clock: &mut TickerClock, by_data: bool) {
        clock.last_emit_pos = clock.cur_pos;
        let label = self.session.minute_start(clock.cur_pos - 1);
        if by_data {
            tracing::info!("minute bar {}.{:04} closed by data", clock.date, label);
        } else {
            tracing::info!("minute bar {}.{:04} closed automatically", clock.date, label);
        }
        self.store.on_minute_end(clock.date, label);
        self.engine.on_minute_end(clock.date, label);
        if clock.cur_pos >= self.session.trading_minutes() {
            self.engine.on_session_end();
        }
    }

    /// Tick path of the clock. `live` is false until the poller runs.
    fn on_tick(&self, tick: TickRef, live: bool) {
        if !live {
            self.trigger_price(&tick);
            return;
        }

        let date = tick.action_date;
        let time = tick.action_time;

        {
            let mut clock = self.clock.lock();

            // Late tick: price only, the clock never moves backwards.
            if clock.date != 0
                && clock.time != TIME_UNSET
                && (date < clock.date || (date == clock.date && time < clock.time))
            {
                drop(clock);
                self.trigger_price(&tick);
                return;
            }

            clock.date = date;
            clock.time = time;

            let minute = time / 100_000;
            let second_ms = time % 100_000;
            let minutes = self.session.elapsed_minutes(minute);

            if clock.cur_pos == 0 {
                clock.cur_pos = minutes;
            } else if clock.cur_pos < minutes {
                if clock.last_emit_pos < clock.cur_pos {
                    self.emit_minute_close(&mut clock, true);
                }
                clock.cur_pos = minutes;
            }
            // Same minute: nothing to close.

            let sec = (second_ms / 1000).min(59);
            let msec = second_ms % 1000;
            clock.next_check_ms = now_millis() + u64::from((60 - sec) * 1000 - msec);
        }

        self.trigger_price(&tick);
        self.engine
            .set_date_time(date, time / 100_000, time % 100_000);
        self.engine.set_trading_date(tick.trading_date);
    }

    /// Off-session sleep in small slices so `stop` never waits long.
    fn idle_sleep(stopped: &AtomicBool) {
        let mut slept = Duration::ZERO;
        while slept < POLL_OFF_SESSION && !stopped.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(100));
            slept += Duration::from_millis(100);
        }
    }

    fn poll_loop(&self, stopped: &AtomicBool) {
        let total_mins = self.session.trading_minutes();
        while !stopped.load(Ordering::Acquire) {
            let (time_seen, tick_minute) = {
                let clock = self.clock.lock();
                (clock.time != TIME_UNSET, clock.time / 100_000)
            };

            if time_seen && self.session.is_in_trading_time(tick_minute) {
                std::thread::sleep(POLL_IN_SESSION);
                let now = now_millis();
                let mut clock = self.clock.lock();
                if now >= clock.next_check_ms && clock.last_emit_pos < clock.cur_pos {
                    let label = self.session.minute_start(clock.cur_pos - 1);
                    // Midnight rollover with no tick: the calendar date
                    // advances while the feed is silent.
                    if label == 0 {
                        let last = clock.date;
                        clock.date = next_date(clock.date);
                        clock.time = 0;
                        tracing::info!("date rolled over at 00:00: {} -> {}", last, clock.date);
                    }
                    self.emit_minute_close(&mut clock, false);
                }
            } else if time_seen && local_hhmm() >= self.session.close_time() {
                let mut clock = self.clock.lock();
                if clock.last_emit_pos != 0 && clock.last_emit_pos < total_mins {
                    // The feed died before the closing minute: end the
                    // session from wall clock.
                    tracing::warn!(
                        "trading day {} will be ended forcibly, last_emit_pos {}, time {}",
                        self.engine.trading_date(),
                        clock.last_emit_pos,
                        clock.time
                    );
                    clock.cur_pos = total_mins;
                    self.emit_minute_close(&mut clock, false);
                } else {
                    drop(clock);
                    Self::idle_sleep(stopped);
                }
            } else {
                Self::idle_sleep(stopped);
            }
        }
    }
}

pub struct RtTicker {
    core: Arc<TickerCore>,
    stopped: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl RtTicker {
    pub fn new(engine: Arc<HftEngine>, store: Arc<DataManager>, session: SessionInfo) -> Self {
        Self {
            core: Arc::new(TickerCore {
                engine,
                store,
                session,
                clock: Mutex::new(TickerClock {
                    date: 0,
                    time: TIME_UNSET,
                    next_check_ms: 0,
                    cur_pos: 0,
                    last_emit_pos: 0,
                }),
            }),
            stopped: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &SessionInfo {
        &self.core.session
    }

    /// Feed path. Called by the parser adapter for every tick.
    pub fn on_tick(&self, tick: TickRef) {
        let live = self.thread.lock().is_some();
        self.core.on_tick(tick, live);
    }

    /// Start the session: announce the begin event and spawn the poller.
    pub fn run(&self) {
        let mut thread = self.thread.lock();
        if thread.is_some() {
            return;
        }

        self.core.engine.on_session_begin();

        let core = Arc::clone(&self.core);
        let stopped = Arc::clone(&self.stopped);
        let handle = std::thread::Builder::new()
            .name(format!("ticker-{}", self.core.session.id))
            .spawn(move || core.poll_loop(&stopped))
            .expect("spawn ticker thread");
        *thread = Some(handle);
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RtTicker {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::Release);
    }
}
