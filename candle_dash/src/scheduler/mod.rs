pub mod health;
pub mod timer;

pub use health::{RealtimeHealth, WarmupNotice};
pub use timer::TimerHandle;

use crate::app::event::{AppEvent, FetchEvent, TimerEvent};
use crate::app::state::StateStore;
use crate::candles::{self, Applied, Candle, RawCandle, SeriesReconciler};
use crate::debug_hooks;
use crate::error::FeedError;
use crate::feed::endpoints::is_valid_bot_id;
use crate::feed::{CandleQuery, DataSource, DataSourceKind};
use crate::markers::{Marker, MarkerStore, Signal};
use crate::sink::ChartSink;
use crate::timeframe::Timeframe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub historical_interval: Duration,
    pub realtime_interval: Duration,
    pub signal_interval: Duration,
    pub not_ready_log_threshold: u32,
    pub error_ceiling_multiplier: u32,
    pub clear_markers_on_bot_change: bool,
    pub candle_limit: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            historical_interval: Duration::from_millis(2_000),
            realtime_interval: Duration::from_millis(1_000),
            signal_interval: Duration::from_millis(3_000),
            not_ready_log_threshold: 5,
            error_ceiling_multiplier: 3,
            clear_markers_on_bot_change: false,
            candle_limit: 40,
        }
    }
}

impl SchedulerConfig {
    /// Timers need a non-zero period.
    fn clamped(mut self) -> Self {
        let floor = Duration::from_millis(1);
        self.historical_interval = self.historical_interval.max(floor);
        self.realtime_interval = self.realtime_interval.max(floor);
        self.signal_interval = self.signal_interval.max(floor);
        self
    }

    pub fn error_ceiling(&self) -> u32 {
        self.not_ready_log_threshold
            .max(1)
            .saturating_mul(self.error_ceiling_multiplier.max(1))
    }
}

/// What the primary feed is fetching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedParams {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub source: DataSourceKind,
}

impl FeedParams {
    pub fn query(&self, limit: u32) -> CandleQuery {
        CandleQuery {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            limit,
            source: self.source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingMode {
    Idle,
    Historical,
    Realtime,
}

impl PollingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollingMode::Idle => "idle",
            PollingMode::Historical => "historical",
            PollingMode::Realtime => "realtime",
        }
    }
}

/// Owns every timer of the dashboard and everything a fetch result touches on its way
/// to the chart. At most one of the historical and realtime timers exists at a time.
///
/// All methods run on the event loop. Fetches are spawned and come back as
/// `FetchEvent`s carrying the generation they were issued under; `candle_generation`
/// moves on every start, stop and restart of the primary feed and `signal_generation`
/// on every bot change, so a completion that outlived its feed is dropped before it
/// reaches the sink or the state.
pub struct Scheduler {
    cfg: SchedulerConfig,
    source: Arc<dyn DataSource>,
    sink: Box<dyn ChartSink>,
    tx: UnboundedSender<AppEvent>,
    params: FeedParams,

    historical: Option<TimerHandle>,
    realtime: Option<TimerHandle>,
    signals: Option<TimerHandle>,

    candle_generation: u64,
    signal_generation: u64,
    history_in_flight: Option<u64>,
    realtime_in_flight: Option<u64>,

    bot_id: Option<String>,
    health: RealtimeHealth,
    reconciler: SeriesReconciler,
    markers: MarkerStore,
}

impl Scheduler {
    pub fn new(
        cfg: SchedulerConfig,
        source: Arc<dyn DataSource>,
        sink: Box<dyn ChartSink>,
        tx: UnboundedSender<AppEvent>,
        params: FeedParams,
    ) -> Self {
        let cfg = cfg.clamped();
        let health = RealtimeHealth::new(cfg.not_ready_log_threshold, cfg.error_ceiling_multiplier);
        Self {
            cfg,
            source,
            sink,
            tx,
            params,
            historical: None,
            realtime: None,
            signals: None,
            candle_generation: 0,
            signal_generation: 0,
            history_in_flight: None,
            realtime_in_flight: None,
            bot_id: None,
            health,
            reconciler: SeriesReconciler::new(),
            markers: MarkerStore::new(),
        }
    }

    pub fn mode(&self) -> PollingMode {
        if self.realtime.is_some() {
            PollingMode::Realtime
        } else if self.historical.is_some() {
            PollingMode::Historical
        } else {
            PollingMode::Idle
        }
    }

    pub fn params(&self) -> &FeedParams {
        &self.params
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.cfg
    }

    pub fn bot_id(&self) -> Option<&str> {
        self.bot_id.as_deref()
    }

    pub fn markers(&self) -> &[Marker] {
        self.markers.markers()
    }

    pub fn health(&self) -> &RealtimeHealth {
        &self.health
    }

    pub fn candle_generation(&self) -> u64 {
        self.candle_generation
    }

    pub fn signals_active(&self) -> bool {
        self.signals.is_some()
    }

    pub fn is_initial_load(&self) -> bool {
        self.reconciler.is_initial_load()
    }

    fn bump_candle_generation(&mut self) -> u64 {
        self.candle_generation += 1;
        self.candle_generation
    }

    // ---- primary feed ----

    /// No-op while realtime or historical polling is already running.
    pub fn start_historical(&mut self) {
        match self.mode() {
            PollingMode::Realtime => {
                debug_hooks::log_timer("historical", "start skipped", "(realtime active)");
                return;
            }
            PollingMode::Historical => return,
            PollingMode::Idle => {}
        }

        let generation = self.bump_candle_generation();
        self.historical = Some(TimerHandle::spawn(
            self.tx.clone(),
            self.cfg.historical_interval,
            true,
            generation,
            |generation| TimerEvent::Historical { generation },
        ));
        debug_hooks::log_timer(
            "historical",
            "started",
            format!(
                "every {:?} gen={generation} {} {}",
                self.cfg.historical_interval, self.params.symbol, self.params.timeframe
            ),
        );
    }

    pub fn stop_historical(&mut self) {
        if self.historical.take().is_some() {
            let generation = self.bump_candle_generation();
            debug_hooks::log_timer("historical", "stopped", format!("gen={generation}"));
        }
    }

    /// Stops historical polling and streams the current candle of `symbol`/`timeframe`.
    /// A pending initial load is seeded with a batch fetch so the chart has history
    /// to upsert onto; each realtime tick retries the seed until a batch lands.
    pub fn start_realtime(&mut self, symbol: &str, timeframe: Timeframe) {
        if self.params.symbol != symbol || self.params.timeframe != timeframe {
            self.params.symbol = symbol.to_string();
            self.params.timeframe = timeframe;
            self.reconciler.reset();
        }
        let from = self.mode();
        self.begin_realtime();
        debug_hooks::log_mode_switch(from.as_str(), PollingMode::Realtime.as_str(), "start_realtime");
    }

    fn begin_realtime(&mut self) {
        self.historical = None;
        self.realtime = None;
        let generation = self.bump_candle_generation();
        self.health.reset();
        self.realtime = Some(TimerHandle::spawn(
            self.tx.clone(),
            self.cfg.realtime_interval,
            false,
            generation,
            |generation| TimerEvent::Realtime { generation },
        ));
        if self.reconciler.is_initial_load() {
            self.fetch_history();
        }
    }

    /// Switch back to historical polling. No-op unless realtime is running.
    pub fn stop_realtime(&mut self) {
        self.end_realtime("stop_realtime");
    }

    fn end_realtime(&mut self, reason: &str) {
        if self.realtime.take().is_none() {
            return;
        }
        self.bump_candle_generation();
        debug_hooks::log_mode_switch(
            PollingMode::Realtime.as_str(),
            PollingMode::Historical.as_str(),
            reason,
        );
        self.start_historical();
    }

    /// Force a full replace + fit on the next batch, and fetch it now.
    pub fn refresh(&mut self) {
        self.reconciler.request_full_reload();
        self.fetch_history();
    }

    /// New symbol, timeframe or source: the chart starts over in whatever mode is
    /// running (historical when idle).
    pub fn restart(&mut self, params: FeedParams) {
        self.params = params;
        self.reconciler.reset();
        match self.mode() {
            PollingMode::Realtime => self.begin_realtime(),
            PollingMode::Historical => {
                self.stop_historical();
                self.start_historical();
            }
            PollingMode::Idle => self.start_historical(),
        }
        debug_hooks::log_timer(
            "feed",
            "restarted",
            format!(
                "{} {} {} ({})",
                self.params.symbol,
                self.params.timeframe,
                self.params.source,
                self.mode().as_str()
            ),
        );
    }

    // ---- signals ----

    /// `Some` starts signal polling if it is not running; `None` stops it. An id that
    /// cannot name a single path segment is refused and leaves polling unchanged.
    pub fn set_bot_id(&mut self, bot_id: Option<String>) {
        let bot_id = bot_id.filter(|id| !id.trim().is_empty());
        if let Some(id) = bot_id.as_deref().filter(|id| !is_valid_bot_id(id)) {
            debug_hooks::log_timer("signals", "refused", format!("bot id {id:?}"));
            return;
        }
        if bot_id == self.bot_id {
            return;
        }
        self.signal_generation += 1;
        if self.cfg.clear_markers_on_bot_change {
            self.clear_markers();
        }
        self.bot_id = bot_id;

        match (&self.bot_id, &self.signals) {
            (Some(id), None) => {
                self.signals = Some(TimerHandle::spawn(
                    self.tx.clone(),
                    self.cfg.signal_interval,
                    false,
                    self.signal_generation,
                    |generation| TimerEvent::Signals { generation },
                ));
                debug_hooks::log_timer("signals", "started", format!("bot={id}"));
            }
            (Some(id), Some(_)) => {
                debug_hooks::log_timer("signals", "retargeted", format!("bot={id}"));
            }
            (None, _) => {
                self.signals = None;
                debug_hooks::log_timer("signals", "stopped", "");
            }
        }
    }

    pub fn clear_markers(&mut self) {
        self.markers.clear();
        self.sink.set_markers(&[]);
    }

    pub fn shutdown(&mut self) {
        self.historical = None;
        self.realtime = None;
        self.signals = None;
        self.candle_generation += 1;
        self.signal_generation += 1;
        debug_hooks::log_timer("all", "stopped", "shutdown");
    }

    // ---- event handling ----

    pub fn on_timer(&mut self, ev: TimerEvent) {
        match ev {
            TimerEvent::Historical { generation } => {
                if !current(&self.historical, generation) {
                    return;
                }
                if self.history_in_flight == Some(self.candle_generation) {
                    return;
                }
                self.fetch_history();
            }
            TimerEvent::Realtime { generation } => {
                if !current(&self.realtime, generation) {
                    return;
                }
                // live candles keep flowing while the seed is retried
                if self.reconciler.is_initial_load()
                    && self.history_in_flight != Some(self.candle_generation)
                {
                    self.fetch_history();
                }
                if self.realtime_in_flight == Some(self.candle_generation) {
                    return;
                }
                self.fetch_current_candle();
            }
            TimerEvent::Signals { generation } => {
                if !current(&self.signals, generation) {
                    return;
                }
                self.fetch_signal();
            }
            TimerEvent::Countdown => {}
        }
    }

    pub fn on_fetch(&mut self, ev: FetchEvent, store: &mut StateStore) {
        match ev {
            FetchEvent::HistoryLoaded { generation, result } => {
                if self.history_in_flight == Some(generation) {
                    self.history_in_flight = None;
                }
                if generation != self.candle_generation {
                    debug_hooks::log_stale_completion("history", generation, self.candle_generation);
                    return;
                }
                self.apply_history(result, store);
            }
            FetchEvent::CurrentCandle { generation, result } => {
                if self.realtime_in_flight == Some(generation) {
                    self.realtime_in_flight = None;
                }
                if generation != self.candle_generation || self.realtime.is_none() {
                    debug_hooks::log_stale_completion("realtime", generation, self.candle_generation);
                    return;
                }
                self.apply_current_candle(result, store);
            }
            FetchEvent::SignalPolled { generation, result } => {
                if generation != self.signal_generation || self.bot_id.is_none() {
                    debug_hooks::log_stale_completion("signals", generation, self.signal_generation);
                    return;
                }
                self.apply_signal(result);
            }
            // clock sync belongs to the panels
            FetchEvent::ServerTime { .. } => {}
        }
    }

    fn apply_history(&mut self, result: Result<Vec<RawCandle>, FeedError>, store: &mut StateStore) {
        let batch = match result {
            Ok(batch) => batch,
            Err(err) => {
                debug_hooks::log_poll_error("history", &err);
                store.set_error(err.to_string());
                return;
            }
        };

        let series = candles::reconcile(&batch);
        let applied = self.reconciler.apply_batch(&series, self.sink.as_mut());
        debug_hooks::log_batch_applied("history", applied, batch.len());

        match applied {
            Applied::Replaced { .. } => {
                store.update_candles(series);
            }
            Applied::Upserted { .. } => {
                if let Some(last) = series.last() {
                    merge_into_state(store, *last);
                }
            }
            Applied::Empty | Applied::OutOfOrder { .. } => {
                store.set_loading(false);
            }
        }
    }

    fn apply_current_candle(
        &mut self,
        result: Result<Option<RawCandle>, FeedError>,
        store: &mut StateStore,
    ) {
        match result {
            Ok(Some(raw)) => {
                let candle = match raw.admit() {
                    Ok(c) => c,
                    Err(err) => {
                        self.health.record_success();
                        debug_hooks::log_candle_reject(&raw, &err);
                        return;
                    }
                };
                self.health.record_candle();
                let applied = self.reconciler.apply_live(candle, self.sink.as_mut());
                debug_hooks::log_batch_applied("realtime", applied, 1);
                if let Applied::Upserted { .. } = applied {
                    merge_into_state(store, candle);
                }
            }
            Ok(None) => {
                self.health.record_success();
                self.note_not_ready();
            }
            Err(FeedError::Unauthorized) => {
                debug_hooks::log_poll_error("realtime", &FeedError::Unauthorized);
                self.end_realtime("unauthorized");
            }
            Err(FeedError::NotReady) => self.note_not_ready(),
            Err(err) => {
                let n = self.health.record_error();
                debug_hooks::log_realtime_error(n, self.health.ceiling(), &err);
                if self.health.exhausted() {
                    store.set_error(format!("realtime stopped after {n} consecutive errors: {err}"));
                    self.end_realtime("error ceiling");
                }
            }
        }
    }

    fn note_not_ready(&mut self) {
        match self.health.record_not_ready() {
            Some(WarmupNotice::Started) => debug_hooks::log_realtime_warmup(1, true),
            Some(WarmupNotice::Stalled { attempts }) => {
                debug_hooks::log_realtime_warmup(attempts, false)
            }
            None => {}
        }
    }

    fn apply_signal(&mut self, result: Result<Option<Signal>, FeedError>) {
        let signal = match result {
            Ok(Some(signal)) => signal,
            Ok(None) => return,
            Err(err) => {
                debug_hooks::log_poll_error("signals", &err);
                return;
            }
        };
        let marker = match Marker::from_signal(&signal) {
            Ok(m) => m,
            Err(err) => {
                debug_hooks::log_signal_reject(&err);
                return;
            }
        };
        let inserted = self.markers.insert(marker.clone());
        debug_hooks::log_signal_marker(&marker, inserted);
        if inserted {
            self.sink.set_markers(self.markers.markers());
        }
    }

    // ---- fetches ----

    fn fetch_history(&mut self) {
        let generation = self.candle_generation;
        self.history_in_flight = Some(generation);
        let query = self.params.query(self.cfg.candle_limit);
        let source = self.source.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = source.fetch_candles(&query).await;
            let _ = tx.send(AppEvent::Fetch(FetchEvent::HistoryLoaded { generation, result }));
        });
    }

    fn fetch_current_candle(&mut self) {
        let generation = self.candle_generation;
        self.realtime_in_flight = Some(generation);
        let symbol = self.params.symbol.clone();
        let timeframe = self.params.timeframe;
        let source = self.source.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = source.fetch_current_candle(&symbol, timeframe).await;
            let _ = tx.send(AppEvent::Fetch(FetchEvent::CurrentCandle { generation, result }));
        });
    }

    fn fetch_signal(&mut self) {
        let Some(bot_id) = self.bot_id.clone() else {
            return;
        };
        let generation = self.signal_generation;
        let source = self.source.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = source.fetch_signal(&bot_id).await;
            let _ = tx.send(AppEvent::Fetch(FetchEvent::SignalPolled { generation, result }));
        });
    }
}

fn current(handle: &Option<TimerHandle>, generation: u64) -> bool {
    handle.as_ref().map(TimerHandle::generation) == Some(generation)
}

/// Keep the state's series in step with a trailing-edge chart update.
fn merge_into_state(store: &mut StateStore, candle: Candle) {
    let mut series = store.get().candles.clone();
    candles::upsert_trailing(&mut series, candle);
    store.update_candles(series);
}
