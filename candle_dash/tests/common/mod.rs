#![allow(dead_code)]

use async_trait::async_trait;
use candle_dash::app::{AppEvent, StateStore};
use candle_dash::candles::{Candle, RawCandle};
use candle_dash::error::FeedError;
use candle_dash::feed::{CandleQuery, DataSource, ServerTime};
use candle_dash::markers::{Marker, Signal};
use candle_dash::scheduler::{FeedParams, Scheduler, SchedulerConfig};
use candle_dash::sink::ChartSink;
use candle_dash::timeframe::Timeframe;
use candle_dash::feed::DataSourceKind;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};

type Reply<T> = Result<T, FeedError>;
type Fallback<T> = Arc<dyn Fn() -> Reply<T> + Send + Sync>;

struct Script {
    candles: VecDeque<Reply<Vec<RawCandle>>>,
    candles_fallback: Fallback<Vec<RawCandle>>,
    current: VecDeque<Reply<Option<RawCandle>>>,
    current_fallback: Fallback<Option<RawCandle>>,
    signals: VecDeque<Reply<Option<Signal>>>,
    queries: Vec<CandleQuery>,
    candle_calls: usize,
    current_calls: usize,
    signal_calls: usize,
    signal_bots: Vec<String>,
}

/// `DataSource` fake: queued replies first, then the fallback for that endpoint.
pub struct ScriptedSource {
    script: Mutex<Script>,
    latency: Duration,
}

impl Default for ScriptedSource {
    fn default() -> Self {
        Self {
            script: Mutex::new(Script {
                candles: VecDeque::new(),
                candles_fallback: Arc::new(|| Ok(Vec::new())),
                current: VecDeque::new(),
                current_fallback: Arc::new(|| Ok(None)),
                signals: VecDeque::new(),
                queries: Vec::new(),
                candle_calls: 0,
                current_calls: 0,
                signal_calls: 0,
                signal_bots: Vec::new(),
            }),
            latency: Duration::ZERO,
        }
    }
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_candles(self, batch: Vec<RawCandle>) -> Self {
        self.script.lock().unwrap().candles_fallback = Arc::new(move || Ok(batch.clone()));
        self
    }

    pub fn with_current(self, f: impl Fn() -> Reply<Option<RawCandle>> + Send + Sync + 'static) -> Self {
        self.script.lock().unwrap().current_fallback = Arc::new(f);
        self
    }

    pub fn push_candles(&self, reply: Reply<Vec<RawCandle>>) {
        self.script.lock().unwrap().candles.push_back(reply);
    }

    pub fn push_current(&self, reply: Reply<Option<RawCandle>>) {
        self.script.lock().unwrap().current.push_back(reply);
    }

    pub fn push_signal(&self, reply: Reply<Option<Signal>>) {
        self.script.lock().unwrap().signals.push_back(reply);
    }

    pub fn candle_calls(&self) -> usize {
        self.script.lock().unwrap().candle_calls
    }

    pub fn current_calls(&self) -> usize {
        self.script.lock().unwrap().current_calls
    }

    pub fn signal_calls(&self) -> usize {
        self.script.lock().unwrap().signal_calls
    }

    pub fn signal_bots(&self) -> Vec<String> {
        self.script.lock().unwrap().signal_bots.clone()
    }

    pub fn last_query(&self) -> Option<CandleQuery> {
        self.script.lock().unwrap().queries.last().cloned()
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl DataSource for ScriptedSource {
    async fn fetch_candles(&self, query: &CandleQuery) -> Result<Vec<RawCandle>, FeedError> {
        let reply = {
            let mut s = self.script.lock().unwrap();
            s.candle_calls += 1;
            s.queries.push(query.clone());
            match s.candles.pop_front() {
                Some(r) => r,
                None => (s.candles_fallback)(),
            }
        };
        self.delay().await;
        reply
    }

    async fn fetch_current_candle(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
    ) -> Result<Option<RawCandle>, FeedError> {
        let reply = {
            let mut s = self.script.lock().unwrap();
            s.current_calls += 1;
            match s.current.pop_front() {
                Some(r) => r,
                None => (s.current_fallback)(),
            }
        };
        self.delay().await;
        reply
    }

    async fn fetch_signal(&self, bot_id: &str) -> Result<Option<Signal>, FeedError> {
        let reply = {
            let mut s = self.script.lock().unwrap();
            s.signal_calls += 1;
            s.signal_bots.push(bot_id.to_string());
            s.signals.pop_front().unwrap_or(Ok(None))
        };
        self.delay().await;
        reply
    }

    async fn fetch_server_time(&self) -> Result<ServerTime, FeedError> {
        Err(FeedError::Transport("no clock in tests".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Replace(Vec<i64>),
    Upsert(Candle),
    Markers(Vec<Marker>),
    Fit,
    AutoScale(bool),
}

/// Shares its call log with every clone, so the test keeps one and hands one over.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    calls: Rc<RefCell<Vec<SinkCall>>>,
}

impl RecordingSink {
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.borrow().clone()
    }

    pub fn replaces(&self) -> usize {
        self.count(|c| matches!(c, SinkCall::Replace(_)))
    }

    pub fn fits(&self) -> usize {
        self.count(|c| matches!(c, SinkCall::Fit))
    }

    pub fn upserts(&self) -> Vec<Candle> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                SinkCall::Upsert(candle) => Some(*candle),
                _ => None,
            })
            .collect()
    }

    pub fn last_markers(&self) -> Option<Vec<Marker>> {
        self.calls.borrow().iter().rev().find_map(|c| match c {
            SinkCall::Markers(m) => Some(m.clone()),
            _ => None,
        })
    }

    pub fn marker_pushes(&self) -> usize {
        self.count(|c| matches!(c, SinkCall::Markers(_)))
    }

    fn count(&self, f: impl Fn(&SinkCall) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| f(c)).count()
    }
}

impl ChartSink for RecordingSink {
    fn replace_all(&mut self, candles: &[Candle]) {
        self.calls
            .borrow_mut()
            .push(SinkCall::Replace(candles.iter().map(|c| c.time).collect()));
    }

    fn upsert_last(&mut self, candle: &Candle) {
        self.calls.borrow_mut().push(SinkCall::Upsert(*candle));
    }

    fn set_markers(&mut self, markers: &[Marker]) {
        self.calls.borrow_mut().push(SinkCall::Markers(markers.to_vec()));
    }

    fn fit_visible_range(&mut self) {
        self.calls.borrow_mut().push(SinkCall::Fit);
    }

    fn set_price_auto_scale(&mut self, enabled: bool) {
        self.calls.borrow_mut().push(SinkCall::AutoScale(enabled));
    }
}

/// `n` one-minute candles starting at t=60.
pub fn minute_batch(n: usize) -> Vec<RawCandle> {
    (1..=n as i64)
        .map(|i| RawCandle::new(i * 60, 1.0 + i as f64, 2.0 + i as f64, 0.5 + i as f64, 1.5 + i as f64))
        .collect()
}

pub fn eurusd() -> FeedParams {
    FeedParams {
        symbol: "EURUSD".to_string(),
        timeframe: Timeframe::M5,
        source: DataSourceKind::TwelveData,
    }
}

/// Scheduler plus a hand-driven event loop.
pub struct Harness {
    pub scheduler: Scheduler,
    pub store: StateStore,
    pub source: Arc<ScriptedSource>,
    pub sink: RecordingSink,
    rx: UnboundedReceiver<AppEvent>,
}

impl Harness {
    pub fn new(cfg: SchedulerConfig, source: ScriptedSource) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Arc::new(source);
        let sink = RecordingSink::default();
        let scheduler = Scheduler::new(
            cfg,
            source.clone() as Arc<dyn DataSource>,
            Box::new(sink.clone()),
            tx,
            eurusd(),
        );
        Self {
            scheduler,
            store: StateStore::default(),
            source,
            sink,
            rx,
        }
    }

    pub async fn pump_for(&mut self, dur: Duration) {
        let deadline = tokio::time::Instant::now() + dur;
        loop {
            let ev = tokio::select! {
                biased;
                ev = self.rx.recv() => ev,
                _ = tokio::time::sleep_until(deadline) => break,
            };
            match ev {
                Some(AppEvent::Timer(t)) => self.scheduler.on_timer(t),
                Some(AppEvent::Fetch(f)) => self.scheduler.on_fetch(f, &mut self.store),
                Some(_) => {}
                None => break,
            }
        }
    }
}
