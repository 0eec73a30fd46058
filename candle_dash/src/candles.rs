use crate::debug_hooks;
use crate::error::FeedError;
use crate::sink::ChartSink;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Epoch values at or above this are milliseconds (10^12 ms is September 2001;
/// 10^12 s is tens of thousands of years out).
pub const MILLIS_CUTOFF: i64 = 1_000_000_000_000;

/// Upper bound on any epoch value, in either unit.
const MAX_EPOCH: i64 = 1_000_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64, // bucket start (unix seconds)
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

/// A candle record exactly as the backend sent it. Fields stay loosely typed so a
/// malformed record can be rejected on its own, with its raw values logged, instead
/// of failing the whole batch at decode time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCandle {
    #[serde(default)]
    pub time: Option<Value>,
    #[serde(default)]
    pub open: Option<Value>,
    #[serde(default)]
    pub high: Option<Value>,
    #[serde(default)]
    pub low: Option<Value>,
    #[serde(default)]
    pub close: Option<Value>,
    #[serde(default)]
    pub volume: Option<Value>,
}

impl RawCandle {
    pub fn new(time: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            time: Some(Value::from(time)),
            open: Some(Value::from(open)),
            high: Some(Value::from(high)),
            low: Some(Value::from(low)),
            close: Some(Value::from(close)),
            volume: None,
        }
    }

    /// Rewrite a millisecond `time` into seconds. Anything that is not a usable number
    /// is left alone for `admit` to reject.
    pub fn normalize_time(&mut self) {
        let Some(raw) = self.time.as_ref() else { return };
        if let Some(t) = value_as_f64(raw).and_then(epoch_from_f64) {
            self.time = Some(Value::from(normalize_epoch_secs(t)));
        }
    }

    /// Validity check + parse. Requires time and all four prices to be present,
    /// `time > 0` and within the epoch range, and prices to be finite numbers.
    pub fn admit(&self) -> Result<Candle, FeedError> {
        let time = self
            .time
            .as_ref()
            .and_then(value_as_f64)
            .ok_or_else(|| FeedError::Validation("time missing or not numeric".to_string()))?;
        let time = epoch_from_f64(time)
            .ok_or_else(|| FeedError::Validation(format!("time {time} is out of range")))?;
        if time <= 0 {
            return Err(FeedError::Validation(format!("time must be > 0, got {time}")));
        }

        let open = price(&self.open, "open")?;
        let high = price(&self.high, "high")?;
        let low = price(&self.low, "low")?;
        let close = price(&self.close, "close")?;
        let volume = self.volume.as_ref().and_then(value_as_f64).filter(|v| v.is_finite());

        Ok(Candle {
            time,
            open,
            high,
            low,
            close,
            volume,
        })
    }

    /// Short `time=.. open=..` rendering used when a record is rejected.
    pub fn describe(&self) -> String {
        fn show(v: &Option<Value>) -> String {
            match v {
                None => "null".to_string(),
                Some(v) => v.to_string(),
            }
        }
        format!(
            "time={} open={} high={} low={} close={}",
            show(&self.time),
            show(&self.open),
            show(&self.high),
            show(&self.low),
            show(&self.close)
        )
    }
}

fn price(v: &Option<Value>, field: &str) -> Result<f64, FeedError> {
    let n = v
        .as_ref()
        .and_then(value_as_f64)
        .ok_or_else(|| FeedError::Validation(format!("{field} missing or not numeric")))?;
    if !n.is_finite() {
        return Err(FeedError::Validation(format!("{field} is not finite")));
    }
    Ok(n)
}

fn value_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// `None` for NaN, infinities and anything a float-to-int cast would saturate.
fn epoch_from_f64(t: f64) -> Option<i64> {
    (t.is_finite() && t.abs() < MAX_EPOCH as f64).then(|| t.floor() as i64)
}

pub fn normalize_epoch_secs(t: i64) -> i64 {
    if t >= MILLIS_CUTOFF {
        t / 1000
    } else {
        t
    }
}

/// Filter, parse, sort and dedup a raw batch. The result is strictly ascending by
/// time; for duplicate timestamps the record that came last in the input wins.
pub fn reconcile(batch: &[RawCandle]) -> Vec<Candle> {
    let mut admitted: Vec<Candle> = batch
        .iter()
        .filter_map(|raw| match raw.admit() {
            Ok(c) => Some(c),
            Err(err) => {
                debug_hooks::log_candle_reject(raw, &err);
                None
            }
        })
        .collect();

    // stable: equal timestamps keep input order
    admitted.sort_by_key(|c| c.time);

    let mut out: Vec<Candle> = Vec::with_capacity(admitted.len());
    for c in admitted {
        match out.last_mut() {
            Some(prev) if prev.time == c.time => *prev = c,
            _ => out.push(c),
        }
    }
    out
}

/// Replace the trailing candle when the timestamps match, append when newer.
/// Returns false (and leaves `series` untouched) for an older candle.
pub fn upsert_trailing(series: &mut Vec<Candle>, candle: Candle) -> bool {
    match series.last_mut() {
        Some(last) if last.time == candle.time => {
            *last = candle;
            true
        }
        Some(last) if last.time > candle.time => false,
        _ => {
            series.push(candle);
            true
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Applied {
    /// Full replace with `count` candles, view re-fitted.
    Replaced { count: usize },
    /// Trailing-edge upsert.
    Upserted { time: i64 },
    /// Nothing admissible in the batch.
    Empty,
    /// Candle older than what the chart already shows; dropped.
    OutOfOrder { time: i64, last: i64 },
}

/// Decides between full replace and trailing upsert for everything that reaches the
/// chart sink, and keeps the sink's series append-only between full replaces.
#[derive(Debug)]
pub struct SeriesReconciler {
    initial_load: bool,
    last_time: Option<i64>,
}

impl Default for SeriesReconciler {
    fn default() -> Self {
        Self {
            initial_load: true,
            last_time: None,
        }
    }
}

impl SeriesReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initial_load(&self) -> bool {
        self.initial_load
    }

    /// Next batch goes through `replace_all` again.
    pub fn request_full_reload(&mut self) {
        self.initial_load = true;
    }

    /// Forget everything the sink was shown (new symbol, timeframe or source).
    pub fn reset(&mut self) {
        self.initial_load = true;
        self.last_time = None;
    }

    /// Apply a reconciled batch (ascending, unique).
    pub fn apply_batch(&mut self, series: &[Candle], sink: &mut dyn ChartSink) -> Applied {
        let Some(last) = series.last() else {
            return Applied::Empty;
        };

        if self.initial_load {
            sink.replace_all(series);
            sink.fit_visible_range();
            sink.set_price_auto_scale(true);
            self.initial_load = false;
            self.last_time = Some(last.time);
            return Applied::Replaced { count: series.len() };
        }

        self.apply_live(*last, sink)
    }

    /// Apply one candle to the trailing edge.
    pub fn apply_live(&mut self, candle: Candle, sink: &mut dyn ChartSink) -> Applied {
        if let Some(last) = self.last_time {
            if candle.time < last {
                return Applied::OutOfOrder {
                    time: candle.time,
                    last,
                };
            }
        }
        sink.upsert_last(&candle);
        self.last_time = Some(candle.time);
        Applied::Upserted { time: candle.time }
    }
}
