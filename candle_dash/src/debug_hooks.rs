use crate::candles::{Applied, Candle, RawCandle};
use crate::error::FeedError;
use crate::markers::Marker;
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use tracing::Level;

pub const DEBUG_HOOKS_ENV: &str = "CANDLE_DASH_DEBUG_HOOKS";

static ENABLED: OnceLock<bool> = OnceLock::new();
static FILE_HANDLE: OnceLock<Option<Mutex<std::fs::File>>> = OnceLock::new();

fn file_logging_enabled() -> bool {
    *ENABLED.get_or_init(|| {
        std::env::var(DEBUG_HOOKS_ENV)
            .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
            .unwrap_or(false)
    })
}

fn log_file() -> Option<&'static Mutex<std::fs::File>> {
    FILE_HANDLE
        .get_or_init(|| {
            let dir = crate::persist::data_dir();
            let _ = std::fs::create_dir_all(&dir);
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join("debug_hooks.log"))
                .ok()
                .map(Mutex::new)
        })
        .as_ref()
}

fn log_line(level: Level, topic: &str, msg: impl AsRef<str>) {
    let msg = msg.as_ref();
    if level == Level::ERROR {
        tracing::error!(topic, "{msg}");
    } else if level == Level::WARN {
        tracing::warn!(topic, "{msg}");
    } else if level == Level::INFO {
        tracing::info!(topic, "{msg}");
    } else {
        tracing::debug!(topic, "{msg}");
    }

    if !file_logging_enabled() {
        return;
    }
    let ts = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    if let Some(file) = log_file() {
        if let Ok(mut f) = file.lock() {
            let _ = writeln!(f, "[{ts}][{level}][{topic}] {msg}");
        }
    }
}

/// First `head` occurrences, then every `every`th.
fn throttled(counter: &AtomicU64, head: u64, every: u64) -> Option<u64> {
    let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
    (n <= head || n % every == 0).then_some(n)
}

pub fn log_candle_reject(raw: &RawCandle, err: &FeedError) {
    static COUNT: AtomicU64 = AtomicU64::new(0);
    if let Some(n) = throttled(&COUNT, 20, 100) {
        log_line(
            Level::WARN,
            "candle.reject",
            format!("rejected record #{n}: {err} | {}", raw.describe()),
        );
    }
}

pub fn log_batch_applied(feed: &str, applied: Applied, received: usize) {
    match applied {
        Applied::Replaced { count } => log_line(
            Level::INFO,
            "candle.batch",
            format!("{feed}: full replace with {count} candles ({received} received)"),
        ),
        Applied::Upserted { time } => log_line(
            Level::DEBUG,
            "candle.batch",
            format!("{feed}: upsert tail t={time} ({received} received)"),
        ),
        Applied::Empty => log_line(
            Level::WARN,
            "candle.batch",
            format!("{feed}: no usable candles in batch of {received}"),
        ),
        Applied::OutOfOrder { time, last } => log_line(
            Level::WARN,
            "candle.batch",
            format!("{feed}: tail t={time} is older than chart t={last}; skipped"),
        ),
    }
}

pub fn log_chart_replace(series: &[Candle]) {
    let first = series.first().map(|c| c.time).unwrap_or_default();
    let last = series.last().map(|c| c.time).unwrap_or_default();
    log_line(
        Level::INFO,
        "chart.replace",
        format!("{} candles t={first}..{last}", series.len()),
    );
}

pub fn log_chart_upsert(candle: &Candle) {
    static COUNT: AtomicU64 = AtomicU64::new(0);
    if let Some(n) = throttled(&COUNT, 10, 60) {
        log_line(
            Level::DEBUG,
            "chart.upsert",
            format!(
                "upsert #{n} t={} o={} h={} l={} c={}",
                candle.time, candle.open, candle.high, candle.low, candle.close
            ),
        );
    }
}

pub fn log_chart_markers(markers: &[Marker]) {
    log_line(
        Level::INFO,
        "chart.markers",
        format!("{} markers on chart", markers.len()),
    );
}

pub fn log_chart_view(detail: impl AsRef<str>) {
    log_line(Level::DEBUG, "chart.view", detail);
}

pub fn log_mode_switch(from: &str, to: &str, reason: &str) {
    log_line(
        Level::INFO,
        "scheduler.mode",
        format!("{from} -> {to} ({reason})"),
    );
}

pub fn log_timer(feed: &str, action: &str, detail: impl AsRef<str>) {
    log_line(
        Level::DEBUG,
        "scheduler.timer",
        format!("{feed} timer {action} {}", detail.as_ref()),
    );
}

pub fn log_stale_completion(feed: &str, generation: u64, current: u64) {
    log_line(
        Level::DEBUG,
        "scheduler.stale",
        format!("{feed}: dropped result of generation {generation} (current {current})"),
    );
}

pub fn log_poll_error(feed: &str, err: &FeedError) {
    static COUNT: AtomicU64 = AtomicU64::new(0);
    if let Some(n) = throttled(&COUNT, 5, 20) {
        log_line(Level::WARN, "scheduler.poll", format!("{feed} poll failed (#{n}): {err}"));
    }
}

pub fn log_realtime_warmup(attempts: u32, first: bool) {
    if first {
        log_line(
            Level::INFO,
            "realtime.warmup",
            "stream starting; waiting for the first candle",
        );
    } else {
        log_line(
            Level::WARN,
            "realtime.warmup",
            format!("still no stream data after {attempts} attempts"),
        );
    }
}

pub fn log_realtime_error(consecutive: u32, ceiling: u32, err: &FeedError) {
    if consecutive == 1 || consecutive % 10 == 0 || consecutive >= ceiling {
        log_line(
            Level::WARN,
            "realtime.error",
            format!("current candle fetch failed ({consecutive}/{ceiling}): {err}"),
        );
    }
}

pub fn log_signal_marker(marker: &Marker, inserted: bool) {
    if inserted {
        log_line(
            Level::INFO,
            "signal.marker",
            format!("{} marker at t={}", marker.text, marker.time),
        );
    } else {
        log_line(
            Level::DEBUG,
            "signal.marker",
            format!("duplicate marker at t={} ignored", marker.time),
        );
    }
}

pub fn log_signal_reject(err: &FeedError) {
    log_line(Level::WARN, "signal.reject", format!("{err}"));
}

pub fn log_toast(message: &str) {
    log_line(Level::ERROR, "ui.toast", message);
}

pub fn log_panel(panel: &str, lines: &[String]) {
    log_line(Level::INFO, "ui.panel", format!("[{panel}] {}", lines.join(" | ")));
}

pub fn log_countdown(display: &str, warning: bool) {
    log_line(
        if warning { Level::INFO } else { Level::DEBUG },
        "ui.countdown",
        format!("next candle in {display}"),
    );
}

pub fn log_command(line: &str, detail: impl AsRef<str>) {
    log_line(
        Level::WARN,
        "ui.command",
        format!("{line:?}: {}", detail.as_ref()),
    );
}

pub fn log_clock_sync(offset_secs: i64) {
    log_line(
        Level::INFO,
        "clock.sync",
        format!("server clock offset {offset_secs}s"),
    );
}
