use super::state::*;
use crate::debug_hooks;
use crate::feed::ServerTime;
use crate::timeframe::Timeframe;
use chrono::{Local, TimeZone};
use std::cell::Cell;
use std::rc::Rc;

pub const COUNTDOWN_WARNING_SECS: i64 = 10;

/// Symbol / timeframe / source / last update / candle count. Re-rendered only after
/// one of the fields it shows has changed.
pub struct InfoPanel {
    dirty: Rc<Cell<bool>>,
    subs: Vec<Subscription>,
}

impl InfoPanel {
    pub fn attach(store: &mut StateStore) -> Self {
        let dirty = Rc::new(Cell::new(true));
        let subs = [
            StateKey::Symbol,
            StateKey::Timeframe,
            StateKey::DataSource,
            StateKey::LastUpdate,
            StateKey::Candles,
        ]
        .into_iter()
        .map(|key| {
            let dirty = dirty.clone();
            store.subscribe(key, move |_, _| dirty.set(true))
        })
        .collect();
        Self { dirty, subs }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }

    pub fn render_if_dirty(&self, state: &DashboardState) -> Option<Vec<String>> {
        if !self.dirty.replace(false) {
            return None;
        }
        let lines = info_lines(state);
        debug_hooks::log_panel("info", &lines);
        Some(lines)
    }

    pub fn detach(self, store: &mut StateStore) {
        for sub in self.subs {
            store.unsubscribe(sub);
        }
    }
}

pub fn info_lines(state: &DashboardState) -> Vec<String> {
    vec![
        format!("symbol: {}", state.symbol),
        format!("timeframe: {}", state.timeframe),
        format!("source: {}", state.data_source.label()),
        format!("updated: {}", format_last_update(state.last_update)),
        format!("candles: {}", state.candles.len()),
    ]
}

/// Local `HH:MM:SS`, or `-` before the first update.
pub fn format_last_update(millis: Option<i64>) -> String {
    millis
        .and_then(|ms| Local.timestamp_millis_opt(ms).single())
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Difference between the backend clock and ours, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerClock {
    offset_secs: i64,
    synced: bool,
}

impl ServerClock {
    /// `requested_at` is the local time the request went out; the answer is assumed to
    /// be taken halfway through the round trip.
    pub fn sync(&mut self, server: &ServerTime, requested_at: i64, received_at: i64) {
        let local_mid = requested_at + (received_at - requested_at) / 2;
        self.offset_secs = server.timestamp - local_mid;
        self.synced = true;
        debug_hooks::log_clock_sync(self.offset_secs);
    }

    pub fn offset_secs(&self) -> i64 {
        self.offset_secs
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn now(&self, local_unix: i64) -> i64 {
        local_unix + self.offset_secs
    }
}

pub fn seconds_left(now_unix: i64, timeframe: Timeframe) -> i64 {
    timeframe.bucket_start(now_unix) + timeframe.secs() - now_unix
}

pub fn format_countdown(secs: i64) -> String {
    let secs = secs.max(0);
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownView {
    pub display: String,
    pub warning: bool,
}

/// Time left in the current candle.
#[derive(Debug, Default)]
pub struct CountdownPanel {
    last: Option<CountdownView>,
}

impl CountdownPanel {
    pub fn tick(&mut self, now_unix: i64, timeframe: Timeframe) -> &CountdownView {
        let left = seconds_left(now_unix, timeframe);
        let view = CountdownView {
            display: format_countdown(left),
            warning: left <= COUNTDOWN_WARNING_SECS,
        };
        if self.last.as_ref() != Some(&view) {
            debug_hooks::log_countdown(&view.display, view.warning);
        }
        self.last.insert(view)
    }

    pub fn last(&self) -> Option<&CountdownView> {
        self.last.as_ref()
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Surfaces every new `error` value as a notification line.
pub fn attach_toasts(store: &mut StateStore) -> Subscription {
    store.subscribe(StateKey::Error, |new, _old| {
        if let Some(msg) = new.as_str() {
            debug_hooks::log_toast(msg);
        }
    })
}
