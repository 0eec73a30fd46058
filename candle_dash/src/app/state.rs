use crate::candles::Candle;
use crate::feed::DataSourceKind;
use crate::timeframe::Timeframe;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

pub const SYMBOLS: [&str; 4] = ["EURUSD", "GBPUSD", "USDJPY", "BTCUSD"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardState {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candles: Vec<Candle>,
    /// unix millis of the last successful candle update
    pub last_update: Option<i64>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub data_source: DataSourceKind,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            symbol: SYMBOLS[0].to_string(),
            timeframe: Timeframe::M5,
            candles: Vec::new(),
            last_update: None,
            is_loading: false,
            error: None,
            data_source: DataSourceKind::TwelveData,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    Symbol,
    Timeframe,
    Candles,
    LastUpdate,
    IsLoading,
    Error,
    DataSource,
}

impl StateKey {
    pub const ALL: [StateKey; 7] = [
        StateKey::Symbol,
        StateKey::Timeframe,
        StateKey::Candles,
        StateKey::LastUpdate,
        StateKey::IsLoading,
        StateKey::Error,
        StateKey::DataSource,
    ];

    fn changed(&self, a: &DashboardState, b: &DashboardState) -> bool {
        match self {
            StateKey::Symbol => a.symbol != b.symbol,
            StateKey::Timeframe => a.timeframe != b.timeframe,
            StateKey::Candles => a.candles != b.candles,
            StateKey::LastUpdate => a.last_update != b.last_update,
            StateKey::IsLoading => a.is_loading != b.is_loading,
            StateKey::Error => a.error != b.error,
            StateKey::DataSource => a.data_source != b.data_source,
        }
    }

    fn value_of(&self, s: &DashboardState) -> Value {
        let v = match self {
            StateKey::Symbol => serde_json::to_value(&s.symbol),
            StateKey::Timeframe => serde_json::to_value(s.timeframe),
            StateKey::Candles => serde_json::to_value(&s.candles),
            StateKey::LastUpdate => serde_json::to_value(s.last_update),
            StateKey::IsLoading => serde_json::to_value(s.is_loading),
            StateKey::Error => serde_json::to_value(&s.error),
            StateKey::DataSource => serde_json::to_value(s.data_source),
        };
        v.unwrap_or(Value::Null)
    }
}

/// Partial update; `None` leaves the field as is.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    pub symbol: Option<String>,
    pub timeframe: Option<Timeframe>,
    pub candles: Option<Vec<Candle>>,
    pub last_update: Option<Option<i64>>,
    pub is_loading: Option<bool>,
    pub error: Option<Option<String>>,
    pub data_source: Option<DataSourceKind>,
}

/// Called with `(new, old)` values of the subscribed field.
pub type Listener = Box<dyn FnMut(&Value, &Value)>;

/// Token returned by `subscribe`; hand it back to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    key: StateKey,
    id: u64,
}

/// Observable dashboard state. Owned by the app root and lent to whoever mutates it;
/// every mutation notifies the listeners of the fields that actually changed.
pub struct StateStore {
    state: DashboardState,
    listeners: HashMap<StateKey, Vec<(u64, Listener)>>,
    next_id: u64,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(DashboardState::default())
    }
}

impl StateStore {
    pub fn new(state: DashboardState) -> Self {
        Self {
            state,
            listeners: HashMap::new(),
            next_id: 1,
        }
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> DashboardState {
        self.state.clone()
    }

    /// Borrowed view, for readers that do not need to keep it.
    pub fn get(&self) -> &DashboardState {
        &self.state
    }

    pub fn subscribe(&mut self, key: StateKey, listener: impl FnMut(&Value, &Value) + 'static) -> Subscription {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners
            .entry(key)
            .or_default()
            .push((id, Box::new(listener)));
        Subscription { key, id }
    }

    /// Returns false if the token was already removed.
    pub fn unsubscribe(&mut self, sub: Subscription) -> bool {
        let Some(list) = self.listeners.get_mut(&sub.key) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != sub.id);
        list.len() != before
    }

    pub fn listener_count(&self, key: StateKey) -> usize {
        self.listeners.get(&key).map(Vec::len).unwrap_or(0)
    }

    /// Merge `patch` and fan out to listeners of changed keys. Returns the keys that
    /// changed.
    pub fn set_state(&mut self, patch: StatePatch) -> Vec<StateKey> {
        let old = self.state.clone();

        if let Some(v) = patch.symbol {
            self.state.symbol = v;
        }
        if let Some(v) = patch.timeframe {
            self.state.timeframe = v;
        }
        if let Some(v) = patch.candles {
            self.state.candles = v;
        }
        if let Some(v) = patch.last_update {
            self.state.last_update = v;
        }
        if let Some(v) = patch.is_loading {
            self.state.is_loading = v;
        }
        if let Some(v) = patch.error {
            self.state.error = v;
        }
        if let Some(v) = patch.data_source {
            self.state.data_source = v;
        }

        let changed: Vec<StateKey> = StateKey::ALL
            .into_iter()
            .filter(|k| k.changed(&self.state, &old))
            .collect();

        for key in &changed {
            let Some(list) = self.listeners.get_mut(key) else {
                continue;
            };
            if list.is_empty() {
                continue;
            }
            let new_v = key.value_of(&self.state);
            let old_v = key.value_of(&old);
            for (_, listener) in list.iter_mut() {
                listener(&new_v, &old_v);
            }
        }
        changed
    }

    pub fn update_candles(&mut self, candles: Vec<Candle>) -> Vec<StateKey> {
        self.set_state(StatePatch {
            candles: Some(candles),
            last_update: Some(Some(now_millis())),
            is_loading: Some(false),
            error: Some(None),
            ..Default::default()
        })
    }

    pub fn set_loading(&mut self, is_loading: bool) -> Vec<StateKey> {
        self.set_state(StatePatch {
            is_loading: Some(is_loading),
            ..Default::default()
        })
    }

    pub fn set_error(&mut self, error: impl Into<String>) -> Vec<StateKey> {
        self.set_state(StatePatch {
            error: Some(Some(error.into())),
            is_loading: Some(false),
            ..Default::default()
        })
    }

    pub fn change_symbol(&mut self, symbol: impl Into<String>) -> Vec<StateKey> {
        self.set_state(StatePatch {
            symbol: Some(symbol.into()),
            candles: Some(Vec::new()),
            is_loading: Some(true),
            ..Default::default()
        })
    }

    pub fn change_timeframe(&mut self, timeframe: Timeframe) -> Vec<StateKey> {
        self.set_state(StatePatch {
            timeframe: Some(timeframe),
            candles: Some(Vec::new()),
            is_loading: Some(true),
            ..Default::default()
        })
    }

    pub fn change_data_source(&mut self, source: DataSourceKind) -> Vec<StateKey> {
        self.set_state(StatePatch {
            data_source: Some(source),
            candles: Some(Vec::new()),
            is_loading: Some(true),
            ..Default::default()
        })
    }
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// unix seconds
pub fn now_unix() -> i64 {
    now_millis() / 1000
}
