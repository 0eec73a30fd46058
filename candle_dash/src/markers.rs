use crate::error::FeedError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::str::FromStr;

pub const CALL_COLOR: &str = "#00ff88";
pub const PUT_COLOR: &str = "#ff4757";

/// Trade signal as published by a bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub timestamp: f64,
    pub direction: String,
    #[serde(default)]
    pub indicators: Option<Value>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub strategy: Option<String>,
}

impl Signal {
    /// `Some('R')` / `Some('V')` when the indicators carry exactly that reversal flag.
    pub fn reversal_flag(&self) -> Option<char> {
        match self
            .indicators
            .as_ref()
            .and_then(|i| i.get("reversal_indicator"))
            .and_then(Value::as_str)
        {
            Some("R") => Some('R'),
            Some("V") => Some('V'),
            _ => None,
        }
    }

    /// Marker dedup key: the candle second this signal belongs to.
    pub fn marker_time(&self) -> i64 {
        self.timestamp.floor() as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Call,
    Put,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Call => "CALL",
            Direction::Put => "PUT",
        }
    }
}

impl FromStr for Direction {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CALL" => Ok(Direction::Call),
            "PUT" => Ok(Direction::Put),
            other => Err(FeedError::Validation(format!("unknown signal direction {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkerPosition {
    BelowBar,
    AboveBar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkerShape {
    ArrowUp,
    ArrowDown,
}

/// Chart annotation for one signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub time: i64,
    pub position: MarkerPosition,
    pub color: &'static str,
    pub shape: MarkerShape,
    pub text: String,
}

impl Marker {
    pub fn from_signal(signal: &Signal) -> Result<Self, FeedError> {
        if !signal.timestamp.is_finite() || signal.timestamp <= 0.0 {
            return Err(FeedError::Validation(format!(
                "signal timestamp {} is not usable",
                signal.timestamp
            )));
        }
        let direction: Direction = signal.direction.parse()?;
        let (position, color, shape) = match direction {
            Direction::Call => (MarkerPosition::BelowBar, CALL_COLOR, MarkerShape::ArrowUp),
            Direction::Put => (MarkerPosition::AboveBar, PUT_COLOR, MarkerShape::ArrowDown),
        };
        let text = match signal.reversal_flag() {
            Some(flag) => format!("{} ({flag})", direction.as_str()),
            None => direction.as_str().to_string(),
        };

        Ok(Self {
            time: signal.marker_time(),
            position,
            color,
            shape,
            text,
        })
    }
}

/// Accumulated signal markers, at most one per candle timestamp, in insertion order.
#[derive(Debug, Default)]
pub struct MarkerStore {
    markers: Vec<Marker>,
    times: HashSet<i64>,
}

impl MarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when a marker already sits at that timestamp; the existing one
    /// is kept as is.
    pub fn insert(&mut self, marker: Marker) -> bool {
        if !self.times.insert(marker.time) {
            return false;
        }
        self.markers.push(marker);
        true
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn clear(&mut self) {
        self.markers.clear();
        self.times.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn signal(ts: f64, direction: &str, indicators: Option<Value>) -> Signal {
        Signal {
            timestamp: ts,
            direction: direction.to_string(),
            indicators,
            symbol: None,
            timeframe: None,
            confidence: None,
            strategy: None,
        }
    }

    #[test]
    fn call_and_put_styling() {
        let call = Marker::from_signal(&signal(100.0, "call", None)).unwrap();
        assert_eq!(call.position, MarkerPosition::BelowBar);
        assert_eq!(call.shape, MarkerShape::ArrowUp);
        assert_eq!(call.color, CALL_COLOR);
        assert_eq!(call.text, "CALL");

        let put = Marker::from_signal(&signal(100.0, "PUT", None)).unwrap();
        assert_eq!(put.position, MarkerPosition::AboveBar);
        assert_eq!(put.shape, MarkerShape::ArrowDown);
        assert_eq!(put.color, PUT_COLOR);
    }

    #[test]
    fn reversal_tag_only_for_exact_flags() {
        let r = signal(1.0, "PUT", Some(json!({"reversal_indicator": "R"})));
        assert_eq!(Marker::from_signal(&r).unwrap().text, "PUT (R)");
        let v = signal(1.0, "CALL", Some(json!({"reversal_indicator": "V"})));
        assert_eq!(Marker::from_signal(&v).unwrap().text, "CALL (V)");
        let other = signal(1.0, "CALL", Some(json!({"reversal_indicator": "r"})));
        assert_eq!(Marker::from_signal(&other).unwrap().text, "CALL");
    }

    #[test]
    fn rejects_unknown_direction() {
        assert!(Marker::from_signal(&signal(1.0, "HOLD", None)).is_err());
    }

    #[test]
    fn same_floored_timestamp_keeps_first_marker() {
        let mut store = MarkerStore::new();
        assert!(store.insert(Marker::from_signal(&signal(1_700_000_100.2, "CALL", None)).unwrap()));
        assert!(!store.insert(Marker::from_signal(&signal(1_700_000_100.9, "PUT", None)).unwrap()));
        assert_eq!(store.len(), 1);
        assert_eq!(store.markers()[0].text, "CALL");
    }

    #[test]
    fn clear_allows_reinsert() {
        let mut store = MarkerStore::new();
        let m = Marker::from_signal(&signal(50.0, "CALL", None)).unwrap();
        store.insert(m.clone());
        store.clear();
        assert!(store.is_empty());
        assert!(store.insert(m));
    }

    #[test]
    fn serializes_like_chart_marker_options() {
        let m = Marker::from_signal(&signal(60.0, "CALL", None)).unwrap();
        assert_eq!(
            serde_json::to_value(&m).unwrap(),
            json!({"time": 60, "position": "belowBar", "color": "#00ff88", "shape": "arrowUp", "text": "CALL"})
        );
    }
}
