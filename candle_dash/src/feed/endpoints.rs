use crate::timeframe::Timeframe;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where historical candles come from. Realtime candles and signals have a single
/// endpoint each, independent of this choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceKind {
    #[default]
    TwelveData,
    Finnhub,
    Iq,
    OlympTrade,
}

impl DataSourceKind {
    pub const ALL: [DataSourceKind; 4] = [
        DataSourceKind::TwelveData,
        DataSourceKind::Finnhub,
        DataSourceKind::Iq,
        DataSourceKind::OlympTrade,
    ];

    /// Wire name, as used in paths and the `source` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSourceKind::TwelveData => "twelvedata",
            DataSourceKind::Finnhub => "finnhub",
            DataSourceKind::Iq => "iq",
            DataSourceKind::OlympTrade => "olymptrade",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DataSourceKind::TwelveData => "Twelve Data",
            DataSourceKind::Finnhub => "Finnhub",
            DataSourceKind::Iq => "IQ Option",
            DataSourceKind::OlympTrade => "OlympTrade",
        }
    }

    fn candles_builder(&self) -> fn(&CandleQuery) -> Endpoint {
        match self {
            DataSourceKind::TwelveData => public_candles,
            DataSourceKind::Finnhub | DataSourceKind::Iq | DataSourceKind::OlympTrade => {
                source_candles
            }
        }
    }
}

impl fmt::Display for DataSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "twelvedata" | "public" => Ok(DataSourceKind::TwelveData),
            "finnhub" => Ok(DataSourceKind::Finnhub),
            "iq" | "iqoption" => Ok(DataSourceKind::Iq),
            "olymptrade" => Ok(DataSourceKind::OlympTrade),
            other => Err(format!("unknown data source {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandleQuery {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub limit: u32,
    pub source: DataSourceKind,
}

/// Path plus query pairs, relative to the API base url. `segment` is caller-supplied
/// text appended as one percent-encoded path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub path: String,
    pub segment: Option<String>,
    pub query: Vec<(&'static str, String)>,
}

impl Endpoint {
    fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            segment: None,
            query: Vec::new(),
        }
    }

    fn segment(mut self, segment: &str) -> Self {
        self.segment = Some(segment.to_string());
        self
    }

    fn with(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }
}

fn public_candles(q: &CandleQuery) -> Endpoint {
    Endpoint::new("/api/public/candles")
        .with("symbol", &q.symbol)
        .with("timeframe", q.timeframe)
        .with("limit", q.limit)
        .with("source", q.source)
}

fn source_candles(q: &CandleQuery) -> Endpoint {
    Endpoint::new(format!("/api/{}/candles", q.source.as_str()))
        .with("symbol", &q.symbol)
        .with("timeframe", q.timeframe)
        .with("limit", q.limit)
}

pub fn candles(q: &CandleQuery) -> Endpoint {
    (q.source.candles_builder())(q)
}

pub fn current_candle(symbol: &str, timeframe: Timeframe) -> Endpoint {
    Endpoint::new("/api/iq/current-candle")
        .with("symbol", symbol)
        .with("timeframe", timeframe)
}

pub fn bot_signal(bot_id: &str) -> Endpoint {
    Endpoint::new("/api/bots/signals").segment(bot_id)
}

/// A bot id must name exactly one path segment.
pub fn is_valid_bot_id(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\', '?', '#'])
}

pub fn server_time() -> Endpoint {
    Endpoint::new("/api/server_time")
}
