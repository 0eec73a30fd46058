use super::endpoints::{self, CandleQuery, Endpoint};
use crate::candles::{normalize_epoch_secs, RawCandle, MILLIS_CUTOFF};
use crate::error::FeedError;
use crate::markers::Signal;
use crate::timeframe::Timeframe;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// Server clock reference returned by `/api/server_time`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerTime {
    pub timestamp: i64,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub datetime: Option<String>,
}

/// Everything the engine reads from the backend. Implementations normalize epoch
/// values to seconds before returning.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch_candles(&self, query: &CandleQuery) -> Result<Vec<RawCandle>, FeedError>;

    /// `Ok(None)` when the backend answered but has no candle yet (`success: false`).
    async fn fetch_current_candle(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<RawCandle>, FeedError>;

    /// `Ok(None)` when the bot has no active signal.
    async fn fetch_signal(&self, bot_id: &str) -> Result<Option<Signal>, FeedError>;

    async fn fetch_server_time(&self) -> Result<ServerTime, FeedError>;
}

#[derive(Debug, Deserialize)]
struct CurrentCandleEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    candle: Option<RawCandle>,
}

#[derive(Debug, Deserialize)]
struct SignalEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    has_signal: bool,
    #[serde(default)]
    signal: Option<Signal>,
}

/// `DataSource` over the dashboard REST API.
#[derive(Clone)]
pub struct HttpDataSource {
    base: Url,
    http: reqwest::Client,
}

impl HttpDataSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FeedError> {
        let base = Url::parse(base_url)
            .map_err(|e| FeedError::Transport(format!("invalid base url {base_url:?}: {e}")))?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("candle_dash/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { base, http })
    }

    fn url(&self, ep: &Endpoint) -> Result<Url, FeedError> {
        let mut url = self
            .base
            .join(&ep.path)
            .map_err(|e| FeedError::Transport(format!("bad endpoint {}: {e}", ep.path)))?;
        if let Some(segment) = &ep.segment {
            url.path_segments_mut()
                .map_err(|_| FeedError::Transport(format!("base url {} cannot take a path", self.base)))?
                .push(segment);
        }
        Ok(url)
    }

    async fn get(&self, ep: &Endpoint) -> Result<(StatusCode, Url, Vec<u8>), FeedError> {
        let url = self.url(ep)?;
        let resp = self.http.get(url.clone()).query(&ep.query).send().await?;
        let status = resp.status();
        let body = resp.bytes().await?.to_vec();
        Ok((status, url, body))
    }

    async fn get_json<T: DeserializeOwned>(&self, ep: &Endpoint) -> Result<T, FeedError> {
        let (status, url, body) = self.get(ep).await?;
        if !status.is_success() {
            return Err(FeedError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn fetch_candles(&self, query: &CandleQuery) -> Result<Vec<RawCandle>, FeedError> {
        let mut batch: Vec<RawCandle> = self.get_json(&endpoints::candles(query)).await?;
        for raw in batch.iter_mut() {
            raw.normalize_time();
        }
        Ok(batch)
    }

    async fn fetch_current_candle(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<RawCandle>, FeedError> {
        let (status, url, body) = self
            .get(&endpoints::current_candle(symbol, timeframe))
            .await?;
        match status {
            StatusCode::UNAUTHORIZED => return Err(FeedError::Unauthorized),
            StatusCode::NOT_FOUND => return Err(FeedError::NotReady),
            s if !s.is_success() => {
                return Err(FeedError::Status {
                    status: s.as_u16(),
                    url: url.to_string(),
                })
            }
            _ => {}
        }

        let env: CurrentCandleEnvelope = serde_json::from_slice(&body)?;
        match (env.success, env.candle) {
            (true, Some(mut raw)) => {
                raw.normalize_time();
                Ok(Some(raw))
            }
            _ => Ok(None),
        }
    }

    async fn fetch_signal(&self, bot_id: &str) -> Result<Option<Signal>, FeedError> {
        let env: SignalEnvelope = self.get_json(&endpoints::bot_signal(bot_id)).await?;
        if !env.success || !env.has_signal {
            return Ok(None);
        }
        let mut signal = env
            .signal
            .ok_or_else(|| FeedError::Decode("has_signal is true but signal is missing".into()))?;
        if signal.timestamp >= MILLIS_CUTOFF as f64 {
            signal.timestamp /= 1000.0;
        }
        Ok(Some(signal))
    }

    async fn fetch_server_time(&self) -> Result<ServerTime, FeedError> {
        let mut t: ServerTime = self.get_json(&endpoints::server_time()).await?;
        t.timestamp = normalize_epoch_secs(t.timestamp);
        Ok(t)
    }
}
