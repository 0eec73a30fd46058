use crate::candles::RawCandle;
use crate::error::FeedError;
use crate::feed::{DataSourceKind, ServerTime};
use crate::markers::Signal;
use crate::timeframe::Timeframe;

#[derive(Debug)]
pub enum AppEvent {
    Ui(UiEvent),
    Timer(TimerEvent),
    Fetch(FetchEvent),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    SymbolChanged { symbol: String },
    TimeframeChanged { timeframe: Timeframe },
    DataSourceChanged { source: DataSourceKind },
    RealtimeToggled { enabled: bool },
    BotChanged { bot_id: Option<String> },
    Refresh,
    ClearMarkers,
    StatusRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Historical { generation: u64 },
    Realtime { generation: u64 },
    Signals { generation: u64 },
    Countdown,
}

/// Completed HTTP request, tagged with the generation it was issued under.
#[derive(Debug)]
pub enum FetchEvent {
    HistoryLoaded {
        generation: u64,
        result: Result<Vec<RawCandle>, FeedError>,
    },
    CurrentCandle {
        generation: u64,
        result: Result<Option<RawCandle>, FeedError>,
    },
    SignalPolled {
        generation: u64,
        result: Result<Option<Signal>, FeedError>,
    },
    ServerTime {
        /// local unix seconds when the request went out
        requested_at: i64,
        result: Result<ServerTime, FeedError>,
    },
}
