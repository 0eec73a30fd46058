mod common;

use candle_dash::app::{AppEvent, Dashboard, UiEvent};
use candle_dash::feed::{DataSource, DataSourceKind};
use candle_dash::markers::{MarkerPosition, MarkerShape, Signal, CALL_COLOR, PUT_COLOR};
use candle_dash::persist::DashboardConfig;
use candle_dash::scheduler::PollingMode;
use candle_dash::timeframe::Timeframe;
use common::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn signal(timestamp: f64, direction: &str, reversal: Option<&str>) -> Signal {
    Signal {
        timestamp,
        direction: direction.to_string(),
        indicators: reversal.map(|r| json!({ "reversal_indicator": r })),
        symbol: Some("EURUSD".to_string()),
        timeframe: Some("M5".to_string()),
        confidence: None,
        strategy: None,
    }
}

fn dashboard(cfg: &DashboardConfig, source: ScriptedSource) -> (Dashboard, Arc<ScriptedSource>, RecordingSink) {
    let source = Arc::new(source);
    let sink = RecordingSink::default();
    let dash = Dashboard::new(cfg, source.clone() as Arc<dyn DataSource>, Box::new(sink.clone()));
    (dash, source, sink)
}

fn ui(dash: &mut Dashboard, ev: UiEvent) -> bool {
    dash.handle_event(AppEvent::Ui(ev))
}

#[tokio::test(start_paused = true)]
async fn start_loads_history_with_configured_selection() {
    let cfg = DashboardConfig {
        symbol: "GBPUSD".to_string(),
        timeframe: Timeframe::M15,
        data_source: DataSourceKind::Finnhub,
        ..Default::default()
    };
    let (mut dash, source, sink) = dashboard(&cfg, ScriptedSource::new().with_candles(minute_batch(40)));
    dash.start();
    assert!(dash.state_snapshot().is_loading);
    dash.run_for(ms(500)).await;

    let q = source.last_query().unwrap();
    assert_eq!(q.symbol, "GBPUSD");
    assert_eq!(q.timeframe, Timeframe::M15);
    assert_eq!(q.source, DataSourceKind::Finnhub);
    assert_eq!(q.limit, 40);

    assert_eq!(sink.replaces(), 1);
    let state = dash.state_snapshot();
    assert_eq!(state.candles.len(), 40);
    assert!(!state.is_loading);
    assert_eq!(dash.scheduler().mode(), PollingMode::Historical);
    assert!(dash.countdown().last().is_some());
}

#[tokio::test(start_paused = true)]
async fn markers_are_deduplicated_per_candle() {
    let cfg = DashboardConfig {
        bot_id: Some("7".to_string()),
        ..Default::default()
    };
    let source = ScriptedSource::new().with_candles(minute_batch(10));
    source.push_signal(Ok(Some(signal(1_000.0, "CALL", None))));
    source.push_signal(Ok(Some(signal(1_000.0, "CALL", None))));
    source.push_signal(Ok(Some(signal(1_000.6, "PUT", None))));
    source.push_signal(Ok(Some(signal(1_060.0, "put", Some("R")))));
    let (mut dash, source, sink) = dashboard(&cfg, source);

    dash.start();
    dash.run_for(ms(12_500)).await;

    assert_eq!(source.signal_calls(), 4);
    assert_eq!(source.signal_bots()[0], "7");
    assert_eq!(sink.marker_pushes(), 2);

    let markers = sink.last_markers().unwrap();
    assert_eq!(markers.len(), 2);
    assert_eq!(markers[0].time, 1_000);
    assert_eq!(markers[0].text, "CALL");
    assert_eq!(markers[0].position, MarkerPosition::BelowBar);
    assert_eq!(markers[0].shape, MarkerShape::ArrowUp);
    assert_eq!(markers[0].color, CALL_COLOR);
    assert_eq!(markers[1].time, 1_060);
    assert_eq!(markers[1].text, "PUT (R)");
    assert_eq!(markers[1].position, MarkerPosition::AboveBar);
    assert_eq!(markers[1].color, PUT_COLOR);
    assert_eq!(dash.scheduler().markers().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn no_signal_leaves_markers_alone() {
    let cfg = DashboardConfig {
        bot_id: Some("7".to_string()),
        ..Default::default()
    };
    let (mut dash, source, sink) = dashboard(&cfg, ScriptedSource::new().with_candles(minute_batch(10)));
    dash.start();
    dash.run_for(ms(9_500)).await;

    assert_eq!(source.signal_calls(), 3);
    assert_eq!(sink.marker_pushes(), 0);
}

#[tokio::test(start_paused = true)]
async fn clear_markers_pushes_empty_list() {
    let cfg = DashboardConfig {
        bot_id: Some("7".to_string()),
        ..Default::default()
    };
    let source = ScriptedSource::new().with_candles(minute_batch(10));
    source.push_signal(Ok(Some(signal(1_000.0, "CALL", None))));
    let (mut dash, _source, sink) = dashboard(&cfg, source);
    dash.start();
    dash.run_for(ms(3_500)).await;
    assert_eq!(dash.scheduler().markers().len(), 1);

    assert!(ui(&mut dash, UiEvent::ClearMarkers));
    assert!(dash.scheduler().markers().is_empty());
    assert_eq!(sink.last_markers(), Some(Vec::new()));
}

#[tokio::test(start_paused = true)]
async fn bot_change_keeps_markers_unless_configured() {
    for clear in [false, true] {
        let cfg = DashboardConfig {
            bot_id: Some("7".to_string()),
            clear_markers_on_bot_change: clear,
            ..Default::default()
        };
        let source = ScriptedSource::new().with_candles(minute_batch(10));
        source.push_signal(Ok(Some(signal(1_000.0, "CALL", None))));
        let (mut dash, source, _sink) = dashboard(&cfg, source);
        dash.start();
        dash.run_for(ms(3_500)).await;

        ui(
            &mut dash,
            UiEvent::BotChanged {
                bot_id: Some("9".to_string()),
            },
        );
        let expected = if clear { 0 } else { 1 };
        assert_eq!(dash.scheduler().markers().len(), expected);

        dash.run_for(ms(3_000)).await;
        assert_eq!(source.signal_bots().last().map(String::as_str), Some("9"));
    }
}

#[tokio::test(start_paused = true)]
async fn symbol_change_clears_and_reloads() {
    let (mut dash, source, sink) = dashboard(
        &DashboardConfig::default(),
        ScriptedSource::new().with_candles(minute_batch(10)),
    );
    dash.start();
    dash.run_for(ms(500)).await;
    assert_eq!(dash.state_snapshot().candles.len(), 10);

    ui(
        &mut dash,
        UiEvent::SymbolChanged {
            symbol: "btcusd".to_string(),
        },
    );
    let state = dash.state_snapshot();
    assert_eq!(state.symbol, "BTCUSD");
    assert!(state.candles.is_empty());
    assert!(state.is_loading);

    dash.run_for(ms(500)).await;
    assert_eq!(source.last_query().unwrap().symbol, "BTCUSD");
    assert_eq!(sink.replaces(), 2);
    assert!(!dash.state_snapshot().is_loading);
}

#[tokio::test(start_paused = true)]
async fn reselecting_or_unknown_symbol_is_ignored() {
    let (mut dash, source, _sink) = dashboard(
        &DashboardConfig::default(),
        ScriptedSource::new().with_candles(minute_batch(10)),
    );
    dash.start();
    dash.run_for(ms(500)).await;
    let generation = dash.scheduler().candle_generation();

    ui(
        &mut dash,
        UiEvent::SymbolChanged {
            symbol: "EURUSD".to_string(),
        },
    );
    ui(
        &mut dash,
        UiEvent::SymbolChanged {
            symbol: "DOGEUSD".to_string(),
        },
    );
    ui(
        &mut dash,
        UiEvent::TimeframeChanged {
            timeframe: Timeframe::M5,
        },
    );
    assert_eq!(dash.scheduler().candle_generation(), generation);
    assert_eq!(dash.state_snapshot().symbol, "EURUSD");
    assert_eq!(dash.state_snapshot().candles.len(), 10);
    dash.run_for(ms(500)).await;
    assert_eq!(source.candle_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn timeframe_change_in_realtime_reseeds() {
    let (mut dash, source, sink) = dashboard(
        &DashboardConfig::default(),
        ScriptedSource::new().with_candles(minute_batch(10)),
    );
    dash.start();
    dash.run_for(ms(500)).await;
    ui(&mut dash, UiEvent::RealtimeToggled { enabled: true });
    assert_eq!(dash.scheduler().mode(), PollingMode::Realtime);

    ui(
        &mut dash,
        UiEvent::TimeframeChanged {
            timeframe: Timeframe::H1,
        },
    );
    dash.run_for(ms(1_500)).await;
    assert_eq!(dash.scheduler().mode(), PollingMode::Realtime);
    assert_eq!(source.last_query().unwrap().timeframe, Timeframe::H1);
    assert_eq!(sink.replaces(), 2);
    assert!(source.current_calls() >= 1);

    ui(&mut dash, UiEvent::RealtimeToggled { enabled: false });
    assert_eq!(dash.scheduler().mode(), PollingMode::Historical);
}

#[tokio::test(start_paused = true)]
async fn source_change_restarts_feed() {
    let (mut dash, source, _sink) = dashboard(
        &DashboardConfig::default(),
        ScriptedSource::new().with_candles(minute_batch(10)),
    );
    dash.start();
    dash.run_for(ms(500)).await;
    ui(
        &mut dash,
        UiEvent::DataSourceChanged {
            source: DataSourceKind::OlympTrade,
        },
    );
    assert_eq!(dash.state_snapshot().data_source, DataSourceKind::OlympTrade);
    dash.run_for(ms(500)).await;
    assert_eq!(source.last_query().unwrap().source, DataSourceKind::OlympTrade);
}

#[tokio::test(start_paused = true)]
async fn realtime_on_start_seeds_then_streams() {
    let cfg = DashboardConfig {
        realtime_on_start: true,
        ..Default::default()
    };
    let (mut dash, source, sink) = dashboard(&cfg, ScriptedSource::new().with_candles(minute_batch(10)));
    dash.start();
    dash.run_for(ms(2_500)).await;

    assert_eq!(dash.scheduler().mode(), PollingMode::Realtime);
    assert_eq!(source.candle_calls(), 1);
    assert_eq!(source.current_calls(), 2);
    assert_eq!(sink.replaces(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_event_stops_the_loop() {
    let (mut dash, source, _sink) = dashboard(
        &DashboardConfig {
            bot_id: Some("1".to_string()),
            ..Default::default()
        },
        ScriptedSource::new().with_candles(minute_batch(10)),
    );
    dash.start();
    dash.run_for(ms(500)).await;

    assert!(!dash.handle_event(AppEvent::Shutdown));
    assert!(dash.is_stopped());
    assert_eq!(dash.scheduler().mode(), PollingMode::Idle);
    assert!(!dash.scheduler().signals_active());

    // a stopped dashboard ignores whatever is still queued
    assert!(!ui(&mut dash, UiEvent::Refresh));
    let calls = source.candle_calls();
    dash.run_for(ms(5_000)).await;
    assert_eq!(source.candle_calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn run_returns_after_shutdown_is_sent() {
    let (mut dash, _source, _sink) = dashboard(
        &DashboardConfig::default(),
        ScriptedSource::new().with_candles(minute_batch(10)),
    );
    let tx = dash.sender();
    dash.start();
    tokio::spawn(async move {
        tokio::time::sleep(ms(3_000)).await;
        let _ = tx.send(AppEvent::Shutdown);
    });
    dash.run().await;
    assert!(dash.is_stopped());
    assert_eq!(dash.scheduler().mode(), PollingMode::Idle);
}
