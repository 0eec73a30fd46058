use super::event::*;
use super::render::{CountdownPanel, InfoPanel, ServerClock};
use super::state::*;
use crate::debug_hooks;
use crate::scheduler::{FeedParams, PollingMode, Scheduler};

/// Whether the loop keeps going after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Panels {
    pub info: InfoPanel,
    pub countdown: CountdownPanel,
    pub clock: ServerClock,
}

pub fn reduce(
    store: &mut StateStore,
    scheduler: &mut Scheduler,
    panels: &mut Panels,
    ev: AppEvent,
) -> Flow {
    match ev {
        AppEvent::Ui(u) => reduce_ui(store, scheduler, panels, u),
        AppEvent::Timer(t) => reduce_timer(store, scheduler, panels, t),
        AppEvent::Fetch(f) => reduce_fetch(store, scheduler, panels, f),
        AppEvent::Shutdown => {
            scheduler.shutdown();
            return Flow::Quit;
        }
    }
    panels.info.render_if_dirty(store.get());
    Flow::Continue
}

fn params_of(state: &DashboardState) -> FeedParams {
    FeedParams {
        symbol: state.symbol.clone(),
        timeframe: state.timeframe,
        source: state.data_source,
    }
}

fn reduce_ui(store: &mut StateStore, scheduler: &mut Scheduler, panels: &mut Panels, ev: UiEvent) {
    match ev {
        UiEvent::SymbolChanged { symbol } => {
            let symbol = symbol.trim().to_ascii_uppercase();
            if !SYMBOLS.contains(&symbol.as_str()) {
                debug_hooks::log_command(&symbol, "symbol is not available");
                return;
            }
            if store.get().symbol == symbol {
                return;
            }
            store.change_symbol(symbol);
            scheduler.restart(params_of(store.get()));
        }
        UiEvent::TimeframeChanged { timeframe } => {
            if store.get().timeframe == timeframe {
                return;
            }
            store.change_timeframe(timeframe);
            scheduler.restart(params_of(store.get()));
            panels.countdown.reset();
        }
        UiEvent::DataSourceChanged { source } => {
            if store.get().data_source == source {
                return;
            }
            store.change_data_source(source);
            scheduler.restart(params_of(store.get()));
        }
        UiEvent::RealtimeToggled { enabled } => {
            let active = scheduler.mode() == PollingMode::Realtime;
            if enabled && !active {
                let state = store.get();
                let (symbol, timeframe) = (state.symbol.clone(), state.timeframe);
                scheduler.start_realtime(&symbol, timeframe);
            } else if !enabled && active {
                scheduler.stop_realtime();
            }
        }
        UiEvent::BotChanged { bot_id } => scheduler.set_bot_id(bot_id),
        UiEvent::Refresh => {
            store.set_loading(true);
            scheduler.refresh();
        }
        UiEvent::ClearMarkers => scheduler.clear_markers(),
        UiEvent::StatusRequested => {
            let health = scheduler.health();
            let lines = vec![
                format!("mode: {}", scheduler.mode().as_str()),
                format!("bot: {}", scheduler.bot_id().unwrap_or("-")),
                format!("markers: {}", scheduler.markers().len()),
                format!(
                    "realtime errors: {}/{}",
                    health.consecutive_errors(),
                    health.ceiling()
                ),
                format!("loading: {}", store.get().is_loading),
                format!("error: {}", store.get().error.as_deref().unwrap_or("-")),
            ];
            debug_hooks::log_panel("status", &lines);
            panels.info.mark_dirty();
        }
    }
}

fn reduce_timer(store: &mut StateStore, scheduler: &mut Scheduler, panels: &mut Panels, ev: TimerEvent) {
    match ev {
        TimerEvent::Countdown => {
            let now = panels.clock.now(now_unix());
            panels.countdown.tick(now, store.get().timeframe);
        }
        other => scheduler.on_timer(other),
    }
}

fn reduce_fetch(store: &mut StateStore, scheduler: &mut Scheduler, panels: &mut Panels, ev: FetchEvent) {
    match ev {
        FetchEvent::ServerTime {
            requested_at,
            result,
        } => match result {
            Ok(server) => panels.clock.sync(&server, requested_at, now_unix()),
            Err(err) => debug_hooks::log_poll_error("server_time", &err),
        },
        other => scheduler.on_fetch(other, store),
    }
}
