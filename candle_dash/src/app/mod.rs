pub mod commands;
pub mod event;
pub mod reducer;
pub mod render;
pub mod state;

pub use event::*;
pub use state::*;

use crate::feed::DataSource;
use crate::persist::DashboardConfig;
use crate::scheduler::{FeedParams, Scheduler, TimerHandle};
use crate::sink::ChartSink;
use reducer::{Flow, Panels};
use render::{CountdownPanel, InfoPanel, ServerClock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Application root: owns the shared state, the scheduler and the panels, and runs
/// the event loop that every timer tick, fetch completion and command goes through.
pub struct Dashboard {
    store: StateStore,
    scheduler: Scheduler,
    panels: Panels,
    source: Arc<dyn DataSource>,
    tx: UnboundedSender<AppEvent>,
    rx: UnboundedReceiver<AppEvent>,
    countdown: Option<TimerHandle>,
    initial_bot: Option<String>,
    realtime_on_start: bool,
    quit: bool,
}

impl Dashboard {
    pub fn new(cfg: &DashboardConfig, source: Arc<dyn DataSource>, sink: Box<dyn ChartSink>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut store = StateStore::new(DashboardState {
            symbol: cfg.symbol.clone(),
            timeframe: cfg.timeframe,
            data_source: cfg.data_source,
            ..Default::default()
        });
        let info = InfoPanel::attach(&mut store);
        render::attach_toasts(&mut store);

        let params = FeedParams {
            symbol: cfg.symbol.clone(),
            timeframe: cfg.timeframe,
            source: cfg.data_source,
        };
        let scheduler = Scheduler::new(cfg.scheduler_config(), source.clone(), sink, tx.clone(), params);

        Self {
            store,
            scheduler,
            panels: Panels {
                info,
                countdown: CountdownPanel::default(),
                clock: ServerClock::default(),
            },
            source,
            tx,
            rx,
            countdown: None,
            initial_bot: cfg.bot_id.clone(),
            realtime_on_start: cfg.realtime_on_start,
            quit: false,
        }
    }

    pub fn sender(&self) -> UnboundedSender<AppEvent> {
        self.tx.clone()
    }

    /// Kick off polling, the countdown clock and the one-off server clock sync.
    pub fn start(&mut self) {
        self.store.set_loading(true);
        if self.realtime_on_start {
            let state = self.store.get();
            let (symbol, timeframe) = (state.symbol.clone(), state.timeframe);
            self.scheduler.start_realtime(&symbol, timeframe);
        } else {
            self.scheduler.start_historical();
        }
        self.scheduler.set_bot_id(self.initial_bot.take());

        self.countdown = Some(TimerHandle::spawn(
            self.tx.clone(),
            Duration::from_secs(1),
            true,
            0,
            |_| TimerEvent::Countdown,
        ));

        let source = self.source.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let requested_at = now_unix();
            let result = source.fetch_server_time().await;
            let _ = tx.send(AppEvent::Fetch(FetchEvent::ServerTime {
                requested_at,
                result,
            }));
        });
    }

    /// Returns false once the dashboard has been asked to quit.
    pub fn handle_event(&mut self, ev: AppEvent) -> bool {
        if self.quit {
            return false;
        }
        let flow = reducer::reduce(&mut self.store, &mut self.scheduler, &mut self.panels, ev);
        if flow == Flow::Quit {
            self.stop();
        }
        !self.quit
    }

    pub async fn run(&mut self) {
        while !self.quit {
            match self.rx.recv().await {
                Some(ev) => {
                    self.handle_event(ev);
                }
                None => break,
            }
        }
        self.stop();
    }

    /// Run the loop for `dur` of (tokio) time, then return with everything still
    /// running.
    pub async fn run_for(&mut self, dur: Duration) {
        let deadline = tokio::time::Instant::now() + dur;
        while !self.quit {
            let ev = tokio::select! {
                biased;
                ev = self.rx.recv() => ev,
                _ = tokio::time::sleep_until(deadline) => break,
            };
            match ev {
                Some(ev) => {
                    self.handle_event(ev);
                }
                None => break,
            }
        }
    }

    fn stop(&mut self) {
        if self.quit {
            return;
        }
        self.quit = true;
        self.countdown = None;
        self.scheduler.shutdown();
    }

    pub fn is_stopped(&self) -> bool {
        self.quit
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn store_mut(&mut self) -> &mut StateStore {
        &mut self.store
    }

    pub fn state_snapshot(&self) -> DashboardState {
        self.store.snapshot()
    }

    pub fn server_clock(&self) -> &ServerClock {
        &self.panels.clock
    }

    pub fn countdown(&self) -> &CountdownPanel {
        &self.panels.countdown
    }
}
