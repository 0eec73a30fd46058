use crate::app::event::{AppEvent, TimerEvent};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Repeating tick source. Posts `make(generation)` into the event loop every `period`
/// until dropped; dropping aborts the task, so replacing a handle stops the old timer.
#[derive(Debug)]
pub struct TimerHandle {
    generation: u64,
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// `immediate` fires the first tick right away, otherwise after one period.
    pub fn spawn(
        tx: UnboundedSender<AppEvent>,
        period: Duration,
        immediate: bool,
        generation: u64,
        make: fn(u64) -> TimerEvent,
    ) -> Self {
        let task = tokio::spawn(async move {
            let start = if immediate {
                Instant::now()
            } else {
                Instant::now() + period
            };
            let mut ticks = interval_at(start, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if tx.send(AppEvent::Timer(make(generation))).is_err() {
                    // loop is gone
                    break;
                }
            }
        });
        Self { generation, task }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
