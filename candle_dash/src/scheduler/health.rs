/// What the warm-up counter wants logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmupNotice {
    /// First "not ready" of this realtime session.
    Started,
    /// Still not ready after `attempts` polls.
    Stalled { attempts: u32 },
}

/// Bookkeeping for one realtime session: the warm-up counter (404 / no candle yet)
/// and the consecutive-error counter that force-stops the stream.
#[derive(Debug, Clone)]
pub struct RealtimeHealth {
    threshold: u32,
    ceiling: u32,
    not_ready: u32,
    consecutive_errors: u32,
    notices: u32,
}

impl RealtimeHealth {
    pub fn new(threshold: u32, ceiling_multiplier: u32) -> Self {
        let threshold = threshold.max(1);
        Self {
            threshold,
            ceiling: threshold.saturating_mul(ceiling_multiplier.max(1)),
            not_ready: 0,
            consecutive_errors: 0,
            notices: 0,
        }
    }

    pub fn reset(&mut self) {
        self.not_ready = 0;
        self.consecutive_errors = 0;
        self.notices = 0;
    }

    /// Any answer from the backend, including "no candle yet".
    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
    }

    /// A real candle arrived; warm-up is over.
    pub fn record_candle(&mut self) {
        self.consecutive_errors = 0;
        self.not_ready = 0;
    }

    /// Logs on the first occurrence, then once per `threshold` further attempts.
    pub fn record_not_ready(&mut self) -> Option<WarmupNotice> {
        self.not_ready = self.not_ready.saturating_add(1);
        let n = self.not_ready;
        let notice = if n == 1 {
            Some(WarmupNotice::Started)
        } else if (n - 1) % self.threshold == 0 {
            Some(WarmupNotice::Stalled { attempts: n })
        } else {
            None
        };
        if notice.is_some() {
            self.notices += 1;
        }
        notice
    }

    /// Returns the new consecutive count.
    pub fn record_error(&mut self) -> u32 {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.consecutive_errors
    }

    pub fn exhausted(&self) -> bool {
        self.consecutive_errors >= self.ceiling
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn not_ready_attempts(&self) -> u32 {
        self.not_ready
    }

    /// Warm-up notices emitted this session.
    pub fn warmup_notices(&self) -> u32 {
        self.notices
    }
}
