//! Frame-driven timers using an accumulator pattern.
//!
//! `draw_web()` calls at ~60fps with variable delta. [`Interval`] converts
//! this into a whole number of firings per period, and [`Debounce`] fires
//! once after a quiet period. Both are fed timestamps rather than reading a
//! clock, which keeps the engine deterministic and fully testable.

/// Fixed-period timer. Each `update` returns how many periods elapsed.
pub struct Interval {
    /// Milliseconds per firing (e.g. 1000ms for a once-per-second tick)
    period_ms: f64,
    /// Upper bound on firings returned by one update
    max_catch_up: u32,
    /// Accumulated milliseconds not yet consumed as firings
    accumulator: f64,
    /// Total firings since creation or the last reset
    pub total_fires: u64,
    /// Timestamp of the last update (ms), None if first frame
    last_timestamp: Option<f64>,
}

impl Interval {
    pub fn new(period_ms: f64, max_catch_up: u32) -> Self {
        Self {
            period_ms: period_ms.max(1.0),
            max_catch_up: max_catch_up.max(1),
            accumulator: 0.0,
            total_fires: 0,
            last_timestamp: None,
        }
    }

    /// Feed wall-clock timestamp (from `Date.now()` or similar).
    /// Returns the number of firings to process this frame.
    pub fn update(&mut self, now_ms: f64) -> u32 {
        let delta = match self.last_timestamp {
            Some(prev) => {
                // Clamp so a backgrounded tab resumes with at most `max_catch_up` firings
                (now_ms - prev).clamp(0.0, self.period_ms * self.max_catch_up as f64)
            }
            None => 0.0,
        };
        self.last_timestamp = Some(now_ms);

        self.accumulator += delta;
        let fires = ((self.accumulator / self.period_ms) as u32).min(self.max_catch_up);
        self.accumulator -= fires as f64 * self.period_ms;
        self.total_fires += fires as u64;
        fires
    }

    /// Forget the last timestamp and any partial period.
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
        self.last_timestamp = None;
    }
}

/// One-shot timer that fires `delay_ms` after the most recent `arm`.
/// Re-arming replaces the previous deadline.
pub struct Debounce {
    delay_ms: f64,
    deadline: Option<f64>,
}

impl Debounce {
    pub fn new(delay_ms: f64) -> Self {
        Self {
            delay_ms: delay_ms.max(0.0),
            deadline: None,
        }
    }

    pub fn arm(&mut self, now_ms: f64) {
        self.deadline = Some(now_ms + self.delay_ms);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// True exactly once when the deadline has passed; disarms itself.
    pub fn poll(&mut self, now_ms: f64) -> bool {
        match self.deadline {
            Some(deadline) if now_ms >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
