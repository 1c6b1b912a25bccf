//! Monotonic lap timer
//!
//! Measures wall time between successive component invocations over
//! `std::time::Instant`.

use std::time::Instant;

pub(crate) struct LapTimer {
    last: Instant,
}

impl LapTimer {
    pub fn start() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    /// Milliseconds since the previous lap (or since `start`).
    pub fn lap_ms(&mut self) -> f64 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last);
        self.last = now;
        elapsed.as_secs_f64() * 1000.0
    }
}
