//! Server-synchronized clock.
//!
//! The engine answers time-sync requests with the difference between its
//! clock and the client's. Snapshot timestamps are taken from this clock and
//! never go backwards, even when a new difference moves the offset.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct ClockState {
    time_diff_ms: f64,
    last_now_ms: f64,
}

/// Client clock corrected by the last synchronized offset.
#[derive(Debug, Default)]
pub struct ServerClock {
    state: Mutex<ClockState>,
}

impl ServerClock {
    /// Create a clock with a zero offset
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the offset reported by the engine
    pub fn set_time_diff(&self, time_diff_ms: f64) {
        self.state.lock().time_diff_ms = time_diff_ms;
    }

    /// Last stored offset
    pub fn time_diff(&self) -> f64 {
        self.state.lock().time_diff_ms
    }

    /// Current engine time in milliseconds
    pub fn now(&self) -> f64 {
        self.now_at(wall_clock_ms())
    }

    fn now_at(&self, wall_ms: f64) -> f64 {
        let mut state = self.state.lock();
        let now = (wall_ms - state.time_diff_ms).max(state.last_now_ms);
        state.last_now_ms = now;
        now
    }
}

fn wall_clock_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or_default()
}
