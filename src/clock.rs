use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Millisecond wall clock that never goes backwards
///
/// Readings are the wall-clock time at construction plus the elapsed time of a
/// tokio [`Instant`]. Under a paused tokio runtime the clock advances together
/// with timers, which keeps round timestamps and deadlines consistent.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin_ms: u64,
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        let origin_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self::starting_at(origin_ms)
    }

    pub fn starting_at(origin_ms: u64) -> Self {
        Self {
            origin_ms,
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.origin_ms + self.origin.elapsed().as_millis() as u64
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
