use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct WindowState {
    window_started_at: Instant,
    suppressed: u64,
}

/// Rate-limits repetitive log lines per key. A burst of identical events is
/// reported once per window, together with how many were swallowed.
#[derive(Debug)]
pub struct LogThrottle {
    interval: Duration,
    windows: Mutex<HashMap<&'static str, WindowState>>,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        LogThrottle {
            interval,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `Some(suppressed_count)` when a log for `key` should be emitted,
    /// otherwise `None` and the event is counted as suppressed for the active window.
    pub fn should_emit(&self, key: &'static str) -> Option<u64> {
        // A poisoned map only loses suppression counts.
        let mut map = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        let Some(state) = map.get_mut(key) else {
            map.insert(
                key,
                WindowState {
                    window_started_at: now,
                    suppressed: 0,
                },
            );
            return Some(0);
        };
        if now.duration_since(state.window_started_at) >= self.interval {
            let suppressed = state.suppressed;
            state.window_started_at = now;
            state.suppressed = 0;
            Some(suppressed)
        } else {
            state.suppressed += 1;
            None
        }
    }
}
