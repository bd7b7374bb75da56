use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Suppresses repeat `warn!`/`error!` emissions for the same error
/// kind within a configurable window, so a flapping connection does
/// not flood the log with identical lines.
pub struct LogThrottle {
    window: Duration,
    last_emitted: HashMap<&'static str, Instant>,
}

impl LogThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_emitted: HashMap::new(),
        }
    }

    /// Returns `true` if an event tagged `kind` should be logged now,
    /// recording the emission if so.
    pub fn should_emit(&mut self, kind: &'static str, now: Instant) -> bool {
        match self.last_emitted.get(kind) {
            Some(last) if now.duration_since(*last) < self.window => false,
            _ => {
                self.last_emitted.insert(kind, now);
                true
            }
        }
    }
}
