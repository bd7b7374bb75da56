use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Every tunable named in the pipeline design, collected so the whole
/// stack can be configured from one TOML file and so tests can build
/// scenario-specific configs without touching global state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cadence, in seconds, of the session's NAT-keepalive heartbeat.
    pub heartbeat_secs: u64,
    /// Reassembly partial expiry, in seconds.
    pub reassembly_timeout_secs: u64,
    /// Throttler ghost-ack recovery timeout, in seconds.
    pub ghost_timeout_secs: u64,
    /// Initial reconnect backoff delay, in milliseconds.
    pub backoff_initial_ms: u64,
    /// Maximum reconnect backoff delay, in milliseconds.
    pub backoff_max_ms: u64,
    /// Reconnect attempts before the session transitions to `Failed`.
    pub max_retries: u32,
    /// `connect` total timeout, in seconds.
    pub connect_timeout_secs: u64,
    /// Display Sync soft cap on buffered frames.
    pub display_max_buffer: usize,
    /// Consensus sliding window width, in milliseconds.
    pub consensus_window_ms: u64,
    /// Consensus tick period, in milliseconds.
    pub consensus_tick_ms: u64,
    /// Minimum presence ratio for a class to survive the presence filter.
    pub presence_threshold: f64,
    /// Minimum average IoU for a class to survive the stability filter
    /// when presence alone isn't high enough.
    pub stability_iou_threshold: f64,
    /// Presence ratio above which the stability filter is skipped.
    pub stability_presence_threshold: f64,
    /// Whether classes at count 0 are soft-carried in `last_stable_snapshot`
    /// to dampen one-tick flicker (spec Open Question, resolved configurable).
    pub soft_carry_enabled: bool,
    /// Port the local loopback broadcast server binds to.
    pub broadcast_port: u16,
    /// Total reassembly byte quota shared across in-flight partials.
    pub reassembly_quota_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: 25,
            reassembly_timeout_secs: 5,
            ghost_timeout_secs: 3,
            backoff_initial_ms: 1_000,
            backoff_max_ms: 30_000,
            max_retries: 10,
            connect_timeout_secs: 10,
            display_max_buffer: 300,
            consensus_window_ms: 200,
            consensus_tick_ms: 100,
            presence_threshold: 0.30,
            stability_iou_threshold: 0.30,
            stability_presence_threshold: 0.50,
            soft_carry_enabled: true,
            broadcast_port: 9090,
            reassembly_quota_bytes: 8 * 1024 * 1024,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn reassembly_timeout(&self) -> Duration {
        Duration::from_secs(self.reassembly_timeout_secs)
    }

    pub fn ghost_timeout(&self) -> Duration {
        Duration::from_secs(self.ghost_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn consensus_window(&self) -> Duration {
        Duration::from_millis(self.consensus_window_ms)
    }

    pub fn consensus_tick(&self) -> Duration {
        Duration::from_millis(self.consensus_tick_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.display_max_buffer, 300);
        assert_eq!(cfg.consensus_window_ms, 200);
        assert_eq!(cfg.consensus_tick_ms, 100);
        assert_eq!(cfg.max_retries, 10);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let cfg = PipelineConfig::from_toml_str("broadcast_port = 9191\n").unwrap();
        assert_eq!(cfg.broadcast_port, 9191);
        assert_eq!(cfg.display_max_buffer, 300);
    }
}
