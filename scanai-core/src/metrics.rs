use serde::Serialize;

use crate::broadcast::BroadcastMetrics;
use crate::consensus::ConsensusState;

/// A point-in-time snapshot of every counter named across the
/// pipeline's components, aggregated for the metrics stream exposed
/// to the host app. No individual counter here is itself an error —
/// they exist so an operator can see a flapping connection or a
/// congested server without the pipeline surfacing a dialog for
/// every dropped frame.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PipelineMetrics {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub chunks_sent: u64,
    pub frames_received: u64,
    pub reassembly_completed: u64,
    pub reassembly_evicted: u64,
    pub reassembly_quota_rejected: u64,
    pub reassembly_malformed_dropped: u64,
    pub server_reported_failures: u64,
    pub throttle_stage: u8,
    pub throttle_skipped: u64,
    pub throttle_admitted: u64,
    pub display_sync_misses: u64,
    pub display_sync_overflows: u64,
    pub display_sync_pending: usize,
    pub consensus_running: bool,
    pub consensus_published: u64,
    pub consensus_dropped_classes: u64,
    pub broadcast: BroadcastMetrics,
    pub heartbeat_rtt_ms: Option<u64>,
}

impl PipelineMetrics {
    pub fn consensus_state(mut self, state: ConsensusState) -> Self {
        self.consensus_running = matches!(state, ConsensusState::Running);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_all_zero() {
        let m = PipelineMetrics::default();
        assert_eq!(m.frames_sent, 0);
        assert!(!m.consensus_running);
    }

    #[test]
    fn consensus_state_helper_sets_running_flag() {
        let m = PipelineMetrics::default().consensus_state(ConsensusState::Running);
        assert!(m.consensus_running);
    }
}
