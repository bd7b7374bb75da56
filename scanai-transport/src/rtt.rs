use std::time::Duration;

const INITIAL_SRTT: Duration = Duration::from_millis(200);
const INITIAL_RTTVAR: Duration = Duration::from_millis(100);
const RTT_ALPHA: f32 = 0.125;
const RTT_BETA: f32 = 0.25;

/// Smoothed round-trip-time estimator for the session's heartbeat.
///
/// The pipeline never retransmits an upload (losses are accepted, per
/// the transport contract), so this isn't used to pace retries the
/// way an RFC 6298 RTO normally would; it exists because the spec's
/// own Open Questions note that `frame_sequence` round trips are never
/// timed in the observed source, and a better implementation should.
/// Heartbeats are the one request/response pair this pipeline sends
/// on a predictable cadence, so that's where round-trip latency gets
/// tracked for the metrics stream.
#[derive(Debug, Clone, Copy)]
pub struct RttEstimator {
    srtt: Duration,
    rttvar: Duration,
    samples: u64,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl RttEstimator {
    pub fn new() -> Self {
        Self {
            srtt: INITIAL_SRTT,
            rttvar: INITIAL_RTTVAR,
            samples: 0,
        }
    }

    /// Folds one observed round-trip sample into the running estimate.
    pub fn update(&mut self, sample: Duration) {
        let diff = sample.abs_diff(self.srtt);
        self.rttvar = self.rttvar.mul_f32(1.0 - RTT_BETA) + diff.mul_f32(RTT_BETA);
        self.srtt = self.srtt.mul_f32(1.0 - RTT_ALPHA) + sample.mul_f32(RTT_ALPHA);
        self.samples += 1;
    }

    pub fn smoothed(&self) -> Duration {
        self.srtt
    }

    pub fn variance(&self) -> Duration {
        self.rttvar
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_toward_a_steady_sample() {
        let mut est = RttEstimator::new();
        for _ in 0..50 {
            est.update(Duration::from_millis(40));
        }
        let smoothed_ms = est.smoothed().as_millis();
        assert!((35..=45).contains(&smoothed_ms), "smoothed={smoothed_ms}");
    }

    #[test]
    fn counts_samples() {
        let mut est = RttEstimator::new();
        est.update(Duration::from_millis(10));
        est.update(Duration::from_millis(20));
        assert_eq!(est.samples(), 2);
    }
}
