use std::time::{Duration, Instant};

/// Outcome of a single admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Skip,
}

const DEFAULT_GHOST_TIMEOUT: Duration = Duration::from_secs(3);
const CRITICAL_BUFFER: u64 = 100;
const STAGE_1_STEP: u64 = 10;
const STAGE_2_STEP: u64 = 5;

/// Two-stage progressive-skip admission controller. Mirrors an
/// AIMD-style congestion controller in shape — both widen the
/// admission window as congestion clears and narrow it as congestion
/// builds — but the two stages here are a fixed step function rather
/// than a continuous window, and the aggressiveness tier never drops
/// back down within a session.
pub struct Throttler {
    frames_sent: u64,
    frames_received: u64,
    server_buffer_size: Option<u64>,
    last_ack: Instant,
    n: u64,
    stage: u8,
    admitted_total: u64,
    skipped_total: u64,
    ghost_timeout: Duration,
}

impl Throttler {
    pub fn new(now: Instant) -> Self {
        Self::with_ghost_timeout(now, DEFAULT_GHOST_TIMEOUT)
    }

    pub fn with_ghost_timeout(now: Instant, ghost_timeout: Duration) -> Self {
        Self {
            frames_sent: 0,
            frames_received: 0,
            server_buffer_size: None,
            last_ack: now,
            n: 0,
            stage: 1,
            admitted_total: 0,
            skipped_total: 0,
            ghost_timeout,
        }
    }

    pub fn stage(&self) -> u8 {
        self.stage
    }

    pub fn admitted_total(&self) -> u64 {
        self.admitted_total
    }

    pub fn skipped_total(&self) -> u64 {
        self.skipped_total
    }

    fn in_flight(&self) -> u64 {
        self.frames_sent.saturating_sub(self.frames_received)
    }

    fn effective_buffer_size(&self) -> u64 {
        self.server_buffer_size.unwrap_or_else(|| self.in_flight())
    }

    /// Records a successful transmission. Called only when `decide`
    /// returns `Admit` and the send actually happens.
    pub fn record_sent(&mut self) {
        self.frames_sent += 1;
    }

    /// Records a server acknowledgment (a successful response),
    /// optionally carrying the server's own view of its buffer depth.
    pub fn record_ack(&mut self, now: Instant, server_buffer_size: Option<u64>) {
        self.frames_received += 1;
        self.last_ack = now;
        if server_buffer_size.is_some() {
            self.server_buffer_size = server_buffer_size;
        }
    }

    /// Resets all counters and the stage to their initial values, as
    /// on `startStreaming`.
    pub fn reset(&mut self, now: Instant) {
        *self = Self::with_ghost_timeout(now, self.ghost_timeout);
    }

    /// Decides whether the current candidate frame should be
    /// transmitted. Advances internal counters as a side effect, per
    /// the progressive-skip rule.
    pub fn decide(&mut self, now: Instant) -> Admission {
        self.n += 1;

        let in_flight = self.in_flight();
        if in_flight > 0 && now.duration_since(self.last_ack) >= self.ghost_timeout {
            self.frames_received = self.frames_sent;
            self.server_buffer_size = Some(0);
            self.last_ack = now;
            return self.record(Admission::Admit);
        }

        let buffer_size = self.effective_buffer_size();

        if buffer_size >= CRITICAL_BUFFER {
            self.frames_received = self.frames_sent;
            self.n = 0;
            if self.stage == 1 {
                self.stage = 2;
            }
            return self.record(Admission::Skip);
        }

        let step = if self.stage == 1 { STAGE_1_STEP } else { STAGE_2_STEP };
        let interval = buffer_size / step;
        let admission = if interval == 0 {
            Admission::Admit
        } else if self.n % interval == 0 {
            Admission::Admit
        } else {
            Admission::Skip
        };
        self.record(admission)
    }

    fn record(&mut self, admission: Admission) -> Admission {
        match admission {
            Admission::Admit => self.admitted_total += 1,
            Admission::Skip => self.skipped_total += 1,
        }
        admission
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admit_n(t: &mut Throttler, now: Instant, n: usize) -> Vec<Admission> {
        (0..n).map(|_| t.decide(now)).collect()
    }

    #[test]
    fn buffer_zero_admits_every_frame_at_either_stage() {
        let now = Instant::now();
        let mut t = Throttler::new(now);
        t.server_buffer_size = Some(0);
        for r in admit_n(&mut t, now, 20) {
            assert_eq!(r, Admission::Admit);
        }
        t.stage = 2;
        for r in admit_n(&mut t, now, 20) {
            assert_eq!(r, Admission::Admit);
        }
    }

    #[test]
    fn buffer_99_stage_1_admits_one_of_nine() {
        let now = Instant::now();
        let mut t = Throttler::new(now);
        t.server_buffer_size = Some(99);
        // interval = 99 / 10 = 9; admits iff n % 9 == 0
        let results = admit_n(&mut t, now, 18);
        let admits = results.iter().filter(|r| **r == Admission::Admit).count();
        assert_eq!(admits, 2);
    }

    #[test]
    fn buffer_50_stage_1_admits_every_fifth() {
        let now = Instant::now();
        let mut t = Throttler::new(now);
        t.server_buffer_size = Some(50);
        // interval = 50 / 10 = 5
        assert_eq!(t.decide(now), Admission::Skip); // n=1
        assert_eq!(t.decide(now), Admission::Skip); // n=2
        assert_eq!(t.decide(now), Admission::Skip); // n=3
        assert_eq!(t.decide(now), Admission::Skip); // n=4
        assert_eq!(t.decide(now), Admission::Admit); // n=5
    }

    #[test]
    fn buffer_50_stage_2_admits_every_tenth() {
        let now = Instant::now();
        let mut t = Throttler::new(now);
        t.stage = 2;
        t.server_buffer_size = Some(50);
        // step halves from 10 to 5 at stage 2, so interval = 50 / 5 = 10.
        let results = admit_n(&mut t, now, 20);
        let admits: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| **r == Admission::Admit)
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(admits, vec![10, 20]);
    }

    #[test]
    fn buffer_100_stage_1_promotes_and_skips() {
        let now = Instant::now();
        let mut t = Throttler::new(now);
        t.server_buffer_size = Some(100);
        assert_eq!(t.decide(now), Admission::Skip);
        assert_eq!(t.stage(), 2);

        t.server_buffer_size = Some(0);
        assert_eq!(t.decide(now), Admission::Admit);
    }

    #[test]
    fn stage_never_decreases() {
        let now = Instant::now();
        let mut t = Throttler::new(now);
        t.server_buffer_size = Some(100);
        t.decide(now);
        assert_eq!(t.stage(), 2);
        t.server_buffer_size = Some(0);
        for _ in 0..50 {
            t.decide(now);
        }
        assert_eq!(t.stage(), 2);
    }

    #[test]
    fn totals_track_admit_and_skip_counts() {
        let now = Instant::now();
        let mut t = Throttler::new(now);
        t.server_buffer_size = Some(50);
        admit_n(&mut t, now, 10);
        assert_eq!(t.admitted_total() + t.skipped_total(), 10);
        assert_eq!(t.admitted_total(), 2);
    }

    #[test]
    fn ghost_recovery_admits_and_resets_in_flight() {
        let start = Instant::now();
        let mut t = Throttler::new(start);
        t.frames_sent = 40;
        t.frames_received = 10;
        t.last_ack = start;

        let later = start + Duration::from_secs(4);
        let result = t.decide(later);
        assert_eq!(result, Admission::Admit);
        assert_eq!(t.frames_received, t.frames_sent);
    }
}
