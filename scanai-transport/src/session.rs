use std::time::{Duration, Instant};

use crate::backoff::Backoff;
use crate::identity::generate_session_id;

/// The client session's lifecycle. Transitions are driven entirely by
/// the caller (connect attempts, heartbeat outcomes, manual
/// disconnects) — this type only tracks where the session currently
/// sits and what to do next, it performs no I/O itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { retry_count: u32, retry_at: Instant },
    Failed,
}

/// Drives the session state machine described by the reconnect
/// contract: exponential backoff between attempts, a hard retry
/// ceiling, and a stable session id that survives reconnects so the
/// server can recognize a resuming client.
pub struct Session {
    state: SessionState,
    session_id: String,
    backoff: Backoff,
    max_retries: u32,
}

impl Session {
    pub fn new(now_ms: i64, initial_backoff: Duration, max_backoff: Duration, max_retries: u32) -> Self {
        Self {
            state: SessionState::Disconnected,
            session_id: generate_session_id(now_ms),
            backoff: Backoff::new(initial_backoff, max_backoff),
            max_retries,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Manual connect request. Valid from `Disconnected` or `Failed`
    /// (an operator retrying after giving up); a no-op from any other
    /// state.
    pub fn begin_connect(&mut self) {
        if matches!(self.state, SessionState::Disconnected | SessionState::Failed) {
            self.state = SessionState::Connecting;
        }
    }

    /// Bind and handshake succeeded.
    pub fn connect_succeeded(&mut self) {
        self.state = SessionState::Connected;
    }

    /// Bind, resolve, or handshake failed while connecting. Schedules
    /// a reconnect unless the retry ceiling is already exhausted.
    pub fn connect_failed(&mut self, now: Instant) {
        self.enter_reconnect_or_fail(0, now);
    }

    /// A transport error or missed heartbeat was observed on an
    /// established connection.
    pub fn connection_lost(&mut self, now: Instant) {
        self.enter_reconnect_or_fail(0, now);
    }

    /// Called when a scheduled reconnect attempt itself fails.
    /// Advances the retry count and reschedules, or gives up once
    /// `max_retries` is reached.
    pub fn reconnect_failed(&mut self, now: Instant) {
        let retry_count = match self.state {
            SessionState::Reconnecting { retry_count, .. } => retry_count,
            _ => 0,
        };
        self.enter_reconnect_or_fail(retry_count + 1, now);
    }

    fn enter_reconnect_or_fail(&mut self, retry_count: u32, now: Instant) {
        if retry_count >= self.max_retries {
            self.state = SessionState::Failed;
            return;
        }
        let delay = self.backoff.delay_for_attempt(retry_count + 1);
        self.state = SessionState::Reconnecting {
            retry_count,
            retry_at: now + delay,
        };
    }

    /// Whether a scheduled reconnect is due.
    pub fn reconnect_due(&self, now: Instant) -> bool {
        matches!(self.state, SessionState::Reconnecting { retry_at, .. } if now >= retry_at)
    }

    /// Manual disconnect. Terminal for this session: no automatic
    /// reconnect follows, unlike `connection_lost`.
    pub fn disconnect(&mut self) {
        self.state = SessionState::Disconnected;
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, SessionState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            1_700_000_000_000,
            Duration::from_secs(1),
            Duration::from_secs(30),
            3,
        )
    }

    #[test]
    fn happy_path_connect() {
        let mut s = session();
        assert_eq!(*s.state(), SessionState::Disconnected);
        s.begin_connect();
        assert_eq!(*s.state(), SessionState::Connecting);
        s.connect_succeeded();
        assert_eq!(*s.state(), SessionState::Connected);
    }

    #[test]
    fn manual_disconnect_does_not_reconnect() {
        let mut s = session();
        s.begin_connect();
        s.connect_succeeded();
        s.disconnect();
        assert_eq!(*s.state(), SessionState::Disconnected);
    }

    #[test]
    fn connection_loss_schedules_reconnect_with_backoff() {
        let mut s = session();
        s.begin_connect();
        s.connect_succeeded();
        let now = Instant::now();
        s.connection_lost(now);
        match s.state() {
            SessionState::Reconnecting { retry_count, retry_at } => {
                assert_eq!(*retry_count, 0);
                assert!(*retry_at >= now + Duration::from_secs(1));
            }
            other => panic!("expected Reconnecting, got {other:?}"),
        }
    }

    #[test]
    fn exhausting_retries_reaches_failed() {
        let mut s = session();
        let now = Instant::now();
        s.connect_failed(now); // retry_count 0 -> Reconnecting
        s.reconnect_failed(now); // retry_count 1
        s.reconnect_failed(now); // retry_count 2
        s.reconnect_failed(now); // retry_count 3 == max_retries -> Failed
        assert_eq!(*s.state(), SessionState::Failed);
        assert!(s.is_terminal());
    }

    #[test]
    fn session_id_is_stable_across_reconnects() {
        let mut s = session();
        let id = s.session_id().to_string();
        s.begin_connect();
        s.connect_succeeded();
        s.connection_lost(Instant::now());
        assert_eq!(s.session_id(), id);
    }

    #[test]
    fn failed_session_can_be_manually_retried() {
        let mut s = session();
        let now = Instant::now();
        s.connect_failed(now);
        s.reconnect_failed(now);
        s.reconnect_failed(now);
        s.reconnect_failed(now);
        assert_eq!(*s.state(), SessionState::Failed);
        s.begin_connect();
        assert_eq!(*s.state(), SessionState::Connecting);
    }
}
