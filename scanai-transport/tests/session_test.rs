use std::time::{Duration, Instant};

use scanai_transport::{Session, SessionState};

fn session_with(max_retries: u32) -> Session {
    Session::new(
        1_700_000_000_000,
        Duration::from_millis(50),
        Duration::from_secs(5),
        max_retries,
    )
}

#[test]
fn backoff_grows_across_successive_reconnect_failures() {
    let mut s = session_with(5);
    let now = Instant::now();
    s.connect_failed(now);
    let first_delay = match s.state() {
        SessionState::Reconnecting { retry_at, .. } => *retry_at - now,
        other => panic!("expected Reconnecting, got {other:?}"),
    };

    s.reconnect_failed(now);
    let second_delay = match s.state() {
        SessionState::Reconnecting { retry_at, .. } => *retry_at - now,
        other => panic!("expected Reconnecting, got {other:?}"),
    };

    assert!(second_delay > first_delay);
}

#[test]
fn zero_max_retries_fails_on_first_attempt() {
    let mut s = session_with(0);
    let now = Instant::now();
    s.connect_failed(now);
    assert!(s.is_terminal());
}

#[test]
fn reconnect_due_reflects_the_scheduled_retry_time() {
    let mut s = session_with(3);
    let now = Instant::now();
    s.connect_failed(now);
    assert!(!s.reconnect_due(now));
    assert!(s.reconnect_due(now + Duration::from_secs(10)));
}
