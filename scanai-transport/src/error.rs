use thiserror::Error;

/// Errors surfaced by transport setup or the session state machine.
/// Individual send/receive failures are reported on the error stream
/// rather than returned here — they do not abort the session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),
    #[error("failed to bind local socket: {0}")]
    Bind(#[from] std::io::Error),
    #[error("failed to resolve endpoint: {0}")]
    Resolve(String),
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type TransportResult<T> = Result<T, TransportError>;
