use thiserror::Error;

/// Errors surfaced by the wire protocol layer.
///
/// Variants map directly onto the error kinds named in the pipeline's
/// error handling design: malformed or oversized records are rejected
/// here before they ever reach the transport or the session.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("field exceeds 255 bytes: {field}")]
    FieldTooLong { field: &'static str },
    #[error("buffer too short: need at least {needed} bytes, have {have}")]
    Truncated { needed: usize, have: usize },
    #[error("invalid UTF-8 in field: {field}")]
    InvalidUtf8 { field: &'static str },
    #[error("decode error: {0}")]
    DecodeError(String),
    #[error("auth expired: {0}")]
    AuthExpired(String),
}

pub type ProtoResult<T> = Result<T, ProtoError>;
