use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Proto(#[from] scanai_proto::ProtoError),
    #[error(transparent)]
    Transport(#[from] scanai_transport::TransportError),
    #[error(transparent)]
    Encode(#[from] crate::collaborators::EncodeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("session reconnect attempts exhausted")]
    SessionFailed,
}
