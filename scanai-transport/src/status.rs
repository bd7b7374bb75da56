use crate::session::SessionState;

/// Coarse connection state for external consumption (the sibling POS
/// app and any host-app UI), paired with the most recent error text.
/// This is deliberately flatter than `SessionState`: callers outside
/// the pipeline don't need `retry_count`/`retry_at`, just "what's
/// happening right now and why".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub phase: ConnectionPhase,
    pub latest_error: Option<String>,
    pub error_category: Option<ErrorCategory>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// Error categories surfaced to the UI layer, per the error-handling
/// design: transport failures are bucketed into one of these three so
/// a host app can show a sensible message without inspecting the
/// underlying error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    ServerDown,
    NoInternet,
    AppError,
}

impl ConnectionStatus {
    pub fn from_state(state: &SessionState) -> Self {
        let phase = match state {
            SessionState::Disconnected => ConnectionPhase::Disconnected,
            SessionState::Connecting => ConnectionPhase::Connecting,
            SessionState::Connected => ConnectionPhase::Connected,
            SessionState::Reconnecting { .. } => ConnectionPhase::Reconnecting,
            SessionState::Failed => ConnectionPhase::Failed,
        };
        Self {
            phase,
            latest_error: None,
            error_category: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.latest_error = Some(error.into());
        self
    }

    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.error_category = Some(category);
        self
    }

    /// Builds a status carrying both the error text and its classified
    /// category in one call, for the common case where the caller has
    /// an actual `TransportError` in hand (rather than an already
    /// stringified message with no category to derive).
    pub fn from_transport_error(state: &SessionState, error: &crate::error::TransportError) -> Self {
        Self::from_state(state)
            .with_error(error.to_string())
            .with_category(classify(error))
    }
}

/// Classifies a transport error for UI consumption. `Bind`/`Resolve`
/// failures during an otherwise-healthy network read as "server
/// down"; I/O errors are treated as a local connectivity problem
/// unless they carry enough detail to say otherwise; everything else
/// is an application-level error.
pub fn classify(error: &crate::error::TransportError) -> ErrorCategory {
    use crate::error::TransportError;
    match error {
        TransportError::NetworkUnreachable(_) => ErrorCategory::NoInternet,
        TransportError::Bind(_) | TransportError::Resolve(_) => ErrorCategory::ServerDown,
        TransportError::Timeout(_) => ErrorCategory::ServerDown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_every_session_state_to_a_phase() {
        assert_eq!(
            ConnectionStatus::from_state(&SessionState::Disconnected).phase,
            ConnectionPhase::Disconnected
        );
        assert_eq!(
            ConnectionStatus::from_state(&SessionState::Connected).phase,
            ConnectionPhase::Connected
        );
        assert_eq!(
            ConnectionStatus::from_state(&SessionState::Failed).phase,
            ConnectionPhase::Failed
        );
    }

    #[test]
    fn network_unreachable_classifies_as_no_internet() {
        let err = crate::error::TransportError::NetworkUnreachable("down".into());
        assert_eq!(classify(&err), ErrorCategory::NoInternet);
    }

    #[test]
    fn from_transport_error_carries_both_text_and_category() {
        let err = crate::error::TransportError::Resolve("no such host".into());
        let status = ConnectionStatus::from_transport_error(&SessionState::Disconnected, &err);
        assert_eq!(status.error_category, Some(ErrorCategory::ServerDown));
        assert_eq!(status.latest_error.as_deref(), Some(err.to_string().as_str()));
    }
}
