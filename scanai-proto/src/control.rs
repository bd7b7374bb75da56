use serde::{Deserialize, Serialize};

/// Keepalive record sent at the session's configured heartbeat
/// cadence to maintain NAT state. Distinct from upload records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Heartbeat {
    #[serde(rename = "type")]
    pub kind: HeartbeatKind,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatKind {
    Heartbeat,
}

impl Heartbeat {
    pub fn new(timestamp_ms: i64, token: Option<String>) -> Self {
        Self {
            kind: HeartbeatKind::Heartbeat,
            timestamp: timestamp_ms,
            token,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
