use serde::Deserialize;

use crate::class_table::ClassTable;
use crate::error::{ProtoError, ProtoResult};

/// Substrings that, when found in a server `message`/`error` field,
/// mean the session's token has been rejected and must be torn down.
pub const AUTH_FAILURE_SUBSTRINGS: &[&str] = &[
    "Unauthorized",
    "token is expired",
    "token has invalid claims",
];

#[derive(Debug, Clone, PartialEq)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f64,
    pub bbox: BBox,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseRecord {
    pub success: bool,
    pub frame_sequence: Option<u64>,
    pub frame_id: Option<String>,
    pub objects: Vec<Detection>,
    pub processing_time_ms: Option<i64>,
    pub buffer_size: Option<u64>,
}

/// Outcome of decoding one server payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    Response(ResponseRecord),
    /// The server reported the session's token as rejected; carries
    /// the matched substring's containing message for diagnostics.
    AuthExpired(String),
}

#[derive(Debug, Deserialize)]
struct BBoxWire {
    x_min: f64,
    y_min: f64,
    x_max: f64,
    y_max: f64,
}

impl From<BBoxWire> for BBox {
    fn from(w: BBoxWire) -> Self {
        BBox {
            x: w.x_min,
            y: w.y_min,
            w: w.x_max - w.x_min,
            h: w.y_max - w.y_min,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DetectionWire {
    class_name: String,
    confidence: f64,
    bbox: BBoxWire,
}

#[derive(Debug, Deserialize)]
struct AiResultsWire {
    #[serde(default)]
    detections: Vec<DetectionWire>,
}

#[derive(Debug, Deserialize)]
struct ResponseWire {
    #[serde(default)]
    success: bool,
    frame_id: Option<String>,
    frame_sequence: Option<u64>,
    ai_results: Option<AiResultsWire>,
    processing_time_ms: Option<i64>,
    buffer_size: Option<u64>,
    message: Option<String>,
    error: Option<String>,
}

fn auth_failure_message(wire_value: &serde_json::Value) -> Option<String> {
    for field in ["message", "error"] {
        if let Some(text) = wire_value.get(field).and_then(|v| v.as_str()) {
            if AUTH_FAILURE_SUBSTRINGS
                .iter()
                .any(|needle| text.contains(needle))
            {
                return Some(text.to_string());
            }
        }
    }
    None
}

/// Decodes one server payload: UTF-8 JSON carrying either a detection
/// response or an auth-failure indicator. Maps server object records
/// to display labels using `class_table`; unknown class ids pass
/// through untouched. Malformed or partial payloads that are not an
/// auth failure surface as `DecodeError`.
pub fn decode_response(bytes: &[u8], class_table: &ClassTable) -> ProtoResult<ResponseOutcome> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| ProtoError::DecodeError(e.to_string()))?;

    if let Some(message) = auth_failure_message(&value) {
        return Ok(ResponseOutcome::AuthExpired(message));
    }

    let wire: ResponseWire =
        serde_json::from_value(value).map_err(|e| ProtoError::DecodeError(e.to_string()))?;

    let objects = wire
        .ai_results
        .map(|ai| ai.detections)
        .unwrap_or_default()
        .into_iter()
        .map(|d| Detection {
            class_name: class_table.label_for(&d.class_name),
            confidence: d.confidence,
            bbox: d.bbox.into(),
        })
        .collect();

    Ok(ResponseOutcome::Response(ResponseRecord {
        success: wire.success,
        frame_sequence: wire.frame_sequence,
        frame_id: wire.frame_id,
        objects,
        processing_time_ms: wire.processing_time_ms,
        buffer_size: wire.buffer_size,
    }))
}
