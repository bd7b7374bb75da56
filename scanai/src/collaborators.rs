//! External collaborators the core pipeline consumes from but does
//! not own: the native camera driver, the native encoder, credential
//! storage, and the host app's logging sink. Production embeddings
//! implement these traits against platform APIs; this binary supplies
//! small stand-ins so the workspace has a runnable demo surface.

use std::time::Instant;

use async_trait::async_trait;

/// One camera frame's metadata, ahead of any admission decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMetadata {
    pub frame_id: u64,
    pub mean_y: f64,
    pub captured_at: Instant,
}

/// Supplies the next frame's metadata. Implemented by the native
/// camera driver in a real embedding.
#[async_trait]
pub trait FrameMetadataSource: Send + Sync {
    async fn next_frame(&mut self) -> Option<FrameMetadata>;
}

#[derive(Debug, thiserror::Error)]
#[error("encode failed: {0}")]
pub struct EncodeError(pub String);

/// Encodes a frame on demand. Only called for frames the Throttler
/// admits, since encoding is the expensive step this pipeline exists
/// to ration.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(&self, frame_id: u64) -> Result<Vec<u8>, EncodeError>;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn format(&self) -> &str;
}

/// Supplies the current session auth token, if any. Absence is not an
/// error: the session logs it and sends the record anyway, per the
/// token-injection contract.
pub trait AuthTokenProvider: Send + Sync {
    fn current_token(&self) -> Option<String>;
}

/// A synthetic camera source producing frames on a fixed cadence with
/// a slowly drifting luminance, enough to exercise admission and
/// throttling without real hardware.
pub struct SyntheticCamera {
    next_frame_id: u64,
    mean_y: f64,
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self { next_frame_id: 0, mean_y: 128.0 }
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameMetadataSource for SyntheticCamera {
    async fn next_frame(&mut self) -> Option<FrameMetadata> {
        let frame_id = self.next_frame_id;
        self.next_frame_id += 1;
        self.mean_y = (self.mean_y + 1.0) % 255.0;
        Some(FrameMetadata {
            frame_id,
            mean_y: self.mean_y,
            captured_at: Instant::now(),
        })
    }
}

/// Produces a fixed-size filler payload instead of a real JPEG,
/// enough to exercise fragmentation and the wire codec end to end.
pub struct FillerEncoder {
    width: u32,
    height: u32,
    payload_len: usize,
}

impl FillerEncoder {
    pub fn new(width: u32, height: u32, payload_len: usize) -> Self {
        Self { width, height, payload_len }
    }
}

#[async_trait]
impl Encoder for FillerEncoder {
    async fn encode(&self, _frame_id: u64) -> Result<Vec<u8>, EncodeError> {
        Ok(vec![0xAA; self.payload_len])
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> &str {
        "jpeg"
    }
}

/// Always reports the same configured token, or none.
pub struct StaticTokenProvider(pub Option<String>);

impl AuthTokenProvider for StaticTokenProvider {
    fn current_token(&self) -> Option<String> {
        self.0.clone()
    }
}
