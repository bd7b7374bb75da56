use scanai_proto::ResponseRecord;

use crate::flat_map::FlatMap;

/// Errors from Display Sync's safety valve. Not user-visible failures
/// — `Overflow` is a recovery action the supervisor only logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DisplaySyncError {
    #[error("display buffer overflow, cleared {entries} pending entries")]
    Overflow { entries: usize },
}

/// Key used to locate the producing frame for a response: prefers the
/// numeric `frame_sequence`, falls back to the string `frame_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FrameKey {
    Sequence(u64),
    Id(String),
}

/// Maintains an insertion-ordered `sequence -> encoded_bytes` buffer
/// and releases the exact frame that produced each detection
/// response, eliminating bounding-box drift between capture and
/// overlay render.
pub struct DisplaySync {
    by_sequence: FlatMap<u64, Vec<u8>>,
    by_id: FlatMap<String, u64>,
    max_buffer: usize,
    current_display_frame: Option<Vec<u8>>,
    misses: u64,
    overflows: u64,
}

impl DisplaySync {
    pub fn new(max_buffer: usize) -> Self {
        Self {
            by_sequence: FlatMap::new(),
            by_id: FlatMap::new(),
            max_buffer,
            current_display_frame: None,
            misses: 0,
            overflows: 0,
        }
    }

    pub fn current_display_frame(&self) -> Option<&[u8]> {
        self.current_display_frame.as_deref()
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    pub fn pending_len(&self) -> usize {
        self.by_sequence.len()
    }

    /// Inserts a newly admitted-and-sent frame. `frame_id` is an
    /// optional server-visible identifier some deployments echo back
    /// instead of (or in addition to) `sequence`.
    pub fn insert(&mut self, sequence: u64, frame_id: Option<String>, encoded_bytes: Vec<u8>) -> Result<(), DisplaySyncError> {
        self.by_sequence.insert(sequence, encoded_bytes);
        if let Some(id) = frame_id {
            self.by_id.insert(id, sequence);
        }

        if self.by_sequence.len() > self.max_buffer {
            let entries = self.by_sequence.len();
            self.by_sequence.clear();
            self.by_id.clear();
            self.current_display_frame = None;
            self.overflows += 1;
            return Err(DisplaySyncError::Overflow { entries });
        }
        Ok(())
    }

    fn resolve_key(&self, response: &ResponseRecord) -> Option<FrameKey> {
        if let Some(seq) = response.frame_sequence {
            return Some(FrameKey::Sequence(seq));
        }
        response.frame_id.clone().map(FrameKey::Id)
    }

    /// Processes a detection response: locates the producing frame,
    /// releases it as the current display frame, and evicts it plus
    /// every entry inserted before it. If the key cannot be located
    /// the previous display frame is left untouched (frozen) and a
    /// miss is recorded.
    pub fn on_response(&mut self, response: &ResponseRecord) {
        let Some(key) = self.resolve_key(response) else {
            self.misses += 1;
            return;
        };

        let sequence = match key {
            FrameKey::Sequence(seq) => Some(seq),
            FrameKey::Id(id) => self.by_id.get(&id).copied(),
        };

        let Some(sequence) = sequence else {
            self.misses += 1;
            return;
        };

        match self.by_sequence.remove_through(&sequence) {
            Some(bytes) => {
                self.current_display_frame = Some(bytes);
            }
            None => {
                self.misses += 1;
            }
        }
    }
}
