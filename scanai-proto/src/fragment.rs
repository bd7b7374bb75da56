use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::error::ProtoError;

/// 12-byte header prefixing every datagram chunk: sender-assigned
/// message id, this chunk's index, and the total chunk count.
pub const ENVELOPE_HEADER_LEN: usize = 12;

/// Conservative path-MTU budget for a single datagram payload.
pub const MAX_ENVELOPE_BYTES: usize = 1400;

/// Largest chunk body that still keeps a full envelope within budget.
pub const MAX_BODY_BYTES: usize = MAX_ENVELOPE_BYTES - ENVELOPE_HEADER_LEN;

/// `message_id` is sender-assigned and monotonically increasing modulo
/// 2^53, so it stays exactly representable as an IEEE-754 double
/// across language boundaries.
pub const MESSAGE_ID_MODULUS: u64 = 1 << 53;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentEnvelope {
    pub message_id: u64,
    pub chunk_index: u16,
    pub total_chunks: u16,
    pub chunk_body: Vec<u8>,
}

impl FragmentEnvelope {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ENVELOPE_HEADER_LEN + self.chunk_body.len());
        buf.write_u64::<BigEndian>(self.message_id).unwrap();
        buf.write_u16::<BigEndian>(self.chunk_index).unwrap();
        buf.write_u16::<BigEndian>(self.total_chunks).unwrap();
        buf.extend_from_slice(&self.chunk_body);
        buf
    }

    /// Parses an inbound datagram. Per the reassembly contract, a
    /// datagram shorter than the 12-byte header is not an error — the
    /// caller silently drops it.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < ENVELOPE_HEADER_LEN {
            return None;
        }
        let mut cur = Cursor::new(buf);
        let message_id = cur.read_u64::<BigEndian>().ok()?;
        let chunk_index = cur.read_u16::<BigEndian>().ok()?;
        let total_chunks = cur.read_u16::<BigEndian>().ok()?;
        let chunk_body = buf[ENVELOPE_HEADER_LEN..].to_vec();
        Some(FragmentEnvelope {
            message_id,
            chunk_index,
            total_chunks,
            chunk_body,
        })
    }
}

/// Splits an already-framed payload into a sequence of fragment
/// envelopes sharing one `message_id`, each within the MTU budget.
/// An empty payload still produces exactly one (empty-body) chunk, so
/// zero-length messages round-trip like any other.
pub fn fragment(payload: &[u8], message_id: u64) -> Result<Vec<FragmentEnvelope>, ProtoError> {
    let total_chunks = payload.len().div_ceil(MAX_BODY_BYTES).max(1);
    if total_chunks > u16::MAX as usize {
        return Err(ProtoError::DecodeError(format!(
            "payload too large to fragment: {total_chunks} chunks"
        )));
    }
    let mut chunks = Vec::with_capacity(total_chunks);
    for (index, body) in payload.chunks(MAX_BODY_BYTES.max(1)).enumerate() {
        chunks.push(FragmentEnvelope {
            message_id,
            chunk_index: index as u16,
            total_chunks: total_chunks as u16,
            chunk_body: body.to_vec(),
        });
    }
    if chunks.is_empty() {
        chunks.push(FragmentEnvelope {
            message_id,
            chunk_index: 0,
            total_chunks: 1,
            chunk_body: Vec::new(),
        });
    }
    Ok(chunks)
}

/// Next message id in the sender's monotonically increasing,
/// 2^53-wrapping sequence.
pub fn next_message_id(current: u64) -> u64 {
    (current + 1) % MESSAGE_ID_MODULUS
}
