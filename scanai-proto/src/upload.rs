use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};

use crate::error::{ProtoError, ProtoResult};

/// A frame ready to be uploaded: the fixed binary layout described in
/// the wire protocol (`token_len|token|session_id_len|session_id|
/// sequence|width|height|format_len|format|payload`), big-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub token: String,
    pub session_id: String,
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub payload: Vec<u8>,
}

fn check_len(field: &'static str, s: &str) -> ProtoResult<u8> {
    let len = s.as_bytes().len();
    if len > u8::MAX as usize {
        return Err(ProtoError::FieldTooLong { field });
    }
    Ok(len as u8)
}

impl UploadRecord {
    /// Encodes this record as the fixed binary upload body. Returns
    /// `FieldTooLong` (and drops the frame, per the codec contract)
    /// if any length-prefixed field exceeds 255 bytes.
    pub fn encode(&self) -> ProtoResult<Vec<u8>> {
        let token_len = check_len("token", &self.token)?;
        let session_id_len = check_len("session_id", &self.session_id)?;
        let format_len = check_len("format", &self.format)?;

        let mut buf = Vec::with_capacity(
            1 + self.token.len() + 1 + self.session_id.len() + 8 + 4 + 4 + 1 + self.format.len()
                + self.payload.len(),
        );
        buf.write_u8(token_len).unwrap();
        buf.extend_from_slice(self.token.as_bytes());
        buf.write_u8(session_id_len).unwrap();
        buf.extend_from_slice(self.session_id.as_bytes());
        buf.write_u64::<BigEndian>(self.sequence).unwrap();
        buf.write_u32::<BigEndian>(self.width).unwrap();
        buf.write_u32::<BigEndian>(self.height).unwrap();
        buf.write_u8(format_len).unwrap();
        buf.extend_from_slice(self.format.as_bytes());
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Decodes a binary upload body, recovering the exact
    /// `(token, session_id, sequence, width, height, format, payload)`
    /// tuple that was encoded.
    pub fn decode(buf: &[u8]) -> ProtoResult<Self> {
        let mut cur = Cursor::new(buf);

        let token = read_lp_string(&mut cur, "token")?;
        let session_id = read_lp_string(&mut cur, "session_id")?;
        let sequence = read_u64(&mut cur)?;
        let width = read_u32(&mut cur)?;
        let height = read_u32(&mut cur)?;
        let format = read_lp_string(&mut cur, "format")?;

        let mut payload = Vec::new();
        cur.read_to_end(&mut payload)
            .map_err(|e| ProtoError::DecodeError(e.to_string()))?;

        Ok(UploadRecord {
            token,
            session_id,
            sequence,
            width,
            height,
            format,
            payload,
        })
    }
}

fn read_u8(cur: &mut Cursor<&[u8]>) -> ProtoResult<u8> {
    cur.read_u8().map_err(|_| ProtoError::Truncated {
        needed: 1,
        have: remaining(cur),
    })
}

fn read_u32(cur: &mut Cursor<&[u8]>) -> ProtoResult<u32> {
    cur.read_u32::<BigEndian>().map_err(|_| ProtoError::Truncated {
        needed: 4,
        have: remaining(cur),
    })
}

fn read_u64(cur: &mut Cursor<&[u8]>) -> ProtoResult<u64> {
    cur.read_u64::<BigEndian>().map_err(|_| ProtoError::Truncated {
        needed: 8,
        have: remaining(cur),
    })
}

fn remaining(cur: &Cursor<&[u8]>) -> usize {
    (cur.get_ref().len() as u64 - cur.position()) as usize
}

fn read_lp_string(cur: &mut Cursor<&[u8]>, field: &'static str) -> ProtoResult<String> {
    let len = read_u8(cur)? as usize;
    let mut bytes = vec![0u8; len];
    cur.read_exact(&mut bytes)
        .map_err(|_| ProtoError::Truncated {
            needed: len,
            have: remaining(cur) + len,
        })?;
    String::from_utf8(bytes).map_err(|_| ProtoError::InvalidUtf8 { field })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UploadRecord {
        UploadRecord {
            token: "tok".into(),
            session_id: "sess-1".into(),
            sequence: 42,
            width: 1280,
            height: 720,
            format: "jpeg".into(),
            payload: vec![1, 2, 3, 4, 5],
        }
    }

    #[test]
    fn round_trips_exactly() {
        let rec = sample();
        let bytes = rec.encode().unwrap();
        let decoded = UploadRecord::decode(&bytes).unwrap();
        assert_eq!(rec, decoded);
    }

    #[test]
    fn rejects_oversized_field() {
        let mut rec = sample();
        rec.token = "x".repeat(256);
        assert!(matches!(
            rec.encode(),
            Err(ProtoError::FieldTooLong { field: "token" })
        ));
    }

    #[test]
    fn empty_payload_round_trips() {
        let mut rec = sample();
        rec.payload.clear();
        let bytes = rec.encode().unwrap();
        assert_eq!(UploadRecord::decode(&bytes).unwrap(), rec);
    }

    #[test]
    fn truncated_buffer_errors() {
        let rec = sample();
        let bytes = rec.encode().unwrap();
        let err = UploadRecord::decode(&bytes[..3]).unwrap_err();
        assert!(matches!(err, ProtoError::Truncated { .. }));
    }
}
