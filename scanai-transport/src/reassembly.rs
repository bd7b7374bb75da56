use std::collections::HashMap;
use std::time::{Duration, Instant};

use scanai_proto::FragmentEnvelope;

use crate::quota::ReassemblyQuota;

struct ReassemblySlot {
    total_chunks: u16,
    chunks: Vec<Option<Vec<u8>>>,
    received_count: u16,
    reserved_bytes: usize,
    first_seen: Instant,
}

impl ReassemblySlot {
    fn new(total_chunks: u16, first_seen: Instant) -> Self {
        Self {
            total_chunks,
            chunks: vec![None; total_chunks as usize],
            received_count: 0,
            reserved_bytes: 0,
            first_seen,
        }
    }

    fn is_complete(&self) -> bool {
        self.received_count == self.total_chunks
    }

    fn assemble(self) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in self.chunks.into_iter() {
            out.extend_from_slice(&chunk.expect("assemble called before completion"));
        }
        out
    }
}

/// Counters recorded by the reassembly table, surfaced on the
/// metrics stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyMetrics {
    pub completed: u64,
    pub evicted: u64,
    pub quota_rejected: u64,
    pub malformed_dropped: u64,
}

/// Reassembles fragmented inbound messages, keyed by sender-assigned
/// `message_id`. A slot exists only while partial: it is removed the
/// instant it completes or is evicted for staleness.
pub struct ReassemblyTable {
    slots: HashMap<u64, ReassemblySlot>,
    quota: ReassemblyQuota,
    timeout: Duration,
    metrics: ReassemblyMetrics,
}

impl ReassemblyTable {
    pub fn new(quota: ReassemblyQuota, timeout: Duration) -> Self {
        Self {
            slots: HashMap::new(),
            quota,
            timeout,
            metrics: ReassemblyMetrics::default(),
        }
    }

    pub fn metrics(&self) -> ReassemblyMetrics {
        self.metrics
    }

    /// Parses and ingests one inbound datagram. Datagrams shorter than
    /// the envelope header are silently dropped (not even counted as
    /// malformed — they are noise, not protocol violations).
    pub fn ingest_datagram(&mut self, datagram: &[u8], now: Instant) -> Option<Vec<u8>> {
        let envelope = FragmentEnvelope::decode(datagram)?;
        self.ingest(envelope, now)
    }

    /// Ingests an already-parsed envelope. Returns the reassembled
    /// payload once every chunk has arrived.
    pub fn ingest(&mut self, envelope: FragmentEnvelope, now: Instant) -> Option<Vec<u8>> {
        if envelope.total_chunks == 0 || envelope.chunk_index >= envelope.total_chunks {
            self.metrics.malformed_dropped += 1;
            return None;
        }

        let chunk_len = envelope.chunk_body.len();
        if !self.quota.reserve(chunk_len) {
            self.metrics.quota_rejected += 1;
            return None;
        }

        let slot = self
            .slots
            .entry(envelope.message_id)
            .or_insert_with(|| ReassemblySlot::new(envelope.total_chunks, now));

        let index = envelope.chunk_index as usize;
        if slot.chunks[index].is_some() {
            // Duplicate chunk (retransmitted or replayed datagram): drop
            // the redundant copy and give the quota reservation back.
            self.quota.release(chunk_len);
            return None;
        }

        slot.chunks[index] = Some(envelope.chunk_body);
        slot.received_count += 1;
        slot.reserved_bytes += chunk_len;

        if slot.is_complete() {
            let slot = self.slots.remove(&envelope.message_id).unwrap();
            self.quota.release(slot.reserved_bytes);
            self.metrics.completed += 1;
            Some(slot.assemble())
        } else {
            None
        }
    }

    /// Evicts every partial slot older than the configured timeout.
    /// Called on a timer, or opportunistically alongside each
    /// emission, per the reassembly contract.
    pub fn evict_stale(&mut self, now: Instant) -> usize {
        let timeout = self.timeout;
        let quota = &self.quota;
        let before = self.slots.len();
        self.slots.retain(|_, slot| {
            let stale = now.duration_since(slot.first_seen) >= timeout;
            if stale {
                quota.release(slot.reserved_bytes);
            }
            !stale
        });
        let evicted = before - self.slots.len();
        self.metrics.evicted += evicted as u64;
        evicted
    }

    pub fn pending_slots(&self) -> usize {
        self.slots.len()
    }
}
