use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A shared memory budget for in-flight reassembly state.
///
/// Bounds how much a burst of malformed or abandoned partial messages
/// can cost in memory before the reassembly table starts refusing new
/// fragments, independent of the 5-second eviction timer.
#[derive(Debug)]
pub struct ReassemblyQuota {
    max_bytes: usize,
    used_bytes: Arc<AtomicUsize>,
}

impl Clone for ReassemblyQuota {
    fn clone(&self) -> Self {
        Self {
            max_bytes: self.max_bytes,
            used_bytes: Arc::clone(&self.used_bytes),
        }
    }
}

impl ReassemblyQuota {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            used_bytes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Attempts to reserve `amount` bytes. Returns `false` (reservation
    /// refused) without mutating state if it would exceed the quota.
    pub fn reserve(&self, amount: usize) -> bool {
        loop {
            let current = self.used_bytes.load(Ordering::Relaxed);
            if current + amount > self.max_bytes {
                return false;
            }
            if self
                .used_bytes
                .compare_exchange(current, current + amount, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }

    pub fn release(&self, amount: usize) {
        loop {
            let current = self.used_bytes.load(Ordering::Relaxed);
            let new = current.saturating_sub(amount);
            if self
                .used_bytes
                .compare_exchange(current, new, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break;
            }
        }
    }

    pub fn used(&self) -> usize {
        self.used_bytes.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.max_bytes
    }
}
