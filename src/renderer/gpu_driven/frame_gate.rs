use parking_lot::RwLock;
use rustc_hash::FxHashSet;

use super::identity::ObjectId;

/// Per-frame "process once" gate.
///
/// Bins may contain the same object more than once and are processed by
/// parallel tasks. The first caller to claim an object this frame gets `true`,
/// every later caller gets `false` until `clear`.
#[derive(Debug, Default)]
pub struct FrameOnceGate {
    processed: RwLock<FxHashSet<u32>>,
}

impl FrameOnceGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut set = FxHashSet::default();
        set.reserve(capacity);
        Self {
            processed: RwLock::new(set),
        }
    }

    /// Claim `id` for this frame
    pub fn try_claim(&self, id: ObjectId) -> bool {
        // Shared fast path: already processed.
        if self.processed.read().contains(&id.0) {
            return false;
        }
        // Exclusive path; `insert` re-checks under the write lock.
        self.processed.write().insert(id.0)
    }

    pub fn is_claimed(&self, id: ObjectId) -> bool {
        self.processed.read().contains(&id.0)
    }

    pub fn claimed_count(&self) -> usize {
        self.processed.read().len()
    }

    pub fn clear(&mut self) {
        self.processed.get_mut().clear();
    }
}
