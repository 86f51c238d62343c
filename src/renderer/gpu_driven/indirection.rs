use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{slot_out_of_range, PoolKind, SyncResult};
use crate::gpu::buffer_layouts::IndirectionEntry;
use crate::memory::{BufferUpdateRange, DirtyRangeTracker};

use super::identity::ObjectId;

/// Object identity to {transform slot, material slot, selection flags}.
///
/// Entries are packed into one atomic word each, so parallel tasks update
/// their objects without a table lock. An entry is only marked dirty when its
/// value actually changes.
pub struct IndirectionTable {
    entries: Box<[AtomicU64]>,
    dirty: DirtyRangeTracker,
    capacity: u32,
}

impl IndirectionTable {
    pub fn new(capacity: u32, ring_length: usize) -> Self {
        let invalid = IndirectionEntry::INVALID.to_bits();
        Self {
            entries: (0..capacity).map(|_| AtomicU64::new(invalid)).collect(),
            dirty: DirtyRangeTracker::new(capacity, ring_length),
            capacity,
        }
    }

    pub fn get(&self, id: ObjectId) -> Option<IndirectionEntry> {
        self.entries
            .get(id.0 as usize)
            .map(|bits| IndirectionEntry::from_bits(bits.load(Ordering::Acquire)))
    }

    /// Point `id` at this frame's transform slot. Returns whether the entry changed.
    pub fn update_transform(&self, id: ObjectId, transform_slot: u32, selection_flags: u8) -> SyncResult<bool> {
        self.update(id, |entry| IndirectionEntry {
            transform_slot,
            selection_flags,
            ..entry
        })
    }

    /// Point `id` at its material slot. Returns whether the entry changed.
    pub fn update_material(&self, id: ObjectId, material_slot: u16) -> SyncResult<bool> {
        self.update(id, |entry| IndirectionEntry {
            material_slot,
            ..entry
        })
    }

    fn update(&self, id: ObjectId, f: impl Fn(IndirectionEntry) -> IndirectionEntry) -> SyncResult<bool> {
        let cell = self
            .entries
            .get(id.0 as usize)
            .ok_or_else(|| slot_out_of_range(PoolKind::Identity, id.0, self.capacity))?;

        let changed = cell
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                let next = f(IndirectionEntry::from_bits(bits)).to_bits();
                (next != bits).then_some(next)
            })
            .is_ok();

        if changed {
            self.dirty.mark_touched(id.0);
        } else {
            self.dirty.note_referenced(id.0);
        }
        Ok(changed)
    }

    /// Entry bytes for `range`, in identity order
    pub fn gather_bytes(&self, range: BufferUpdateRange) -> Vec<u8> {
        let entries: Vec<IndirectionEntry> = range
            .indices()
            .take_while(|&i| i < self.capacity)
            .map(|i| IndirectionEntry::from_bits(self.entries[i as usize].load(Ordering::Acquire)))
            .collect();
        bytemuck::cast_slice(&entries).to_vec()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn dirty(&self) -> &DirtyRangeTracker {
        &self.dirty
    }

    pub fn dirty_mut(&mut self) -> &mut DirtyRangeTracker {
        &mut self.dirty
    }
}
