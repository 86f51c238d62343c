/// Transform Staging Area
///
/// Per-frame scratch pool of transform records. Slots are handed out while
/// the transform pass runs, referenced from the indirection table and all
/// returned at end of frame once the upload has been queued.

use parking_lot::Mutex;

use crate::error::{slot_out_of_range, PoolKind, SyncError, SyncResult};
use crate::gpu::buffer_layouts::TransformRecord;
use crate::memory::{BufferUpdateRange, DirtyRangeTracker, SlotFreeList};

use super::frame_gate::FrameOnceGate;
use super::identity::ObjectId;

pub struct TransformStagingArea {
    free: Mutex<SlotFreeList>,
    /// Each slot is written by the task that acquired it
    records: Box<[Mutex<TransformRecord>]>,
    processed: FrameOnceGate,
    dirty: DirtyRangeTracker,
    capacity: u32,
}

impl TransformStagingArea {
    pub fn new(capacity: u32, ring_length: usize) -> Self {
        let records = (0..capacity)
            .map(|_| Mutex::new(TransformRecord::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            free: Mutex::new(SlotFreeList::new(capacity)),
            records,
            processed: FrameOnceGate::with_capacity(capacity as usize),
            dirty: DirtyRangeTracker::new(capacity, ring_length),
            capacity,
        }
    }

    /// Take a slot for this frame
    pub fn acquire_slot(&self) -> SyncResult<u32> {
        self.free
            .lock()
            .acquire()
            .ok_or(SyncError::PoolExhausted {
                capacity: self.capacity,
            })
    }

    /// Store a record and mark the slot for upload
    pub fn write(&self, slot: u32, record: &TransformRecord) -> SyncResult<()> {
        let cell = self
            .records
            .get(slot as usize)
            .ok_or_else(|| slot_out_of_range(PoolKind::Transform, slot, self.capacity))?;
        *cell.lock() = *record;
        self.dirty.mark_touched(slot);
        Ok(())
    }

    pub fn read(&self, slot: u32) -> SyncResult<TransformRecord> {
        self.records
            .get(slot as usize)
            .map(|cell| *cell.lock())
            .ok_or_else(|| slot_out_of_range(PoolKind::Transform, slot, self.capacity))
    }

    /// True for the first caller asking about `id` this frame
    pub fn node_needs_update(&self, id: ObjectId) -> bool {
        self.processed.try_claim(id)
    }

    /// Record bytes for `range`, in slot order
    pub fn gather_bytes(&self, range: BufferUpdateRange) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(range.range() as usize * std::mem::size_of::<TransformRecord>());
        for slot in range.indices().take_while(|&s| s < self.capacity) {
            let record = *self.records[slot as usize].lock();
            bytes.extend_from_slice(bytemuck::bytes_of(&record));
        }
        bytes
    }

    /// Refill the slot pool and forget this frame's processed objects. Only
    /// call once the frame's upload has been queued.
    pub fn reset_for_new_frame(&mut self) {
        self.free.get_mut().reset();
        self.processed.clear();
    }

    pub fn acquired_count(&self) -> u32 {
        self.free.lock().in_use()
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
