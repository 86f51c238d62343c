//! Dirty range tracking for ring-buffered GPU buffers
//!
//! Every managed buffer has `ring_length` GPU copies and frame `N` writes
//! copy `N % ring_length`. That copy last received data `ring_length` frames
//! ago, so besides this frame's writes it is missing whatever the other
//! in-flight frames wrote. The tracker keeps one range per in-flight frame and
//! hands out the union that the copy about to be written needs.
//!
//! Writers extend the current range lock-free from any thread. History
//! bookkeeping (`merge_into_history`, `consume_for_upload`, `advance`) runs on
//! the owning thread between parallel passes.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::gpu::buffer_layouts::calculations::{align_down, align_up};

/// Inclusive index interval of a buffer. `range() == 0` means untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferUpdateRange {
    pub first_index: u32,
    pub last_index: u32,
}

impl Default for BufferUpdateRange {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl BufferUpdateRange {
    pub const EMPTY: Self = Self {
        first_index: u32::MAX,
        last_index: 0,
    };

    pub fn new(first_index: u32, last_index: u32) -> Self {
        debug_assert!(first_index <= last_index);
        Self {
            first_index,
            last_index,
        }
    }

    pub fn single(index: u32) -> Self {
        Self::new(index, index)
    }

    /// Number of indices covered
    #[inline]
    pub fn range(&self) -> u32 {
        if self.first_index > self.last_index {
            0
        } else {
            self.last_index - self.first_index + 1
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.range() == 0
    }

    #[inline]
    pub fn contains(&self, index: u32) -> bool {
        !self.is_empty() && self.first_index <= index && index <= self.last_index
    }

    /// Smallest range covering both
    pub fn union(self, other: Self) -> Self {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        Self {
            first_index: self.first_index.min(other.first_index),
            last_index: self.last_index.max(other.last_index),
        }
    }

    /// Remove the part of `self` that `covered` already includes. The result
    /// must stay a single interval, so a `covered` range strictly inside
    /// `self` removes nothing.
    pub fn without(self, covered: Self) -> Self {
        if self.is_empty() || covered.is_empty() {
            return self;
        }
        let low_covered = covered.first_index <= self.first_index;
        let high_covered = covered.last_index >= self.last_index;

        if low_covered && high_covered {
            return Self::EMPTY;
        }
        if low_covered && covered.last_index >= self.first_index {
            return Self::new(covered.last_index + 1, self.last_index);
        }
        if high_covered && covered.first_index <= self.last_index {
            return Self::new(self.first_index, covered.first_index - 1);
        }
        self
    }

    pub fn indices(&self) -> std::ops::Range<u32> {
        if self.is_empty() {
            0..0
        } else {
            self.first_index..self.last_index + 1
        }
    }
}

/// An element range widened so its byte span satisfies a write alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignedWrite {
    /// Elements whose bytes feed the write
    pub elements: BufferUpdateRange,
    /// Aligned byte offset into the buffer
    pub byte_offset: u64,
    /// Aligned byte length. May run past the last element into the buffer's
    /// alignment padding.
    pub byte_len: u64,
}

impl AlignedWrite {
    /// Offset of the write start inside the gathered element bytes
    #[inline]
    pub fn skip_bytes(&self, element_size: u64) -> usize {
        (self.byte_offset - self.elements.first_index as u64 * element_size) as usize
    }
}

/// Widen `range` outward to alignment boundaries: the byte start rounds down
/// and the byte end rounds up, clamped to the padded buffer size. Returns
/// `None` for an empty range.
pub fn align_range(
    range: BufferUpdateRange,
    element_size: u64,
    alignment: u64,
    capacity: u32,
) -> Option<AlignedWrite> {
    if range.is_empty() || capacity == 0 {
        return None;
    }
    debug_assert!(alignment.is_power_of_two());
    let last = range.last_index.min(capacity - 1);
    let padded_size = align_up(capacity as u64 * element_size, alignment);

    let byte_start = align_down(range.first_index as u64 * element_size, alignment);
    let byte_end = align_up((last as u64 + 1) * element_size, alignment).min(padded_size);

    let first_element = (byte_start / element_size) as u32;
    let last_element = ((byte_end + element_size - 1) / element_size - 1).min(capacity as u64 - 1) as u32;

    Some(AlignedWrite {
        elements: BufferUpdateRange::new(first_element, last_element),
        byte_offset: byte_start,
        byte_len: byte_end - byte_start,
    })
}

/// Per-buffer dirty bookkeeping across the frames in flight
#[derive(Debug)]
pub struct DirtyRangeTracker {
    current_first: AtomicU32,
    current_last: AtomicU32,
    /// Highest touched or referenced index plus one; zero when none
    high_water: AtomicU32,
    /// `history[0]` is the frame being built, `history[i]` the frame `i` frames ago
    history: Box<[BufferUpdateRange]>,
    previous_frames: BufferUpdateRange,
    capacity: u32,
}

impl DirtyRangeTracker {
    pub fn new(capacity: u32, ring_length: usize) -> Self {
        Self {
            current_first: AtomicU32::new(u32::MAX),
            current_last: AtomicU32::new(0),
            high_water: AtomicU32::new(0),
            history: vec![BufferUpdateRange::EMPTY; ring_length.max(1)].into_boxed_slice(),
            previous_frames: BufferUpdateRange::EMPTY,
            capacity,
        }
    }

    /// Extend the current range to include `index`
    #[inline]
    pub fn mark_touched(&self, index: u32) {
        debug_assert!(index < self.capacity, "index {} past capacity {}", index, self.capacity);
        self.current_first.fetch_min(index, Ordering::AcqRel);
        self.current_last.fetch_max(index, Ordering::AcqRel);
        self.note_referenced(index);
    }

    pub fn mark_range(&self, range: BufferUpdateRange) {
        if range.is_empty() {
            return;
        }
        debug_assert!(range.last_index < self.capacity);
        self.current_first.fetch_min(range.first_index, Ordering::AcqRel);
        self.current_last.fetch_max(range.last_index, Ordering::AcqRel);
        self.note_referenced(range.last_index);
    }

    /// Raise the high-water mark for an index the GPU reads this frame
    /// without it being rewritten
    #[inline]
    pub fn note_referenced(&self, index: u32) {
        self.high_water.fetch_max(index.saturating_add(1), Ordering::AcqRel);
    }

    /// Range written since the last consume
    pub fn current(&self) -> BufferUpdateRange {
        BufferUpdateRange {
            first_index: self.current_first.load(Ordering::Acquire),
            last_index: self.current_last.load(Ordering::Acquire),
        }
        .normalized()
    }

    /// Older in-flight ranges still owed to the copy being written
    pub fn previous_frames(&self) -> BufferUpdateRange {
        self.previous_frames
    }

    pub fn history(&self) -> &[BufferUpdateRange] {
        &self.history
    }

    pub fn ring_length(&self) -> usize {
        self.history.len()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn high_water_mark(&self) -> Option<u32> {
        match self.high_water.load(Ordering::Acquire) {
            0 => None,
            n => Some(n - 1),
        }
    }

    /// Fold the current range into this frame's history slot and trim the
    /// previous-frames range by what this frame already rewrites.
    pub fn merge_into_history(&mut self) {
        let current = self.current();
        self.history[0] = self.history[0].union(current);
        self.previous_frames = self.previous_frames.without(self.history[0]);
    }

    /// Take everything that must be uploaded now and drain it
    pub fn consume_for_upload(&mut self) -> BufferUpdateRange {
        let upload = self.current().union(self.previous_frames);
        self.current_first.store(u32::MAX, Ordering::Release);
        self.current_last.store(0, Ordering::Release);
        self.previous_frames = BufferUpdateRange::EMPTY;
        upload
    }

    /// Hand a range back after its upload failed. It is uploaded again from
    /// the next frame on and reaches every copy within `ring_length` frames.
    pub fn requeue(&self, range: BufferUpdateRange) {
        if range.is_empty() {
            return;
        }
        self.current_first.fetch_min(range.first_index, Ordering::AcqRel);
        self.current_last.fetch_max(range.last_index, Ordering::AcqRel);
    }

    /// End of frame: drop the oldest history entry, open an empty one for the
    /// next frame and recompute what the next ring copy is missing.
    ///
    /// Anything this frame's copy did not receive (marks after the last
    /// consume, requeued ranges, or a frame that never consumed) carries over
    /// as the next frame's current range.
    pub fn advance(&mut self) {
        let carried = self.current().union(self.previous_frames);

        self.history.rotate_right(1);
        self.history[0] = BufferUpdateRange::EMPTY;
        self.previous_frames = self.history[1..]
            .iter()
            .fold(BufferUpdateRange::EMPTY, |acc, r| acc.union(*r));

        self.current_first.store(carried.first_index, Ordering::Release);
        self.current_last.store(carried.last_index, Ordering::Release);
        self.high_water.store(0, Ordering::Release);
    }
}

impl BufferUpdateRange {
    #[inline]
    fn normalized(self) -> Self {
        if self.first_index > self.last_index {
            Self::EMPTY
        } else {
            self
        }
    }
}
