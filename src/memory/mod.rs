/// CPU-side bookkeeping for GPU-resident buffers
///
/// Slot free-lists for fixed-capacity pools and dirty range tracking for
/// buffers with several copies in flight.

pub mod dirty_range;
pub mod free_list;

pub use dirty_range::{align_range, AlignedWrite, BufferUpdateRange, DirtyRangeTracker};
pub use free_list::SlotFreeList;
