//! GPU buffer write primitive
//!
//! The draw command builder never talks to a graphics API directly. Every
//! upload goes through `BufferSink::write_data`, with ranges already widened
//! to `write_alignment()`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::Pod;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::{gpu_write_error, SyncResult};
use crate::gpu::buffer_layouts::{
    COPY_ALIGNMENT, INDIRECTION_ENTRY_SIZE, INDIRECT_INDEXED_COMMAND_SIZE, MATERIAL_DATA_SIZE,
    TRANSFORM_RECORD_SIZE,
};
use crate::renderer::gpu_driven::RenderStage;

/// The four managed buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Commands,
    Transforms,
    Materials,
    Indirection,
}

impl BufferKind {
    pub fn element_size(self) -> u64 {
        match self {
            BufferKind::Commands => INDIRECT_INDEXED_COMMAND_SIZE,
            BufferKind::Transforms => TRANSFORM_RECORD_SIZE,
            BufferKind::Materials => MATERIAL_DATA_SIZE,
            BufferKind::Indirection => INDIRECTION_ENTRY_SIZE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BufferKind::Commands => "commands",
            BufferKind::Transforms => "transforms",
            BufferKind::Materials => "materials",
            BufferKind::Indirection => "indirection",
        }
    }
}

/// One ring copy of one buffer. The command buffer is shared by all stages,
/// so its targets carry no stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferTarget {
    pub stage: Option<RenderStage>,
    pub kind: BufferKind,
    pub ring_index: usize,
}

impl BufferTarget {
    pub fn commands(ring_index: usize) -> Self {
        Self {
            stage: None,
            kind: BufferKind::Commands,
            ring_index,
        }
    }

    pub fn scene(stage: RenderStage, kind: BufferKind, ring_index: usize) -> Self {
        debug_assert!(kind != BufferKind::Commands);
        Self {
            stage: Some(stage),
            kind,
            ring_index,
        }
    }
}

impl fmt::Display for BufferTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{}/{}[{}]", stage.name(), self.kind.name(), self.ring_index),
            None => write!(f, "{}[{}]", self.kind.name(), self.ring_index),
        }
    }
}

/// Receipt for a queued write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLock {
    pub id: u64,
    pub target: BufferTarget,
    pub byte_offset: u64,
    pub byte_len: u64,
}

pub trait BufferSink: Send + Sync {
    /// Queue `data` for upload at `byte_offset` of `target`
    fn write_data(&self, target: BufferTarget, byte_offset: u64, data: &[u8]) -> SyncResult<BufferLock>;

    /// Offset and size alignment every write must satisfy
    fn write_alignment(&self) -> u64 {
        COPY_ALIGNMENT
    }
}

/// Check a write against the sink's alignment
pub(crate) fn validate_write(target: BufferTarget, byte_offset: u64, len: usize, alignment: u64) -> SyncResult<()> {
    if len == 0 {
        return Err(gpu_write_error(target, "empty write"));
    }
    if byte_offset % alignment != 0 || len as u64 % alignment != 0 {
        return Err(gpu_write_error(
            target,
            format!(
                "write of {} bytes at {} violates {} byte alignment",
                len, byte_offset, alignment
            ),
        ));
    }
    Ok(())
}

#[derive(Default)]
struct RecordingState {
    writes: Vec<BufferLock>,
    memory: FxHashMap<BufferTarget, Vec<u8>>,
}

/// CPU-side sink that keeps an image of every buffer copy and a log of writes
pub struct RecordingSink {
    alignment: u64,
    next_lock: AtomicU64,
    state: Mutex<RecordingState>,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::with_alignment(COPY_ALIGNMENT)
    }

    pub fn with_alignment(alignment: u64) -> Self {
        debug_assert!(alignment.is_power_of_two());
        Self {
            alignment,
            next_lock: AtomicU64::new(0),
            state: Mutex::new(RecordingState::default()),
        }
    }

    /// Writes since the last `take_writes`
    pub fn writes(&self) -> Vec<BufferLock> {
        self.state.lock().writes.clone()
    }

    pub fn take_writes(&self) -> Vec<BufferLock> {
        std::mem::take(&mut self.state.lock().writes)
    }

    pub fn writes_to(&self, target: BufferTarget) -> Vec<BufferLock> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|w| w.target == target)
            .copied()
            .collect()
    }

    /// Current image of a buffer copy
    pub fn contents(&self, target: BufferTarget) -> Vec<u8> {
        self.state
            .lock()
            .memory
            .get(&target)
            .cloned()
            .unwrap_or_default()
    }

    /// Element `index` of a buffer copy, if that part was ever written
    pub fn read_element<T: Pod>(&self, target: BufferTarget, index: u32) -> Option<T> {
        let size = std::mem::size_of::<T>();
        let start = index as usize * size;
        let state = self.state.lock();
        let bytes = state.memory.get(&target)?.get(start..start + size)?;
        Some(bytemuck::pod_read_unaligned(bytes))
    }
}

impl BufferSink for RecordingSink {
    fn write_data(&self, target: BufferTarget, byte_offset: u64, data: &[u8]) -> SyncResult<BufferLock> {
        validate_write(target, byte_offset, data.len(), self.alignment)?;

        let lock = BufferLock {
            id: self.next_lock.fetch_add(1, Ordering::Relaxed),
            target,
            byte_offset,
            byte_len: data.len() as u64,
        };

        let mut state = self.state.lock();
        let memory = state.memory.entry(target).or_default();
        let start = byte_offset as usize;
        let end = start + data.len();
        if memory.len() < end {
            memory.resize(end, 0);
        }
        memory[start..end].copy_from_slice(data);
        state.writes.push(lock);

        Ok(lock)
    }

    fn write_alignment(&self) -> u64 {
        self.alignment
    }
}
