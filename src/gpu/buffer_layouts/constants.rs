//! Buffer size constants
//!
//! Record sizes shared by CPU and GPU code. The layout tests assert these
//! against `mem::size_of` of the matching structs.

// ===== Buffer Element Sizes =====

/// Size of a transform record (3 matrices + bounds + metadata)
pub const TRANSFORM_RECORD_SIZE: u64 = 208;

/// Size of a material block
pub const MATERIAL_DATA_SIZE: u64 = 64;

/// Size of an indirection entry
pub const INDIRECTION_ENTRY_SIZE: u64 = 8;

/// Size of indirect indexed draw command
pub const INDIRECT_INDEXED_COMMAND_SIZE: u64 = 20; // 5 u32 values

// ===== Alignment =====

/// Offset and size alignment required by `Queue::write_buffer`
pub const COPY_ALIGNMENT: u64 = wgpu::COPY_BUFFER_ALIGNMENT;

/// Offset alignment of storage buffer bindings (wgpu default limit)
pub const STORAGE_OFFSET_ALIGNMENT: u64 = 256;

// ===== Sentinels =====

/// Transform slot of an object not processed this frame
pub const INVALID_TRANSFORM_SLOT: u32 = u32::MAX;

/// Material slot of an object without a cached material
pub const INVALID_MATERIAL_SLOT: u16 = u16::MAX;

/// Material hash of a free cache slot
pub const INVALID_MATERIAL_HASH: u64 = 0;
