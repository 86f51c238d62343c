//! GPU buffer layout definitions for scene sync
//!
//! Single source of truth for the four managed buffers: draw commands,
//! transforms, materials and the indirection table.

pub mod commands;
pub mod constants;
pub mod indirection;
pub mod material;
pub mod transform;


pub use commands::IndirectDrawIndexedCommand;
pub use constants::*;
pub use indirection::IndirectionEntry;
pub use material::MaterialData;
pub use transform::TransformRecord;

/// Binding indices of the scene sync bind group
pub mod bindings {
    pub const DRAW_COMMANDS: u32 = 0;
    pub const TRANSFORM_BUFFER: u32 = 1;
    pub const INDIRECTION_BUFFER: u32 = 2;
    pub const MATERIAL_BUFFER: u32 = 3;
}

/// Helper functions for buffer calculations
pub mod calculations {
    /// Round `value` up to a multiple of `alignment` (a power of two)
    #[inline]
    pub fn align_up(value: u64, alignment: u64) -> u64 {
        (value + alignment - 1) & !(alignment - 1)
    }

    /// Round `value` down to a multiple of `alignment` (a power of two)
    #[inline]
    pub fn align_down(value: u64, alignment: u64) -> u64 {
        value & !(alignment - 1)
    }

    /// Byte offset of element `index`
    #[inline]
    pub fn element_offset(index: u32, element_size: u64) -> u64 {
        index as u64 * element_size
    }

    /// Buffer size for `capacity` elements, padded to `alignment`
    #[inline]
    pub fn padded_buffer_size(capacity: u32, element_size: u64, alignment: u64) -> u64 {
        align_up(capacity as u64 * element_size, alignment)
    }
}

/// Buffer usage patterns
pub mod usage {
    use wgpu::BufferUsages;

    /// Standard storage buffer usage
    pub const STORAGE: BufferUsages = BufferUsages::STORAGE.union(BufferUsages::COPY_DST);

    /// Indirect drawing buffer usage
    pub const INDIRECT: BufferUsages = BufferUsages::INDIRECT
        .union(BufferUsages::STORAGE)
        .union(BufferUsages::COPY_DST);
}
