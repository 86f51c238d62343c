//! Indirect command buffer layout definitions

use bytemuck::{Pod, Zeroable};

/// GPU indirect draw indexed command structure
/// Matches wgpu's DrawIndexedIndirect command layout exactly
/// Total size: 20 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct IndirectDrawIndexedCommand {
    /// Number of indices to draw
    pub index_count: u32,

    /// Number of instances to draw
    pub instance_count: u32,

    /// Offset into the index buffer
    pub first_index: u32,

    /// Value added to each index before fetching vertex
    pub base_vertex: i32,

    /// Object identity; shaders read the indirection table at this index
    pub first_instance: u32,
}

impl IndirectDrawIndexedCommand {
    /// Single-instance command for one object
    pub fn for_object(index_count: u32, first_index: u32, base_vertex: i32, object_id: u32) -> Self {
        Self {
            index_count,
            instance_count: 1,
            first_index,
            base_vertex,
            first_instance: object_id,
        }
    }
}
