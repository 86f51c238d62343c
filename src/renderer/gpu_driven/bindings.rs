use crate::gpu::buffer_layouts::calculations::{align_up, padded_buffer_size};
use crate::gpu::buffer_layouts::{bindings, INDIRECT_INDEXED_COMMAND_SIZE};
use crate::gpu::buffer_sink::{BufferKind, BufferTarget};

use super::indirect_commands::{PassCommands, RenderStage};

/// Buffer range bound for one stage/pass draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    /// Binding index in the scene sync bind group
    pub binding: u32,
    pub target: BufferTarget,
    pub byte_offset: u64,
    pub byte_size: u64,
}

/// Sub-range of the command buffer holding one pass's commands
pub fn command_binding(pass: &PassCommands, ring_index: usize, alignment: u64) -> DescriptorBinding {
    let commands = pass.count().max(1) as u64;
    DescriptorBinding {
        binding: bindings::DRAW_COMMANDS,
        target: BufferTarget::commands(ring_index),
        byte_offset: pass.region.byte_offset,
        byte_size: align_up(commands * INDIRECT_INDEXED_COMMAND_SIZE, alignment),
    }
}

/// Whole-buffer binding cut down to the populated prefix. The high-water mark
/// is clamped to the pool capacity and at least one element is bound.
pub fn scene_binding(
    stage: RenderStage,
    kind: BufferKind,
    ring_index: usize,
    high_water_mark: Option<u32>,
    capacity: u32,
    alignment: u64,
) -> DescriptorBinding {
    let binding = match kind {
        BufferKind::Transforms => bindings::TRANSFORM_BUFFER,
        BufferKind::Indirection => bindings::INDIRECTION_BUFFER,
        BufferKind::Materials => bindings::MATERIAL_BUFFER,
        BufferKind::Commands => bindings::DRAW_COMMANDS,
    };
    let elements = high_water_mark
        .map_or(1, |hwm| hwm.saturating_add(1))
        .clamp(1, capacity.max(1));
    let element_size = kind.element_size();

    DescriptorBinding {
        binding,
        target: BufferTarget::scene(stage, kind, ring_index),
        byte_offset: 0,
        byte_size: align_up(elements as u64 * element_size, alignment)
            .min(padded_buffer_size(capacity.max(1), element_size, alignment)),
    }
}
