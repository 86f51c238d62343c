//! Transform buffer layout
//!
//! One record per visible object per frame, addressed through the
//! indirection table's transform slot.

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec4};

/// Per-object transform data
/// Total size: 208 bytes
///
/// Memory layout:
/// - Offset 0-63: World matrix
/// - Offset 64-127: Previous clip matrix (last view-projection * previous world)
/// - Offset 128-175: World rotation matrix, rows padded to vec4
/// - Offset 176-191: Bounding sphere (center xyz, radius w)
/// - Offset 192-207: Packed metadata, animation frame, object id, padding
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TransformRecord {
    /// Object to world
    pub world_matrix: [[f32; 4]; 4],

    /// Object to clip space as of the previous frame, for motion vectors
    pub prev_clip_matrix: [[f32; 4]; 4],

    /// Rotation part of the world matrix, used for normals
    pub normal_matrix: [[f32; 4]; 3],

    /// World space bounding sphere
    pub bounding_sphere: [f32; 4],

    /// Bits 0-7: LoD, bits 8-15: selection flags, bits 16-31: bone count
    pub packed_meta: u32,

    /// Current skinning animation frame
    pub animation_frame: u32,

    /// Object identity, lets shaders reach back into the indirection table
    pub object_id: u32,

    pub _padding: u32,
}

impl TransformRecord {
    pub fn new(
        world: Mat4,
        prev_clip: Mat4,
        rotation: Mat3,
        bounding_sphere: Vec4,
        object_id: u32,
    ) -> Self {
        let cols = rotation.to_cols_array_2d();
        Self {
            world_matrix: world.to_cols_array_2d(),
            prev_clip_matrix: prev_clip.to_cols_array_2d(),
            normal_matrix: [
                [cols[0][0], cols[0][1], cols[0][2], 0.0],
                [cols[1][0], cols[1][1], cols[1][2], 0.0],
                [cols[2][0], cols[2][1], cols[2][2], 0.0],
            ],
            bounding_sphere: bounding_sphere.to_array(),
            packed_meta: 0,
            animation_frame: 0,
            object_id,
            _padding: 0,
        }
    }

    /// Pack LoD, selection and bone count into `packed_meta`
    #[inline]
    pub fn pack_meta(lod: u8, selection: u8, bone_count: u16) -> u32 {
        lod as u32 | (selection as u32) << 8 | (bone_count as u32) << 16
    }

    pub fn with_meta(mut self, lod: u8, selection: u8, bone_count: u16, animation_frame: u32) -> Self {
        self.packed_meta = Self::pack_meta(lod, selection, bone_count);
        self.animation_frame = animation_frame;
        self
    }

    #[inline]
    pub fn lod(&self) -> u8 {
        (self.packed_meta & 0xFF) as u8
    }

    #[inline]
    pub fn selection(&self) -> u8 {
        ((self.packed_meta >> 8) & 0xFF) as u8
    }

    #[inline]
    pub fn bone_count(&self) -> u16 {
        (self.packed_meta >> 16) as u16
    }

    pub fn world(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.world_matrix)
    }
}
