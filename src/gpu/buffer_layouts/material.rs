//! Material buffer layout

use bytemuck::{Pod, Zeroable};
use std::hash::Hasher;

use rustc_hash::FxHasher;

use super::constants::INVALID_MATERIAL_HASH;

/// Deduplicated shading parameters
/// Total size: 64 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MaterialData {
    /// Base colour (RGBA)
    pub base_color: [f32; 4],

    /// Emissive colour (RGB) and intensity (A)
    pub emissive: [f32; 4],

    /// Metallic, roughness, alpha cutoff, normal scale
    pub params: [f32; 4],

    /// Albedo, normal, metallic-roughness and emissive texture indices
    pub texture_indices: [u32; 4],
}

impl MaterialData {
    pub const NO_TEXTURE: u32 = u32::MAX;

    pub fn new(base_color: [f32; 4], metallic: f32, roughness: f32) -> Self {
        Self {
            base_color,
            emissive: [0.0; 4],
            params: [metallic, roughness, 0.5, 1.0],
            texture_indices: [Self::NO_TEXTURE; 4],
        }
    }

    pub fn with_emissive(mut self, emissive: [f32; 4]) -> Self {
        self.emissive = emissive;
        self
    }

    pub fn with_textures(mut self, texture_indices: [u32; 4]) -> Self {
        self.texture_indices = texture_indices;
        self
    }

    #[inline]
    pub fn metallic(&self) -> f32 {
        self.params[0]
    }

    #[inline]
    pub fn roughness(&self) -> f32 {
        self.params[1]
    }

    /// Hash of the uploadable bytes. Bit-identical materials hash equal and
    /// the result is never `INVALID_MATERIAL_HASH`.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        hasher.write(bytemuck::bytes_of(self));
        match hasher.finish() {
            INVALID_MATERIAL_HASH => 1,
            hash => hash,
        }
    }
}
