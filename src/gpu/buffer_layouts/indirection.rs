//! Indirection table layout

use bytemuck::{Pod, Zeroable};

use super::constants::{INVALID_MATERIAL_SLOT, INVALID_TRANSFORM_SLOT};

/// Object identity to per-frame slots
/// Total size: 8 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct IndirectionEntry {
    pub transform_slot: u32,
    pub material_slot: u16,
    pub selection_flags: u8,
    pub _padding: u8,
}

impl Default for IndirectionEntry {
    fn default() -> Self {
        Self::INVALID
    }
}

impl IndirectionEntry {
    pub const INVALID: Self = Self {
        transform_slot: INVALID_TRANSFORM_SLOT,
        material_slot: INVALID_MATERIAL_SLOT,
        selection_flags: 0,
        _padding: 0,
    };

    /// Pack into a single word for atomic storage
    #[inline]
    pub fn to_bits(self) -> u64 {
        self.transform_slot as u64
            | (self.material_slot as u64) << 32
            | (self.selection_flags as u64) << 48
    }

    #[inline]
    pub fn from_bits(bits: u64) -> Self {
        Self {
            transform_slot: bits as u32,
            material_slot: (bits >> 32) as u16,
            selection_flags: (bits >> 48) as u8,
            _padding: 0,
        }
    }

    #[inline]
    pub fn has_transform(&self) -> bool {
        self.transform_slot != INVALID_TRANSFORM_SLOT
    }

    #[inline]
    pub fn has_material(&self) -> bool {
        self.material_slot != INVALID_MATERIAL_SLOT
    }
}
