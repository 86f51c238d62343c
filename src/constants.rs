// Scene Sync Constants
//
// Default pool capacities and pipeline limits. `SyncConfig` starts from these
// values; GPU record sizes live in `gpu::buffer_layouts::constants`.

/// Pool capacities
pub mod pools {
    /// Stable object identities (indirection table entries)
    pub const MAX_INDIRECTION_ENTRIES: u32 = 65_536;

    /// Transform slots available to a single frame
    pub const MAX_VISIBLE_NODES: u32 = 16_384;

    /// Deduplicated material blocks. Must stay below `u16::MAX`, which marks an
    /// unassigned material slot in the indirection table.
    pub const MAX_CONCURRENT_MATERIALS: u32 = 2_048;

    /// Draw commands reserved per render stage and pass
    pub const MAX_COMMANDS_PER_STAGE_PASS: u32 = 16_384;
}

/// Frame pipelining
pub mod frames {
    /// GPU buffer copies kept in flight (triple buffering)
    pub const RING_LENGTH: usize = 3;

    /// Frames a material slot must stay unused before it may be evicted
    pub const MAX_MATERIAL_FRAME_LIFETIME: u32 = 6;
}

/// Parallel processing
pub mod parallel {
    /// Bins with more nodes than this are split into two tasks
    pub const BIN_PARTITION_THRESHOLD: usize = 16;

    /// Stack size for sync worker threads
    pub const WORKER_STACK_SIZE: usize = 2 * 1024 * 1024;
}

/// Level of detail
pub mod lod {
    /// Distance beyond which objects are not drawn
    pub const MAX_DRAW_DISTANCE: f32 = 1_000.0;

    /// Neutral LoD bias
    pub const DEFAULT_LOD_BIAS: f32 = 0.0;
}
