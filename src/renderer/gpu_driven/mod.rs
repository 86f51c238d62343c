/// GPU-driven scene sync
///
/// Per-frame synchronization of scene data into GPU buffers and assembly of
/// indirect draw commands. The GPU reads everything through one level of
/// indirection: object id -> (transform slot, material slot).
///
/// Key components:
/// - Identity allocation for object ids
/// - Transform staging, rebuilt every frame
/// - Content-addressed material cache with age-based eviction
/// - Indirection table, one entry per object id
/// - Parallel per-bin updates and per-pass command emission
/// - Dirty range tracking so only changed bytes hit each ring copy

pub mod bindings;
pub mod draw_builder;
pub mod frame_gate;
pub mod identity;
pub mod indirect_commands;
pub mod indirection;
pub mod lod_system;
pub mod material_cache;
pub mod stats;
pub mod transform_staging;
pub mod visible_set;

#[cfg(test)]
mod tests;

pub use bindings::{command_binding, scene_binding, DescriptorBinding};
pub use draw_builder::{DrawCommandBuilder, StageDrawList};
pub use frame_gate::FrameOnceGate;
pub use identity::{IdentityAllocator, ObjectHandle, ObjectId};
pub use indirect_commands::{CommandRegion, PassCommands, PassKind, RenderStage, StagePasses, TransparencyPass};
pub use indirection::IndirectionTable;
pub use lod_system::{LodConfig, LodLevel, LodSystem};
pub use material_cache::{MaterialCache, MaterialCacheStats};
pub use stats::{FrameCounters, FrameStats};
pub use transform_staging::TransformStagingArea;
pub use visible_set::{BinKind, MeshDrawRange, RenderBin, RenderQueue, Renderable, SkinningState, VisibleNode};
