//! Culling output consumed by the draw command builder
//!
//! Culling runs elsewhere and hands over a `RenderQueue`: bins of visible
//! nodes, already sorted. The builder only ever flips a node's readiness flag.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glam::{Mat3, Mat4, Vec4};

use crate::gpu::buffer_layouts::MaterialData;

use super::identity::ObjectId;
use super::indirect_commands::PassKind;
use super::lod_system::LodConfig;

/// Index/vertex range of one mesh LoD for one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshDrawRange {
    pub index_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
}

/// Skinning state packed into the transform record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkinningState {
    pub bone_count: u16,
    pub animation_frame: u32,
}

/// Per-object queries made while preparing a frame
pub trait Renderable: Send + Sync {
    fn object_id(&self) -> ObjectId;

    fn world_matrix(&self) -> Mat4;

    /// World matrix of the previous frame, for motion vectors
    fn previous_world_matrix(&self) -> Mat4 {
        self.world_matrix()
    }

    fn world_rotation(&self) -> Mat3 {
        let (_, rotation, _) = self.world_matrix().to_scale_rotation_translation();
        Mat3::from_quat(rotation)
    }

    /// World space center (xyz) and radius (w)
    fn bounding_sphere(&self) -> Vec4;

    fn skinning(&self) -> SkinningState {
        SkinningState::default()
    }

    fn selection_flags(&self) -> u8 {
        0
    }

    fn material(&self) -> MaterialData;

    fn lod_config(&self) -> Option<&LodConfig> {
        None
    }

    /// Draw range for `pass` at `lod`, or `None` if the object does not take
    /// part in that pass
    fn draw_range(&self, pass: PassKind, lod: u8) -> Option<MeshDrawRange>;

    /// False while resources (meshes, textures) are still streaming in
    fn is_draw_ready(&self) -> bool {
        true
    }
}

/// One culled-in object
pub struct VisibleNode {
    pub object: Arc<dyn Renderable>,
    pub distance_sq: f32,
    draw_ready: AtomicBool,
}

impl VisibleNode {
    pub fn new(object: Arc<dyn Renderable>, distance_sq: f32) -> Self {
        Self {
            object,
            distance_sq,
            draw_ready: AtomicBool::new(true),
        }
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.object.object_id()
    }

    #[inline]
    pub fn is_draw_ready(&self) -> bool {
        self.draw_ready.load(Ordering::Acquire)
    }

    /// Exclude the node from draw emission this frame
    pub fn mark_not_ready(&self) {
        self.draw_ready.store(false, Ordering::Release);
    }
}

impl fmt::Debug for VisibleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisibleNode")
            .field("id", &self.id())
            .field("distance_sq", &self.distance_sq)
            .field("draw_ready", &self.is_draw_ready())
            .finish()
    }
}

/// Bin grouping of visible nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinKind {
    Opaque,
    AlphaTested,
    Translucent,
}

#[derive(Debug)]
pub struct RenderBin {
    pub kind: BinKind,
    pub nodes: Vec<VisibleNode>,
}

impl RenderBin {
    pub fn new(kind: BinKind) -> Self {
        Self {
            kind,
            nodes: Vec::new(),
        }
    }

    pub fn push(&mut self, object: Arc<dyn Renderable>, distance_sq: f32) {
        self.nodes.push(VisibleNode::new(object, distance_sq));
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Sorted, binned visible set for one stage
#[derive(Debug, Default)]
pub struct RenderQueue {
    pub bins: Vec<RenderBin>,
}

impl RenderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bin(&mut self, bin: RenderBin) {
        self.bins.push(bin);
    }

    /// Drop nodes that are flagged or report themselves not ready. Order of
    /// the remaining nodes is preserved. Returns the number removed.
    pub fn prune_not_ready(&mut self) -> usize {
        let mut removed = 0;
        for bin in &mut self.bins {
            let before = bin.nodes.len();
            bin.nodes
                .retain(|node| node.is_draw_ready() && node.object.is_draw_ready());
            removed += before - bin.nodes.len();
        }
        removed
    }

    pub fn node_count(&self) -> usize {
        self.bins.iter().map(RenderBin::len).sum()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &VisibleNode> {
        self.bins.iter().flat_map(|bin| bin.nodes.iter())
    }
}
