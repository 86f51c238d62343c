/// Draw Command Builder
///
/// One builder per render stage. Each frame it
/// 1. updates transforms, materials and indirection entries for the visible
///    set (`prepare`, parallel over bins),
/// 2. gathers per-pass indirect commands and uploads everything that changed
///    (`build_draw_commands`),
/// 3. rotates ring buffer bookkeeping once the frame is submitted
///    (`post_render`).

use std::sync::Arc;

use glam::Mat4;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::config::{CapacityPolicy, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::gpu::buffer_layouts::calculations::align_up;
use crate::gpu::buffer_layouts::{IndirectDrawIndexedCommand, TransformRecord};
use crate::gpu::buffer_sink::{BufferKind, BufferLock, BufferSink, BufferTarget};
use crate::memory::{align_range, BufferUpdateRange, DirtyRangeTracker};
use crate::thread_pool::WorkerPool;

use super::bindings::{command_binding, scene_binding, DescriptorBinding};
use super::identity::ObjectId;
use super::indirect_commands::{CommandRegion, PassCommands, PassKind, RenderStage, StagePasses};
use super::indirection::IndirectionTable;
use super::lod_system::LodSystem;
use super::material_cache::MaterialCache;
use super::stats::{FrameCounters, FrameStats};
use super::transform_staging::TransformStagingArea;
use super::visible_set::{RenderQueue, VisibleNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncPass {
    Transform,
    Material,
}

/// Draw list for one stage and frame
#[derive(Debug, Clone)]
pub struct StageDrawList {
    pub stage: RenderStage,
    pub ring_index: usize,
    pub passes: Vec<PassCommands>,
    pub bindings: Vec<DescriptorBinding>,
    pub locks: Vec<BufferLock>,
}

impl StageDrawList {
    pub fn pass(&self, kind: PassKind) -> Option<&PassCommands> {
        self.passes.iter().find(|p| p.region.pass == kind)
    }

    pub fn command_count(&self) -> u32 {
        self.passes.iter().map(PassCommands::count).sum()
    }
}

pub struct DrawCommandBuilder {
    stage: RenderStage,
    config: SyncConfig,
    pool: Arc<WorkerPool>,

    transforms: TransformStagingArea,
    materials: MaterialCache,
    indirection: IndirectionTable,
    lod: LodSystem,

    view_projection: Mat4,
    prev_view_projection: Mat4,
    ring_index: usize,
    frame_index: u64,

    /// Objects culled or dropped this frame; never emitted as draws
    excluded: Mutex<FxHashSet<u32>>,
    /// Per-object failures raised inside parallel tasks
    failures: Mutex<Vec<(ObjectId, SyncError)>>,

    counters: FrameCounters,
    evictions_reported: u64,
}

impl DrawCommandBuilder {
    pub fn new(stage: RenderStage, config: &SyncConfig, pool: Arc<WorkerPool>) -> SyncResult<Self> {
        config.validate()?;
        let ring = config.ring_length;

        log::debug!(
            "[DrawCommandBuilder::new] {} stage: {} transforms, {} materials, {} identities, ring {}",
            stage.name(),
            config.max_visible_nodes,
            config.max_concurrent_materials,
            config.max_indirection_entries,
            ring
        );

        Ok(Self {
            stage,
            transforms: TransformStagingArea::new(config.max_visible_nodes, ring),
            materials: MaterialCache::new(
                config.max_concurrent_materials,
                config.max_material_frame_lifetime,
                ring,
            ),
            indirection: IndirectionTable::new(config.max_indirection_entries, ring),
            lod: LodSystem::new(config.lod_bias, config.max_draw_distance),
            view_projection: Mat4::IDENTITY,
            prev_view_projection: Mat4::IDENTITY,
            ring_index: 0,
            frame_index: 0,
            excluded: Mutex::new(FxHashSet::default()),
            failures: Mutex::new(Vec::new()),
            counters: FrameCounters::default(),
            evictions_reported: 0,
            config: config.clone(),
            pool,
        })
    }

    pub fn set_view_projection(&mut self, view_projection: Mat4) {
        self.view_projection = view_projection;
    }

    /// Update transform, material and indirection state for every draw-ready
    /// node. Pool exhaustion for an object is handled per `CapacityPolicy`
    /// once each parallel pass has joined.
    pub fn prepare(&mut self, queue: &mut RenderQueue) {
        let pruned = queue.prune_not_ready();
        FrameCounters::add(&self.counters.nodes_pruned, pruned as u64);

        self.run_pass(queue, SyncPass::Transform);
        self.handle_failures(SyncPass::Transform);

        self.run_pass(queue, SyncPass::Material);
        self.handle_failures(SyncPass::Material);

        let acquired = self.transforms.acquired_count();
        if acquired as u64 * 10 >= self.transforms.capacity() as u64 * 9 {
            log::warn!(
                "[DrawCommandBuilder::prepare] {} stage using {}/{} transform slots",
                self.stage.name(),
                acquired,
                self.transforms.capacity()
            );
        }

        log::trace!(
            "[DrawCommandBuilder::prepare] {} frame {}: {} nodes, {} transform slots",
            self.stage.name(),
            self.frame_index,
            queue.node_count(),
            acquired
        );
    }

    fn run_pass(&self, queue: &RenderQueue, pass: SyncPass) {
        let threshold = self.config.bin_partition_threshold;
        self.pool.fork_join(|scope| {
            for bin in &queue.bins {
                if bin.nodes.len() > threshold {
                    let (left, right) = bin.nodes.split_at(bin.nodes.len() / 2);
                    for half in [left, right] {
                        self.pool.note_spawn();
                        FrameCounters::add(&self.counters.tasks_spawned, 1);
                        scope.spawn(move |_| self.process_nodes(half, pass));
                    }
                } else {
                    self.process_nodes(&bin.nodes, pass);
                }
            }
        });
    }

    fn process_nodes(&self, nodes: &[VisibleNode], pass: SyncPass) {
        for node in nodes {
            let result = match pass {
                SyncPass::Transform => self.update_transform(node),
                SyncPass::Material => self.update_material(node),
            };
            if let Err(e) = result {
                self.failures.lock().push((node.id(), e));
            }
        }
    }

    fn update_transform(&self, node: &VisibleNode) -> SyncResult<()> {
        let id = node.id();
        if !self.transforms.node_needs_update(id) {
            return Ok(());
        }
        let object = &node.object;

        let Some(lod) = self.lod.select(object.lod_config(), node.distance_sq) else {
            node.mark_not_ready();
            self.excluded.lock().insert(id.0);
            FrameCounters::add(&self.counters.objects_culled, 1);
            return Ok(());
        };

        let slot = self.transforms.acquire_slot()?;

        let skinning = object.skinning();
        let selection = object.selection_flags();
        let record = TransformRecord::new(
            object.world_matrix(),
            self.prev_view_projection * object.previous_world_matrix(),
            object.world_rotation(),
            object.bounding_sphere(),
            id.0,
        )
        .with_meta(lod, selection, skinning.bone_count, skinning.animation_frame);

        self.transforms.write(slot, &record)?;
        self.indirection.update_transform(id, slot, selection)?;

        FrameCounters::add(&self.counters.objects_processed, 1);
        FrameCounters::add(&self.counters.transform_writes, 1);
        Ok(())
    }

    fn update_material(&self, node: &VisibleNode) -> SyncResult<()> {
        let id = node.id();
        if self.is_excluded(id) || !self.materials.node_needs_update(id) {
            return Ok(());
        }

        let (slot, hit) = self.materials.lookup_or_insert(&node.object.material())?;
        self.indirection.update_material(id, slot)?;

        let counter = if hit {
            &self.counters.material_hits
        } else {
            &self.counters.material_misses
        };
        FrameCounters::add(counter, 1);
        Ok(())
    }

    fn is_excluded(&self, id: ObjectId) -> bool {
        self.excluded.lock().contains(&id.0)
    }

    fn handle_failures(&mut self, pass: SyncPass) {
        let failures = std::mem::take(self.failures.get_mut());
        if failures.is_empty() {
            return;
        }

        if self.config.capacity_policy == CapacityPolicy::Abort {
            let (id, error) = &failures[0];
            panic!(
                "{} stage {:?} pass failed for object {}: {} ({} failures)",
                self.stage.name(),
                pass,
                id,
                error,
                failures.len()
            );
        }

        let excluded = self.excluded.get_mut();
        for (id, error) in &failures {
            log::error!(
                "[DrawCommandBuilder::prepare] {} stage dropping object {} this frame: {}",
                self.stage.name(),
                id,
                error
            );
            excluded.insert(id.0);
        }
        FrameCounters::add(&self.counters.objects_dropped, failures.len() as u64);
    }

    /// Gather commands for the requested passes, upload every dirty range and
    /// emit the bindings the backend needs to draw them.
    ///
    /// A failed write does not stop the others. Ranges whose upload failed
    /// are requeued so every ring copy still converges, and the first error
    /// is returned once all buffers have been attempted.
    pub fn build_draw_commands(
        &mut self,
        queue: &RenderQueue,
        passes: StagePasses,
        sink: &dyn BufferSink,
    ) -> SyncResult<StageDrawList> {
        let alignment = sink.write_alignment();
        let mut first_error = None;
        let mut list = StageDrawList {
            stage: self.stage,
            ring_index: self.ring_index,
            passes: Vec::new(),
            bindings: Vec::new(),
            locks: Vec::new(),
        };

        for kind in passes.passes() {
            let region = CommandRegion::new(self.stage, kind, self.config.max_commands_per_stage_pass);
            let pass = self.gather_pass(queue, PassCommands::new(region));

            if pass.overflowed > 0 {
                log::warn!(
                    "[DrawCommandBuilder::build_draw_commands] {} {} pass dropped {} commands (region holds {})",
                    self.stage.name(),
                    kind.name(),
                    pass.overflowed,
                    region.capacity
                );
            }
            FrameCounters::add(&self.counters.commands_emitted, pass.count() as u64);
            FrameCounters::add(&self.counters.commands_overflowed, pass.overflowed as u64);

            match self.upload_commands(&pass, sink, alignment) {
                Ok(Some(lock)) => list.locks.push(lock),
                Ok(None) => {}
                Err(e) => self.note_failed_upload(e, &mut first_error),
            }
            list.bindings.push(command_binding(&pass, self.ring_index, alignment));
            list.passes.push(pass);
        }

        for kind in [BufferKind::Transforms, BufferKind::Materials, BufferKind::Indirection] {
            match self.sync_scene_buffer(kind, sink) {
                Ok(Some(lock)) => list.locks.push(lock),
                Ok(None) => {}
                Err(e) => self.note_failed_upload(e, &mut first_error),
            }
        }

        let scene_buffers = [
            (BufferKind::Transforms, self.transforms.dirty().high_water_mark(), self.transforms.capacity()),
            (BufferKind::Indirection, self.indirection.dirty().high_water_mark(), self.indirection.capacity()),
            (BufferKind::Materials, self.materials.dirty().high_water_mark(), self.materials.capacity()),
        ];
        for (kind, hwm, capacity) in scene_buffers {
            list.bindings.push(scene_binding(self.stage, kind, self.ring_index, hwm, capacity, alignment));
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(list),
        }
    }

    fn note_failed_upload(&self, error: SyncError, first_error: &mut Option<SyncError>) {
        log::error!(
            "[DrawCommandBuilder::build_draw_commands] {} stage upload failed: {}",
            self.stage.name(),
            error
        );
        FrameCounters::add(&self.counters.upload_failures, 1);
        first_error.get_or_insert(error);
    }

    /// Drain one scene buffer's tracker and upload the result. On failure the
    /// drained range goes back to the tracker.
    fn sync_scene_buffer(&mut self, kind: BufferKind, sink: &dyn BufferSink) -> SyncResult<Option<BufferLock>> {
        let range = Self::drain(self.tracker_mut(kind));
        let (capacity, result) = match kind {
            BufferKind::Transforms => {
                let capacity = self.transforms.capacity();
                (capacity, self.upload_range(kind, range, capacity, sink, |r| self.transforms.gather_bytes(r)))
            }
            BufferKind::Materials => {
                let capacity = self.materials.capacity();
                (capacity, self.upload_range(kind, range, capacity, sink, |r| self.materials.gather_bytes(r)))
            }
            _ => {
                let capacity = self.indirection.capacity();
                (capacity, self.upload_range(kind, range, capacity, sink, |r| self.indirection.gather_bytes(r)))
            }
        };

        if result.is_err() {
            log::debug!(
                "[DrawCommandBuilder::sync_scene_buffer] requeueing {} elements {}..={} of {}",
                kind.name(),
                range.first_index,
                range.last_index,
                capacity
            );
            self.tracker_mut(kind).requeue(range);
        }
        result
    }

    fn tracker_mut(&mut self, kind: BufferKind) -> &mut DirtyRangeTracker {
        match kind {
            BufferKind::Transforms => self.transforms.dirty_mut(),
            BufferKind::Materials => self.materials.dirty_mut(),
            _ => self.indirection.dirty_mut(),
        }
    }

    fn gather_pass(&self, queue: &RenderQueue, mut pass: PassCommands) -> PassCommands {
        let excluded = self.excluded.lock();
        for node in queue.nodes() {
            let id = node.id();
            if !node.is_draw_ready() || excluded.contains(&id.0) {
                continue;
            }
            let Some(entry) = self.indirection.get(id) else {
                continue;
            };
            if !entry.has_transform() || !entry.has_material() {
                continue;
            }
            let lod = match self.transforms.read(entry.transform_slot) {
                Ok(record) if record.object_id == id.0 => record.lod(),
                _ => continue,
            };
            if let Some(range) = node.object.draw_range(pass.region.pass, lod) {
                pass.push(IndirectDrawIndexedCommand::for_object(
                    range.index_count,
                    range.first_index,
                    range.base_vertex,
                    id.0,
                ));
            }
        }
        pass
    }

    fn drain(tracker: &mut DirtyRangeTracker) -> BufferUpdateRange {
        tracker.merge_into_history();
        tracker.consume_for_upload()
    }

    fn upload_commands(
        &self,
        pass: &PassCommands,
        sink: &dyn BufferSink,
        alignment: u64,
    ) -> SyncResult<Option<BufferLock>> {
        if pass.is_empty() {
            return Ok(None);
        }
        let mut bytes = bytemuck::cast_slice::<IndirectDrawIndexedCommand, u8>(&pass.commands).to_vec();
        // Region strides are storage-offset aligned, so padding stays inside the region.
        let padded = align_up(bytes.len() as u64, alignment);
        bytes.resize(padded as usize, 0);

        let lock = sink.write_data(BufferTarget::commands(self.ring_index), pass.region.byte_offset, &bytes)?;
        self.note_upload(&lock);
        Ok(Some(lock))
    }

    fn upload_range(
        &self,
        kind: BufferKind,
        range: BufferUpdateRange,
        capacity: u32,
        sink: &dyn BufferSink,
        gather: impl Fn(BufferUpdateRange) -> Vec<u8>,
    ) -> SyncResult<Option<BufferLock>> {
        let element_size = kind.element_size();
        let Some(write) = align_range(range, element_size, sink.write_alignment(), capacity) else {
            return Ok(None);
        };

        let mut bytes = gather(write.elements);
        let skip = write.skip_bytes(element_size);
        let end = skip + write.byte_len as usize;
        if bytes.len() < end {
            bytes.resize(end, 0);
        }
        debug_assert!(write.byte_offset % sink.write_alignment() == 0);

        let target = BufferTarget::scene(self.stage, kind, self.ring_index);
        let lock = sink.write_data(target, write.byte_offset, &bytes[skip..end])?;
        log::trace!(
            "[DrawCommandBuilder::upload_range] {} elements {}..={} ({} bytes)",
            target,
            write.elements.first_index,
            write.elements.last_index,
            write.byte_len
        );
        self.note_upload(&lock);
        Ok(Some(lock))
    }

    fn note_upload(&self, lock: &BufferLock) {
        FrameCounters::add(&self.counters.upload_calls, 1);
        FrameCounters::add(&self.counters.upload_bytes, lock.byte_len);
    }

    /// End-of-frame bookkeeping. Call once per frame after the stage's draws
    /// have been submitted.
    pub fn post_render(&mut self) -> FrameStats {
        self.transforms.dirty_mut().advance();
        self.materials.dirty_mut().advance();
        self.indirection.dirty_mut().advance();
        self.ring_index = (self.ring_index + 1) % self.config.ring_length;

        self.materials.age_slots();
        self.materials.clear_processed();
        self.transforms.reset_for_new_frame();
        self.excluded.get_mut().clear();

        self.prev_view_projection = self.view_projection;
        self.frame_index += 1;

        let mut stats = self.counters.take();
        let evictions = self.materials.stats().evictions;
        stats.material_evictions = evictions - self.evictions_reported;
        self.evictions_reported = evictions;

        log::debug!(
            "[DrawCommandBuilder::post_render] {} frame {}: {}",
            self.stage.name(),
            self.frame_index,
            stats
        );
        stats
    }

    pub fn stage(&self) -> RenderStage {
        self.stage
    }

    pub fn ring_index(&self) -> usize {
        self.ring_index
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn transforms(&self) -> &TransformStagingArea {
        &self.transforms
    }

    pub fn materials(&self) -> &MaterialCache {
        &self.materials
    }

    pub fn indirection(&self) -> &IndirectionTable {
        &self.indirection
    }

    pub fn lod_system_mut(&mut self) -> &mut LodSystem {
        &mut self.lod
    }
}
