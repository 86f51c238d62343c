#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::config::{CapacityPolicy, SyncConfig};
    use crate::gpu::buffer_layouts::{IndirectDrawIndexedCommand, IndirectionEntry, MaterialData, TransformRecord};
    use crate::error::{gpu_write_error, SyncResult};
    use crate::gpu::buffer_sink::{BufferKind, BufferLock, BufferSink, BufferTarget, RecordingSink};
    use crate::thread_pool::{WorkerPool, WorkerPoolConfig};
    use glam::{Mat4, Vec3, Vec4};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct TestObject {
        id: ObjectId,
        world: Mat4,
        previous_world: Mat4,
        material: MaterialData,
        lod: Option<LodConfig>,
        transparent: bool,
    }

    impl TestObject {
        fn new(id: u32, material: MaterialData) -> Self {
            let world = Mat4::from_translation(Vec3::new(id as f32, 0.0, 0.0));
            Self {
                id: ObjectId(id),
                world,
                previous_world: world,
                material,
                lod: None,
                transparent: false,
            }
        }

        fn shared(self) -> Arc<dyn Renderable> {
            Arc::new(self)
        }
    }

    impl Renderable for TestObject {
        fn object_id(&self) -> ObjectId {
            self.id
        }

        fn world_matrix(&self) -> Mat4 {
            self.world
        }

        fn previous_world_matrix(&self) -> Mat4 {
            self.previous_world
        }

        fn bounding_sphere(&self) -> Vec4 {
            self.world.w_axis.truncate().extend(1.0)
        }

        fn material(&self) -> MaterialData {
            self.material
        }

        fn lod_config(&self) -> Option<&LodConfig> {
            self.lod.as_ref()
        }

        fn draw_range(&self, pass: PassKind, lod: u8) -> Option<MeshDrawRange> {
            let transparent_pass = matches!(pass, PassKind::Oit | PassKind::Transparency);
            if transparent_pass != self.transparent {
                return None;
            }
            Some(MeshDrawRange {
                index_count: 36 >> lod,
                first_index: self.id.0 * 36,
                base_vertex: 0,
            })
        }
    }

    fn red() -> MaterialData {
        MaterialData::new([1.0, 0.0, 0.0, 1.0], 0.0, 0.5)
    }

    fn blue() -> MaterialData {
        MaterialData::new([0.0, 0.0, 1.0, 1.0], 0.5, 0.2)
    }

    fn small_config() -> SyncConfig {
        SyncConfig {
            max_indirection_entries: 256,
            max_visible_nodes: 64,
            max_concurrent_materials: 16,
            max_commands_per_stage_pass: 64,
            capacity_policy: CapacityPolicy::DropAndLog,
            ..SyncConfig::default()
        }
    }

    /// Rejects the first `failures` writes to one buffer kind
    struct FlakySink {
        inner: RecordingSink,
        kind: BufferKind,
        failures: AtomicU32,
    }

    impl FlakySink {
        fn new(kind: BufferKind, failures: u32) -> Self {
            Self {
                inner: RecordingSink::new(),
                kind,
                failures: AtomicU32::new(failures),
            }
        }
    }

    impl BufferSink for FlakySink {
        fn write_data(&self, target: BufferTarget, byte_offset: u64, data: &[u8]) -> SyncResult<BufferLock> {
            let fail = target.kind == self.kind
                && self
                    .failures
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                    .is_ok();
            if fail {
                return Err(gpu_write_error(target, "transient failure"));
            }
            self.inner.write_data(target, byte_offset, data)
        }

        fn write_alignment(&self) -> u64 {
            self.inner.write_alignment()
        }
    }

    fn builder(config: &SyncConfig) -> DrawCommandBuilder {
        let _ = env_logger::builder().is_test(true).try_init();
        let pool = Arc::new(WorkerPool::new(WorkerPoolConfig::with_threads(2)).unwrap());
        DrawCommandBuilder::new(RenderStage::Display, config, pool).unwrap()
    }

    fn queue_of(bins: Vec<Vec<Arc<dyn Renderable>>>) -> RenderQueue {
        let mut queue = RenderQueue::new();
        for objects in bins {
            let mut bin = RenderBin::new(BinKind::Opaque);
            for object in objects {
                bin.push(object, 25.0);
            }
            queue.push_bin(bin);
        }
        queue
    }

    fn run_frame(
        builder: &mut DrawCommandBuilder,
        queue: &mut RenderQueue,
        sink: &RecordingSink,
    ) -> (StageDrawList, FrameStats) {
        builder.prepare(queue);
        let list = builder
            .build_draw_commands(queue, StagePasses::default(), sink)
            .unwrap();
        let stats = builder.post_render();
        (list, stats)
    }

    #[test]
    fn object_in_two_bins_is_processed_once() {
        let config = small_config();
        let mut builder = builder(&config);
        let sink = RecordingSink::new();

        let object = TestObject::new(3, red()).shared();
        let mut queue = queue_of(vec![vec![object.clone()], vec![object]]);

        let (list, stats) = run_frame(&mut builder, &mut queue, &sink);

        assert_eq!(stats.objects_processed, 1);
        assert_eq!(stats.transform_writes, 1);
        assert_eq!(stats.material_hits + stats.material_misses, 1);
        // one command per visible node
        assert_eq!(list.pass(PassKind::Main).unwrap().count(), 2);
        assert_eq!(builder.transforms().acquired_count(), 0);
    }

    #[test]
    fn objects_sharing_a_material_share_a_slot() {
        let config = small_config();
        let mut builder = builder(&config);
        let sink = RecordingSink::new();

        let objects: Vec<_> = (0..3).map(|id| TestObject::new(id, red()).shared()).collect();
        let mut queue = queue_of(vec![objects, vec![TestObject::new(7, blue()).shared()]]);

        builder.prepare(&mut queue);

        let slots: Vec<u16> = [0, 1, 2, 7]
            .iter()
            .map(|&id| builder.indirection().get(ObjectId(id)).unwrap().material_slot)
            .collect();
        assert_eq!(slots[0], slots[1]);
        assert_eq!(slots[1], slots[2]);
        assert_ne!(slots[0], slots[3]);

        let stats = builder.materials().stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 2);
        assert_eq!(builder.materials().occupied(), 2);
    }

    #[test]
    fn commands_carry_object_id_and_lod_range() {
        let config = small_config();
        let mut builder = builder(&config);
        let sink = RecordingSink::new();

        let mut far = TestObject::new(9, red());
        let mut lod = LodConfig::new(1.0);
        lod.add_level(LodLevel::new(0.0, 2.0, 0));
        lod.add_level(LodLevel::new(2.0, 10.0, 1));
        far.lod = Some(lod);

        // distance 5 picks the second level
        let mut queue = queue_of(vec![vec![far.shared()]]);
        let (list, _) = run_frame(&mut builder, &mut queue, &sink);

        let main = list.pass(PassKind::Main).unwrap();
        assert_eq!(main.commands.len(), 1);
        let command = main.commands[0];
        assert_eq!(command.first_instance, 9);
        assert_eq!(command.instance_count, 1);
        assert_eq!(command.index_count, 18);
        assert_eq!(command.first_index, 9 * 36);

        // region offsets are multiples of the command size for this capacity
        let index = (main.region.byte_offset / 20) as u32;
        let uploaded = sink.read_element::<IndirectDrawIndexedCommand>(BufferTarget::commands(0), index);
        assert_eq!(uploaded, Some(command));
    }

    #[test]
    fn objects_beyond_draw_distance_are_culled() {
        let config = SyncConfig {
            max_draw_distance: 10.0,
            ..small_config()
        };
        let mut builder = builder(&config);
        let sink = RecordingSink::new();

        let mut queue = RenderQueue::new();
        let mut bin = RenderBin::new(BinKind::Opaque);
        bin.push(TestObject::new(1, red()).shared(), 4.0);
        bin.push(TestObject::new(2, red()).shared(), 400.0);
        queue.push_bin(bin);

        let (list, stats) = run_frame(&mut builder, &mut queue, &sink);

        assert_eq!(stats.objects_culled, 1);
        assert_eq!(stats.objects_processed, 1);
        let main = list.pass(PassKind::Main).unwrap();
        assert_eq!(main.count(), 1);
        assert_eq!(main.commands[0].first_instance, 1);
        assert!(!queue.bins[0].nodes[1].is_draw_ready());
    }

    #[test]
    fn near_objects_are_drawn_when_first_level_starts_further_out() {
        let config = small_config();
        let mut builder = builder(&config);
        let sink = RecordingSink::new();

        let mut near = TestObject::new(6, red());
        let mut lod = LodConfig::new(1.0);
        lod.add_level(LodLevel::new(5.0, 50.0, 0));
        lod.add_level(LodLevel::new(50.0, 100.0, 1));
        near.lod = Some(lod);

        let mut queue = RenderQueue::new();
        let mut bin = RenderBin::new(BinKind::Opaque);
        bin.push(near.shared(), 4.0);
        queue.push_bin(bin);

        let (list, stats) = run_frame(&mut builder, &mut queue, &sink);

        assert_eq!(stats.objects_culled, 0);
        let main = list.pass(PassKind::Main).unwrap();
        assert_eq!(main.count(), 1);
        assert_eq!(main.commands[0].index_count, 36);
        assert!(queue.bins[0].nodes[0].is_draw_ready());
    }

    #[test]
    fn not_ready_nodes_are_pruned_before_processing() {
        let config = small_config();
        let mut builder = builder(&config);
        let sink = RecordingSink::new();

        let mut queue = queue_of(vec![vec![
            TestObject::new(1, red()).shared(),
            TestObject::new(2, red()).shared(),
        ]]);
        queue.bins[0].nodes[0].mark_not_ready();

        let (list, stats) = run_frame(&mut builder, &mut queue, &sink);
        assert_eq!(stats.nodes_pruned, 1);
        assert_eq!(queue.node_count(), 1);
        assert_eq!(list.command_count(), 1);
    }

    #[test]
    #[should_panic]
    fn abort_policy_panics_when_transform_slots_run_out() {
        let config = SyncConfig {
            max_visible_nodes: 2,
            capacity_policy: CapacityPolicy::Abort,
            ..small_config()
        };
        let mut builder = builder(&config);
        let objects = (0..3).map(|id| TestObject::new(id, red()).shared()).collect();
        let mut queue = queue_of(vec![objects]);

        builder.prepare(&mut queue);
    }

    #[test]
    fn drop_policy_excludes_only_the_failed_object() {
        let config = SyncConfig {
            max_visible_nodes: 2,
            ..small_config()
        };
        let mut builder = builder(&config);
        let sink = RecordingSink::new();
        let objects = (0..3).map(|id| TestObject::new(id, red()).shared()).collect();
        let mut queue = queue_of(vec![objects]);

        let (list, stats) = run_frame(&mut builder, &mut queue, &sink);

        assert_eq!(stats.objects_dropped, 1);
        assert_eq!(stats.objects_processed, 2);
        let ids: Vec<u32> = list
            .pass(PassKind::Main)
            .unwrap()
            .commands
            .iter()
            .map(|c| c.first_instance)
            .collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn drop_policy_skips_objects_when_material_cache_is_full() {
        let config = SyncConfig {
            max_concurrent_materials: 1,
            ring_length: 1,
            max_material_frame_lifetime: 1,
            ..small_config()
        };
        let mut builder = builder(&config);
        let sink = RecordingSink::new();
        let mut queue = queue_of(vec![vec![
            TestObject::new(0, red()).shared(),
            TestObject::new(1, blue()).shared(),
        ]]);

        let (list, stats) = run_frame(&mut builder, &mut queue, &sink);
        assert_eq!(stats.objects_dropped, 1);
        assert_eq!(list.command_count(), 1);
        assert!(!builder.indirection().get(ObjectId(1)).unwrap().has_material());
    }

    #[test]
    fn uploads_respect_sink_alignment() {
        let config = small_config();
        let mut builder = builder(&config);
        let sink = RecordingSink::with_alignment(16);

        let mut queue = queue_of(vec![vec![TestObject::new(5, red()).shared()]]);
        let (list, _) = run_frame(&mut builder, &mut queue, &sink);

        let writes = sink.writes();
        assert!(!writes.is_empty());
        for write in &writes {
            assert_eq!(write.byte_offset % 16, 0, "{:?}", write);
            assert_eq!(write.byte_len % 16, 0, "{:?}", write);
        }
        assert_eq!(list.locks.len(), writes.len());

        // id 5 sits in bytes 40..48 of the indirection buffer
        let target = BufferTarget::scene(RenderStage::Display, BufferKind::Indirection, 0);
        let indirection = sink.writes_to(target);
        assert_eq!(indirection.len(), 1);
        assert_eq!(indirection[0].byte_offset, 32);
        assert_eq!(indirection[0].byte_len, 16);

        let entry = sink.read_element::<IndirectionEntry>(target, 5).unwrap();
        assert_eq!(entry, builder.indirection().get(ObjectId(5)).unwrap());
        // neighbour widened into the write keeps its invalid value
        assert_eq!(sink.read_element::<IndirectionEntry>(target, 4).unwrap(), IndirectionEntry::INVALID);
    }

    #[test]
    fn each_frame_writes_its_own_ring_copy() {
        let config = small_config();
        let mut builder = builder(&config);
        let sink = RecordingSink::new();

        for frame in 0..4usize {
            let mut queue = queue_of(vec![vec![TestObject::new(2, red()).shared()]]);
            let (list, _) = run_frame(&mut builder, &mut queue, &sink);
            let ring = frame % config.ring_length;
            assert_eq!(list.ring_index, ring);

            let writes = sink.take_writes();
            assert!(writes.iter().all(|w| w.target.ring_index == ring));

            // unchanged indirection entry still reaches copies that have not seen it
            let indirection = writes
                .iter()
                .filter(|w| w.target.kind == BufferKind::Indirection)
                .count();
            let expected = if frame < config.ring_length { 1 } else { 0 };
            assert_eq!(indirection, expected, "frame {}", frame);
        }
        assert_eq!(builder.frame_index(), 4);
    }

    #[test]
    fn every_ring_copy_converges_on_the_same_indirection_contents() {
        let config = small_config();
        let mut builder = builder(&config);
        let sink = RecordingSink::new();

        for frame in 0..config.ring_length as u32 * 2 {
            let mut queue = queue_of(vec![vec![TestObject::new(frame % 4, red()).shared()]]);
            run_frame(&mut builder, &mut queue, &sink);
        }

        for id in 0..4 {
            let expected = builder.indirection().get(ObjectId(id)).unwrap();
            for ring in 0..config.ring_length {
                let target = BufferTarget::scene(RenderStage::Display, BufferKind::Indirection, ring);
                let entry = sink.read_element::<IndirectionEntry>(target, id).unwrap();
                assert_eq!(entry.material_slot, expected.material_slot, "id {} ring {}", id, ring);
            }
        }
    }

    #[test]
    fn empty_queue_writes_nothing() {
        let config = small_config();
        let mut builder = builder(&config);
        let sink = RecordingSink::new();

        let mut queue = RenderQueue::new();
        let (list, stats) = run_frame(&mut builder, &mut queue, &sink);

        assert!(sink.writes().is_empty());
        assert!(list.locks.is_empty());
        assert_eq!(list.command_count(), 0);
        assert_eq!(stats.upload_calls, 0);
        // one command binding per pass plus the three scene buffers
        assert_eq!(list.bindings.len(), list.passes.len() + 3);
    }

    #[test]
    fn scene_bindings_follow_the_highest_referenced_index() {
        let config = small_config();
        let mut builder = builder(&config);
        let sink = RecordingSink::new();

        let mut queue = queue_of(vec![vec![TestObject::new(20, red()).shared()]]);
        let (list, _) = run_frame(&mut builder, &mut queue, &sink);

        let indirection = list
            .bindings
            .iter()
            .find(|b| b.target.kind == BufferKind::Indirection)
            .unwrap();
        assert_eq!(indirection.byte_offset, 0);
        assert_eq!(indirection.byte_size, 21 * 8);

        let transforms = list
            .bindings
            .iter()
            .find(|b| b.target.kind == BufferKind::Transforms)
            .unwrap();
        assert_eq!(transforms.byte_size, 208);
    }

    #[test]
    fn previous_clip_matrix_uses_last_frames_view_projection() {
        let config = small_config();
        let mut builder = builder(&config);
        let sink = RecordingSink::new();

        let first_vp = Mat4::perspective_rh(1.0, 1.5, 0.1, 100.0);
        let second_vp = first_vp * Mat4::from_translation(Vec3::new(0.0, 0.0, -3.0));

        let mut object = TestObject::new(1, red());
        object.previous_world = Mat4::from_translation(Vec3::new(0.5, 0.0, 0.0));
        let object = object.shared();

        builder.set_view_projection(first_vp);
        let mut queue = queue_of(vec![vec![object.clone()]]);
        run_frame(&mut builder, &mut queue, &sink);

        builder.set_view_projection(second_vp);
        let mut queue = queue_of(vec![vec![object.clone()]]);
        builder.prepare(&mut queue);

        let slot = builder.indirection().get(ObjectId(1)).unwrap().transform_slot;
        let record: TransformRecord = builder.transforms().read(slot).unwrap();
        let expected = first_vp * object.previous_world_matrix();
        assert_eq!(record.prev_clip_matrix, expected.to_cols_array_2d());
        assert_eq!(record.world(), object.world_matrix());
    }

    #[test]
    fn large_bins_are_split_across_tasks() {
        let config = SyncConfig {
            bin_partition_threshold: 4,
            ..small_config()
        };
        let mut builder = builder(&config);
        let sink = RecordingSink::new();

        let large = (0..10).map(|id| TestObject::new(id, red()).shared()).collect();
        let small = (10..12).map(|id| TestObject::new(id, blue()).shared()).collect();
        let mut queue = queue_of(vec![large, small]);

        let (list, stats) = run_frame(&mut builder, &mut queue, &sink);

        // two halves per pass for the large bin
        assert_eq!(stats.tasks_spawned, 4);
        assert_eq!(stats.objects_processed, 12);
        assert_eq!(list.command_count(), 12);

        let mut slots: Vec<u32> = (0..12)
            .map(|id| builder.indirection().get(ObjectId(id)).unwrap().transform_slot)
            .collect();
        slots.sort_unstable();
        slots.dedup();
        assert_eq!(slots.len(), 12);
    }

    #[test]
    fn transparent_objects_only_reach_transparent_passes() {
        let config = small_config();
        let mut builder = builder(&config);
        let sink = RecordingSink::new();

        let mut glass = TestObject::new(4, blue());
        glass.transparent = true;
        let mut queue = queue_of(vec![vec![TestObject::new(3, red()).shared(), glass.shared()]]);

        builder.prepare(&mut queue);
        let passes = StagePasses::opaque()
            .with_pre_pass()
            .with_transparency(TransparencyPass::OrderIndependent);
        let list = builder.build_draw_commands(&queue, passes, &sink).unwrap();

        assert_eq!(list.pass(PassKind::PrePass).unwrap().count(), 1);
        assert_eq!(list.pass(PassKind::Main).unwrap().count(), 1);
        let oit = list.pass(PassKind::Oit).unwrap();
        assert_eq!(oit.count(), 1);
        assert_eq!(oit.commands[0].first_instance, 4);
        assert!(list.pass(PassKind::Transparency).is_none());

        // pass regions never overlap
        let pre = list.pass(PassKind::PrePass).unwrap().region;
        let main = list.pass(PassKind::Main).unwrap().region;
        assert!(pre.byte_offset + pre.capacity as u64 * 20 <= main.byte_offset);
    }

    #[test]
    fn region_overflow_drops_extra_commands() {
        let config = SyncConfig {
            max_commands_per_stage_pass: 2,
            ..small_config()
        };
        let mut builder = builder(&config);
        let sink = RecordingSink::new();

        let objects = (0..5).map(|id| TestObject::new(id, red()).shared()).collect();
        let mut queue = queue_of(vec![objects]);
        let (list, stats) = run_frame(&mut builder, &mut queue, &sink);

        let main = list.pass(PassKind::Main).unwrap();
        assert_eq!(main.count(), 2);
        assert_eq!(main.overflowed, 3);
        assert_eq!(stats.commands_overflowed, 3);
    }

    #[test]
    fn unused_materials_are_evicted_after_their_lifetime() {
        let config = SyncConfig {
            max_concurrent_materials: 1,
            ring_length: 2,
            max_material_frame_lifetime: 2,
            ..small_config()
        };
        let mut builder = builder(&config);
        let sink = RecordingSink::new();

        let mut queue = queue_of(vec![vec![TestObject::new(0, red()).shared()]]);
        run_frame(&mut builder, &mut queue, &sink);

        // slot still young: the blue object is dropped
        let mut queue = queue_of(vec![vec![TestObject::new(1, blue()).shared()]]);
        let (_, stats) = run_frame(&mut builder, &mut queue, &sink);
        assert_eq!(stats.objects_dropped, 1);

        let mut queue = queue_of(vec![vec![TestObject::new(1, blue()).shared()]]);
        let (_, stats) = run_frame(&mut builder, &mut queue, &sink);
        assert_eq!(stats.objects_dropped, 0);
        assert_eq!(stats.material_evictions, 1);
        assert_eq!(builder.materials().get(0), Some(blue()));
    }

    #[test]
    fn failed_upload_still_reaches_every_ring_copy() {
        let config = small_config();
        let mut builder = builder(&config);
        let sink = FlakySink::new(BufferKind::Materials, 1);
        let object = TestObject::new(0, red()).shared();

        for frame in 0..=config.ring_length {
            let mut queue = queue_of(vec![vec![object.clone()]]);
            builder.prepare(&mut queue);
            let result = builder.build_draw_commands(&queue, StagePasses::default(), &sink);
            assert_eq!(result.is_err(), frame == 0, "frame {}", frame);
            let stats = builder.post_render();
            assert_eq!(stats.upload_failures, u64::from(frame == 0));
        }

        let expected = builder.indirection().get(ObjectId(0)).unwrap();
        for ring in 0..config.ring_length {
            let materials = BufferTarget::scene(RenderStage::Display, BufferKind::Materials, ring);
            let slot = expected.material_slot as u32;
            assert_eq!(sink.inner.read_element::<MaterialData>(materials, slot), Some(red()), "ring {}", ring);

            let indirection = BufferTarget::scene(RenderStage::Display, BufferKind::Indirection, ring);
            let entry = sink.inner.read_element::<IndirectionEntry>(indirection, 0).unwrap();
            assert_eq!(entry.material_slot, expected.material_slot, "ring {}", ring);
        }
    }

    #[test]
    fn failed_write_does_not_skip_other_buffers() {
        let config = small_config();
        let mut builder = builder(&config);
        let sink = FlakySink::new(BufferKind::Transforms, 1);

        let mut queue = queue_of(vec![vec![TestObject::new(2, red()).shared()]]);
        builder.prepare(&mut queue);
        assert!(builder
            .build_draw_commands(&queue, StagePasses::default(), &sink)
            .is_err());

        let writes = sink.inner.writes();
        assert!(writes.iter().any(|w| w.target.kind == BufferKind::Materials));
        assert!(writes.iter().any(|w| w.target.kind == BufferKind::Indirection));
        assert!(writes.iter().any(|w| w.target.kind == BufferKind::Commands));
        assert!(builder.transforms().dirty().current().contains(0));
    }
}
