// Concurrent stage preparation tests
//
// Each stage owns a builder; stages run on their own threads against one
// sink and one shared worker pool.

use std::sync::Arc;
use std::thread;

use glam::{Mat4, Vec3, Vec4};

use gpu_scene_sync::gpu::buffer_layouts::MaterialData;
use gpu_scene_sync::{
    BinKind, BufferKind, DrawCommandBuilder, MeshDrawRange, ObjectId, PassKind, RecordingSink, RenderBin,
    RenderQueue, RenderStage, Renderable, StagePasses, SyncConfig, WorkerPool, WorkerPoolConfig,
};

struct Pallet {
    id: ObjectId,
    position: Vec3,
}

impl Renderable for Pallet {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn world_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.position)
    }

    fn bounding_sphere(&self) -> Vec4 {
        self.position.extend(0.5)
    }

    fn material(&self) -> MaterialData {
        MaterialData::new([0.6, 0.4, 0.2, 1.0], 0.0, 0.9).with_textures([self.id.0 % 3, 0, 0, 0])
    }

    fn draw_range(&self, _pass: PassKind, _lod: u8) -> Option<MeshDrawRange> {
        Some(MeshDrawRange {
            index_count: 36,
            first_index: 0,
            base_vertex: 0,
        })
    }
}

fn pallets(count: u32) -> Vec<Arc<dyn Renderable>> {
    (0..count)
        .map(|i| {
            Arc::new(Pallet {
                id: ObjectId(i),
                position: Vec3::new((i % 10) as f32, 0.0, (i / 10) as f32),
            }) as Arc<dyn Renderable>
        })
        .collect()
}

fn binned(objects: &[Arc<dyn Renderable>], bin_size: usize) -> RenderQueue {
    let mut queue = RenderQueue::new();
    for chunk in objects.chunks(bin_size) {
        let mut bin = RenderBin::new(BinKind::Opaque);
        for object in chunk {
            bin.push(object.clone(), 16.0);
        }
        queue.push_bin(bin);
    }
    queue
}

#[test]
fn test_stages_prepare_concurrently() {
    let config = SyncConfig {
        max_indirection_entries: 512,
        max_visible_nodes: 512,
        max_concurrent_materials: 16,
        max_commands_per_stage_pass: 512,
        bin_partition_threshold: 8,
        ..SyncConfig::default()
    };
    let pool = Arc::new(WorkerPool::new(WorkerPoolConfig::with_threads(4)).unwrap());
    let sink = Arc::new(RecordingSink::new());
    let objects = pallets(200);

    let handles: Vec<_> = RenderStage::ALL
        .iter()
        .map(|&stage| {
            let config = config.clone();
            let pool = pool.clone();
            let sink = sink.clone();
            let objects = objects.clone();
            thread::spawn(move || {
                let mut builder = DrawCommandBuilder::new(stage, &config, pool).unwrap();
                let mut totals = Vec::new();
                for _ in 0..4 {
                    let mut queue = binned(&objects, 32);
                    builder.prepare(&mut queue);
                    let list = builder
                        .build_draw_commands(&queue, StagePasses::opaque(), sink.as_ref())
                        .unwrap();
                    totals.push(list.command_count());
                    builder.post_render();
                }
                (stage, totals, builder.materials().occupied())
            })
        })
        .collect();

    for handle in handles {
        let (stage, totals, materials) = handle.join().unwrap();
        assert_eq!(totals, vec![200; 4], "{}", stage.name());
        assert_eq!(materials, 3, "{}", stage.name());
    }

    let writes = sink.writes();
    for stage in RenderStage::ALL {
        assert!(writes
            .iter()
            .any(|w| w.target.stage == Some(stage) && w.target.kind == BufferKind::Transforms));
    }
    // no two writes to the same command buffer copy overlap within a frame's region set
    let mut command_writes: Vec<_> = writes
        .iter()
        .filter(|w| w.target.kind == BufferKind::Commands && w.target.ring_index == 0)
        .map(|w| (w.byte_offset, w.byte_offset + w.byte_len))
        .collect();
    command_writes.sort_unstable();
    command_writes.dedup();
    for pair in command_writes.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "{:?}", pair);
    }
}

#[test]
fn test_every_object_gets_a_unique_transform_slot() {
    let config = SyncConfig {
        max_visible_nodes: 1000,
        bin_partition_threshold: 4,
        ..SyncConfig::default()
    };
    let pool = Arc::new(WorkerPool::new(WorkerPoolConfig::with_threads(8)).unwrap());
    let mut builder = DrawCommandBuilder::new(RenderStage::Reflection, &config, pool).unwrap();
    let objects = pallets(1000);

    // same objects appear in two bins each
    let mut doubled = objects.clone();
    doubled.extend(objects.iter().rev().cloned());
    let mut queue = binned(&doubled, 50);
    builder.prepare(&mut queue);

    let mut slots: Vec<u32> = (0..1000)
        .map(|i| builder.indirection().get(ObjectId(i)).unwrap().transform_slot)
        .collect();
    slots.sort_unstable();
    slots.dedup();
    assert_eq!(slots.len(), 1000);
    assert_eq!(builder.transforms().acquired_count(), 1000);
}
