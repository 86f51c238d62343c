//! Scene sync stress run
//!
//! Spins up every render stage against a recording sink, churns a random
//! scene for a number of frames and prints per-stage frame statistics.
//!
//! Usage: sync_stress [config.toml] [frames] [objects]

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use glam::{Mat4, Quat, Vec3, Vec4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use gpu_scene_sync::gpu::buffer_layouts::MaterialData;
use gpu_scene_sync::renderer::gpu_driven::LodConfig;
use gpu_scene_sync::{
    BinKind, DrawCommandBuilder, FrameStats, IdentityAllocator, MeshDrawRange, ObjectHandle, ObjectId, PassKind,
    RecordingSink, RenderBin, RenderQueue, RenderStage, Renderable, StagePasses, SyncConfig, TransparencyPass,
    WorkerPool, WorkerPoolConfig,
};

struct StressObject {
    handle: ObjectHandle,
    position: Vec3,
    rotation: Quat,
    previous: Mat4,
    material: MaterialData,
    lod: LodConfig,
    translucent: bool,
}

impl Renderable for StressObject {
    fn object_id(&self) -> ObjectId {
        self.handle.id()
    }

    fn world_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    fn previous_world_matrix(&self) -> Mat4 {
        self.previous
    }

    fn bounding_sphere(&self) -> Vec4 {
        self.position.extend(self.lod.bounding_radius)
    }

    fn material(&self) -> MaterialData {
        self.material
    }

    fn lod_config(&self) -> Option<&LodConfig> {
        Some(&self.lod)
    }

    fn draw_range(&self, pass: PassKind, lod: u8) -> Option<MeshDrawRange> {
        let translucent_pass = matches!(pass, PassKind::Oit | PassKind::Transparency);
        (translucent_pass == self.translucent).then_some(MeshDrawRange {
            index_count: 3072 >> (lod * 2),
            first_index: 0,
            base_vertex: 0,
        })
    }
}

fn random_object(rng: &mut StdRng, ids: &Arc<IdentityAllocator>, palette: &[MaterialData]) -> Result<StressObject> {
    let position = Vec3::new(
        rng.gen_range(-300.0..300.0),
        rng.gen_range(0.0..40.0),
        rng.gen_range(-300.0..300.0),
    );
    let rotation = Quat::from_rotation_y(rng.gen_range(0.0..std::f32::consts::TAU));
    Ok(StressObject {
        handle: ids.allocate_handle().context("identity pool exhausted")?,
        position,
        rotation,
        previous: Mat4::from_rotation_translation(rotation, position),
        material: palette[rng.gen_range(0..palette.len())],
        lod: LodConfig::for_entity(rng.gen_range(0.5..4.0)),
        translucent: rng.gen_bool(0.1),
    })
}

fn build_queue(objects: &[Arc<StressObject>], camera: Vec3) -> RenderQueue {
    let mut opaque = RenderBin::new(BinKind::Opaque);
    let mut translucent = RenderBin::new(BinKind::Translucent);
    for object in objects {
        let bin = if object.translucent { &mut translucent } else { &mut opaque };
        let shared: Arc<dyn Renderable> = object.clone();
        bin.push(shared, object.position.distance_squared(camera));
    }
    opaque
        .nodes
        .sort_by(|a, b| a.distance_sq.total_cmp(&b.distance_sq));
    translucent
        .nodes
        .sort_by(|a, b| b.distance_sq.total_cmp(&a.distance_sq));

    let mut queue = RenderQueue::new();
    queue.push_bin(opaque);
    queue.push_bin(translucent);
    queue
}

fn main() -> Result<()> {
    gpu_scene_sync::init_logging();

    let args: Vec<String> = std::env::args().collect();
    let config = match args.get(1) {
        Some(path) => SyncConfig::load(path).with_context(|| format!("loading {}", path))?,
        None => SyncConfig::default(),
    };
    let frames: u32 = args.get(2).map(|s| s.parse()).transpose()?.unwrap_or(120);
    let object_count: usize = args.get(3).map(|s| s.parse()).transpose()?.unwrap_or(5000);

    println!("Scene Sync Stress Run");
    println!("=====================");
    println!("  Frames: {}", frames);
    println!("  Objects: {}", object_count);
    println!("  Ring length: {}", config.ring_length);
    println!("  Worker threads: {}", config.effective_worker_threads());
    println!();

    let pool = Arc::new(WorkerPool::new(WorkerPoolConfig::with_threads(config.effective_worker_threads()))?);
    let sink = RecordingSink::new();
    let ids = Arc::new(IdentityAllocator::new(config.max_indirection_entries));
    let mut rng = StdRng::seed_from_u64(0x5eed);

    let palette: Vec<MaterialData> = (0..config.max_concurrent_materials.min(256))
        .map(|i| {
            let hue = i as f32 / 256.0;
            MaterialData::new([hue, 1.0 - hue, 0.5, 1.0], rng.gen(), rng.gen())
        })
        .collect();

    let mut objects = Vec::with_capacity(object_count);
    for _ in 0..object_count {
        objects.push(Arc::new(random_object(&mut rng, &ids, &palette)?));
    }

    let mut builders = RenderStage::ALL
        .iter()
        .map(|&stage| DrawCommandBuilder::new(stage, &config, pool.clone()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut totals: Vec<FrameStats> = vec![FrameStats::default(); builders.len()];
    let start = Instant::now();

    for frame in 0..frames {
        let angle = frame as f32 * 0.01;
        let camera = Vec3::new(angle.cos() * 50.0, 10.0, angle.sin() * 50.0);
        let view_projection = Mat4::perspective_rh(1.0, 16.0 / 9.0, 0.1, 1000.0)
            * Mat4::look_at_rh(camera, Vec3::ZERO, Vec3::Y);

        // churn a few percent of the scene
        for _ in 0..object_count / 50 {
            let index = rng.gen_range(0..objects.len());
            objects.swap_remove(index);
            objects.push(Arc::new(random_object(&mut rng, &ids, &palette)?));
        }

        for (builder, total) in builders.iter_mut().zip(totals.iter_mut()) {
            let passes = match builder.stage() {
                RenderStage::Shadow => StagePasses::opaque(),
                _ => StagePasses::opaque()
                    .with_pre_pass()
                    .with_transparency(TransparencyPass::OrderIndependent),
            };

            builder.set_view_projection(view_projection);
            let mut queue = build_queue(&objects, camera);
            builder.prepare(&mut queue);
            builder.build_draw_commands(&queue, passes, &sink)?;
            let stats = builder.post_render();
            accumulate(total, &stats);
        }
        sink.take_writes();
    }

    let elapsed = start.elapsed();
    println!("Completed {} frames in {:.2?} ({:.2?} per frame)", frames, elapsed, elapsed / frames.max(1));
    for (builder, total) in builders.iter().zip(&totals) {
        println!(
            "  {:<10} {} (hit rate {:.1}%)",
            builder.stage().name(),
            total,
            total.material_hit_rate() * 100.0
        );
    }
    let pool_stats = pool.stats();
    println!(
        "  Worker pool: {} threads, {} fork-joins, {} tasks",
        pool.num_threads(),
        pool_stats.scopes_run, pool_stats.tasks_spawned
    );

    Ok(())
}

fn accumulate(total: &mut FrameStats, frame: &FrameStats) {
    total.objects_processed += frame.objects_processed;
    total.transform_writes += frame.transform_writes;
    total.material_hits += frame.material_hits;
    total.material_misses += frame.material_misses;
    total.material_evictions += frame.material_evictions;
    total.objects_culled += frame.objects_culled;
    total.objects_dropped += frame.objects_dropped;
    total.nodes_pruned += frame.nodes_pruned;
    total.commands_emitted += frame.commands_emitted;
    total.commands_overflowed += frame.commands_overflowed;
    total.upload_calls += frame.upload_calls;
    total.upload_bytes += frame.upload_bytes;
    total.upload_failures += frame.upload_failures;
    total.tasks_spawned += frame.tasks_spawned;
}
