//! wgpu backed buffer sink
//!
//! Owns every ring copy of the managed buffers and forwards writes to
//! `Queue::write_buffer`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::config::SyncConfig;
use crate::error::{gpu_write_error, SyncResult};
use crate::gpu::buffer_layouts::calculations::padded_buffer_size;
use crate::gpu::buffer_layouts::{usage, COPY_ALIGNMENT};
use crate::gpu::buffer_sink::{validate_write, BufferKind, BufferLock, BufferSink, BufferTarget};
use crate::renderer::gpu_driven::{CommandRegion, DescriptorBinding, RenderStage};

const SCENE_KINDS: [BufferKind; 3] = [BufferKind::Transforms, BufferKind::Materials, BufferKind::Indirection];

pub struct WgpuBufferSink {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    buffers: FxHashMap<BufferTarget, wgpu::Buffer>,
    next_lock: AtomicU64,
}

impl WgpuBufferSink {
    /// Allocate `ring_length` copies of the command buffer and of each
    /// stage's scene buffers
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        config: &SyncConfig,
        stages: &[RenderStage],
    ) -> SyncResult<Self> {
        config.validate()?;

        let mut buffers = FxHashMap::default();
        let mut total_bytes = 0u64;

        for ring_index in 0..config.ring_length {
            let target = BufferTarget::commands(ring_index);
            let size = CommandRegion::buffer_size(config.max_commands_per_stage_pass);
            total_bytes += size;
            buffers.insert(target, Self::create_buffer(&device, target, size, usage::INDIRECT));

            for &stage in stages {
                for kind in SCENE_KINDS {
                    let capacity = match kind {
                        BufferKind::Transforms => config.max_visible_nodes,
                        BufferKind::Materials => config.max_concurrent_materials,
                        _ => config.max_indirection_entries,
                    };
                    let target = BufferTarget::scene(stage, kind, ring_index);
                    let size = padded_buffer_size(capacity, kind.element_size(), COPY_ALIGNMENT);
                    total_bytes += size;
                    buffers.insert(target, Self::create_buffer(&device, target, size, usage::STORAGE));
                }
            }
        }

        log::info!(
            "[WgpuBufferSink::new] {} buffers for {} stages, {:.2} MB",
            buffers.len(),
            stages.len(),
            total_bytes as f64 / (1024.0 * 1024.0)
        );

        Ok(Self {
            device,
            queue,
            buffers,
            next_lock: AtomicU64::new(0),
        })
    }

    fn create_buffer(device: &wgpu::Device, target: BufferTarget, size: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        let label = target.to_string();
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    pub fn buffer(&self, target: BufferTarget) -> Option<&wgpu::Buffer> {
        self.buffers.get(&target)
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    /// Bind group entries for a stage draw list's bindings
    pub fn bind_group_entries<'a>(
        &'a self,
        bindings: &[DescriptorBinding],
    ) -> SyncResult<Vec<wgpu::BindGroupEntry<'a>>> {
        bindings
            .iter()
            .map(|b| {
                let buffer = self
                    .buffer(b.target)
                    .ok_or_else(|| gpu_write_error(b.target, "no such buffer"))?;
                let size = wgpu::BufferSize::new(b.byte_size)
                    .ok_or_else(|| gpu_write_error(b.target, "zero sized binding"))?;
                Ok(wgpu::BindGroupEntry {
                    binding: b.binding,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer,
                        offset: b.byte_offset,
                        size: Some(size),
                    }),
                })
            })
            .collect()
    }
}

impl BufferSink for WgpuBufferSink {
    fn write_data(&self, target: BufferTarget, byte_offset: u64, data: &[u8]) -> SyncResult<BufferLock> {
        validate_write(target, byte_offset, data.len(), COPY_ALIGNMENT)?;

        let buffer = self
            .buffer(target)
            .ok_or_else(|| gpu_write_error(target, "no such buffer"))?;
        let end = byte_offset + data.len() as u64;
        if end > buffer.size() {
            return Err(gpu_write_error(
                target,
                format!("write ends at {} past buffer size {}", end, buffer.size()),
            ));
        }

        self.queue.write_buffer(buffer, byte_offset, data);

        Ok(BufferLock {
            id: self.next_lock.fetch_add(1, Ordering::Relaxed),
            target,
            byte_offset,
            byte_len: data.len() as u64,
        })
    }
}
