use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-frame counters, bumped lock-free from the parallel passes
#[derive(Debug, Default)]
pub struct FrameCounters {
    pub objects_processed: AtomicU64,
    pub transform_writes: AtomicU64,
    pub material_hits: AtomicU64,
    pub material_misses: AtomicU64,
    pub objects_culled: AtomicU64,
    pub objects_dropped: AtomicU64,
    pub nodes_pruned: AtomicU64,
    pub commands_emitted: AtomicU64,
    pub commands_overflowed: AtomicU64,
    pub upload_calls: AtomicU64,
    pub upload_bytes: AtomicU64,
    pub upload_failures: AtomicU64,
    pub tasks_spawned: AtomicU64,
}

impl FrameCounters {
    #[inline]
    pub fn add(counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }

    /// Read and zero every counter
    pub fn take(&self) -> FrameStats {
        let take = |c: &AtomicU64| c.swap(0, Ordering::Relaxed);
        FrameStats {
            objects_processed: take(&self.objects_processed),
            transform_writes: take(&self.transform_writes),
            material_hits: take(&self.material_hits),
            material_misses: take(&self.material_misses),
            material_evictions: 0,
            objects_culled: take(&self.objects_culled),
            objects_dropped: take(&self.objects_dropped),
            nodes_pruned: take(&self.nodes_pruned),
            commands_emitted: take(&self.commands_emitted),
            commands_overflowed: take(&self.commands_overflowed),
            upload_calls: take(&self.upload_calls),
            upload_bytes: take(&self.upload_bytes),
            upload_failures: take(&self.upload_failures),
            tasks_spawned: take(&self.tasks_spawned),
        }
    }
}

/// Diagnostics for one stage and frame
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// Objects that went through the transform pass
    pub objects_processed: u64,
    pub transform_writes: u64,
    pub material_hits: u64,
    pub material_misses: u64,
    pub material_evictions: u64,
    /// Objects beyond the max draw distance
    pub objects_culled: u64,
    /// Objects left out after a pool ran out
    pub objects_dropped: u64,
    /// Nodes removed because they were not draw-ready
    pub nodes_pruned: u64,
    pub commands_emitted: u64,
    pub commands_overflowed: u64,
    pub upload_calls: u64,
    pub upload_bytes: u64,
    /// Writes the sink rejected; their ranges were requeued
    pub upload_failures: u64,
    pub tasks_spawned: u64,
}

impl FrameStats {
    pub fn material_hit_rate(&self) -> f32 {
        let lookups = self.material_hits + self.material_misses;
        if lookups == 0 {
            0.0
        } else {
            self.material_hits as f32 / lookups as f32
        }
    }
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} objects, {} transforms, materials {}/{} hit ({} evicted), {} commands, {} uploads ({} bytes, {} failed), {} culled, {} dropped",
            self.objects_processed,
            self.transform_writes,
            self.material_hits,
            self.material_hits + self.material_misses,
            self.material_evictions,
            self.commands_emitted,
            self.upload_calls,
            self.upload_bytes,
            self.upload_failures,
            self.objects_culled,
            self.objects_dropped
        )
    }
}
