//! Content-addressed material cache
//!
//! Identical material blocks share one GPU slot. Slots persist across frames
//! and are only reused once they have gone unused for at least
//! `max_material_frame_lifetime` frames, so no in-flight frame can still be
//! reading them.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::{capacity_error, PoolKind, SyncResult};
use crate::gpu::buffer_layouts::{MaterialData, INVALID_MATERIAL_HASH};
use crate::memory::{BufferUpdateRange, DirtyRangeTracker};

use super::frame_gate::FrameOnceGate;
use super::identity::ObjectId;

struct MaterialTable {
    hashes: Vec<u64>,
    data: Vec<MaterialData>,
}

impl MaterialTable {
    fn find(&self, hash: u64, material: &MaterialData) -> Option<usize> {
        self.hashes.iter().enumerate().find_map(|(slot, &h)| {
            (h == hash && bytemuck::bytes_of(&self.data[slot]) == bytemuck::bytes_of(material))
                .then_some(slot)
        })
    }

    fn find_free(&self) -> Option<usize> {
        self.hashes.iter().position(|&h| h == INVALID_MATERIAL_HASH)
    }
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Snapshot of cache activity
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MaterialCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub occupied: u32,
}

pub struct MaterialCache {
    table: RwLock<MaterialTable>,
    /// Frames since each slot was last used
    ages: Box<[AtomicU32]>,
    processed: FrameOnceGate,
    dirty: DirtyRangeTracker,
    capacity: u32,
    min_lifetime: u32,
    counters: CacheCounters,
}

impl MaterialCache {
    pub fn new(capacity: u32, min_lifetime: u32, ring_length: usize) -> Self {
        debug_assert!(capacity < u16::MAX as u32);
        Self {
            table: RwLock::new(MaterialTable {
                hashes: vec![INVALID_MATERIAL_HASH; capacity as usize],
                data: vec![MaterialData::default(); capacity as usize],
            }),
            ages: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
            processed: FrameOnceGate::new(),
            dirty: DirtyRangeTracker::new(capacity, ring_length),
            capacity,
            min_lifetime,
            counters: CacheCounters::default(),
        }
    }

    /// Slot holding `material`, inserting it if needed. The flag is true on a
    /// cache hit.
    pub fn lookup_or_insert(&self, material: &MaterialData) -> SyncResult<(u16, bool)> {
        let hash = material.content_hash();

        // Shared fast path
        if let Some(slot) = self.table.read().find(hash, material) {
            return Ok(self.hit(slot));
        }

        let mut table = self.table.write();

        // Another task may have inserted it since the read lock was dropped.
        if let Some(slot) = table.find(hash, material) {
            return Ok(self.hit(slot));
        }

        let slot = match table.find_free() {
            Some(slot) => slot,
            None => {
                let slot = self
                    .eviction_candidate()
                    .ok_or_else(|| capacity_error(PoolKind::Material, self.capacity))?;
                log::trace!(
                    "[MaterialCache::lookup_or_insert] Evicting slot {} (unused for {} frames)",
                    slot,
                    self.ages[slot].load(Ordering::Relaxed)
                );
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                slot
            }
        };

        table.hashes[slot] = hash;
        table.data[slot] = *material;
        self.ages[slot].store(0, Ordering::Relaxed);
        self.dirty.mark_touched(slot as u32);
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        Ok((slot as u16, false))
    }

    fn hit(&self, slot: usize) -> (u16, bool) {
        self.ages[slot].store(0, Ordering::Relaxed);
        self.dirty.note_referenced(slot as u32);
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        (slot as u16, true)
    }

    /// Oldest slot that has been unused for at least the minimum lifetime
    fn eviction_candidate(&self) -> Option<usize> {
        self.ages
            .iter()
            .enumerate()
            .map(|(slot, age)| (slot, age.load(Ordering::Relaxed)))
            .filter(|&(_, age)| age >= self.min_lifetime)
            .max_by_key(|&(_, age)| age)
            .map(|(slot, _)| slot)
    }

    /// End of frame: every occupied slot gets one frame older
    pub fn age_slots(&self) {
        let table = self.table.read();
        for (slot, &hash) in table.hashes.iter().enumerate() {
            if hash != INVALID_MATERIAL_HASH {
                let age = &self.ages[slot];
                age.store(age.load(Ordering::Relaxed).saturating_add(1), Ordering::Relaxed);
            }
        }
    }

    /// True for the first caller asking about `id` this frame
    pub fn node_needs_update(&self, id: ObjectId) -> bool {
        self.processed.try_claim(id)
    }

    pub fn clear_processed(&mut self) {
        self.processed.clear();
    }

    pub fn get(&self, slot: u16) -> Option<MaterialData> {
        let table = self.table.read();
        let slot = slot as usize;
        (slot < table.hashes.len() && table.hashes[slot] != INVALID_MATERIAL_HASH)
            .then(|| table.data[slot])
    }

    pub fn age(&self, slot: u16) -> Option<u32> {
        self.ages.get(slot as usize).map(|a| a.load(Ordering::Relaxed))
    }

    /// Material bytes for `range`, in slot order
    pub fn gather_bytes(&self, range: BufferUpdateRange) -> Vec<u8> {
        let table = self.table.read();
        let end = range.indices().end.min(self.capacity) as usize;
        let start = (range.indices().start as usize).min(end);
        bytemuck::cast_slice(&table.data[start..end]).to_vec()
    }

    pub fn occupied(&self) -> u32 {
        self.table
            .read()
            .hashes
            .iter()
            .filter(|&&h| h != INVALID_MATERIAL_HASH)
            .count() as u32
    }

    pub fn stats(&self) -> MaterialCacheStats {
        MaterialCacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            occupied: self.occupied(),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn dirty(&self) -> &DirtyRangeTracker {
        &self.dirty
    }

    pub fn dirty_mut(&mut self) -> &mut DirtyRangeTracker {
        &mut self.dirty
    }
}
