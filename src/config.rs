//! Scene sync configuration
//!
//! Every field has a default from `crate::constants`, so a TOML file only needs
//! to name the limits it changes:
//!
//! ```toml
//! max_visible_nodes = 4096
//! ring_length = 2
//! capacity_policy = "drop_and_log"
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::constants::{frames, lod, parallel, pools};
use crate::error::{SyncError, SyncResult};

/// What to do when a pool runs out while processing an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityPolicy {
    /// Panic after the parallel pass finishes
    Abort,
    /// Log the failure and leave the object out of this frame's draws
    DropAndLog,
}

impl Default for CapacityPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            CapacityPolicy::Abort
        } else {
            CapacityPolicy::DropAndLog
        }
    }
}

/// Static limits and tuning for the sync pipeline
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Stable object identities
    pub max_indirection_entries: u32,

    /// Transform slots per frame
    pub max_visible_nodes: u32,

    /// Material cache slots
    pub max_concurrent_materials: u32,

    /// Draw commands per stage/pass region
    pub max_commands_per_stage_pass: u32,

    /// GPU buffer copies in flight
    pub ring_length: usize,

    /// Minimum unused frames before a material slot is evictable
    pub max_material_frame_lifetime: u32,

    /// Bins larger than this are processed as two parallel tasks
    pub bin_partition_threshold: usize,

    /// Worker threads (defaults to the CPU count)
    pub worker_threads: Option<usize>,

    pub capacity_policy: CapacityPolicy,

    pub lod_bias: f32,
    pub max_draw_distance: f32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_indirection_entries: pools::MAX_INDIRECTION_ENTRIES,
            max_visible_nodes: pools::MAX_VISIBLE_NODES,
            max_concurrent_materials: pools::MAX_CONCURRENT_MATERIALS,
            max_commands_per_stage_pass: pools::MAX_COMMANDS_PER_STAGE_PASS,
            ring_length: frames::RING_LENGTH,
            max_material_frame_lifetime: frames::MAX_MATERIAL_FRAME_LIFETIME,
            bin_partition_threshold: parallel::BIN_PARTITION_THRESHOLD,
            worker_threads: None,
            capacity_policy: CapacityPolicy::default(),
            lod_bias: lod::DEFAULT_LOD_BIAS,
            max_draw_distance: lod::MAX_DRAW_DISTANCE,
        }
    }
}

impl SyncConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> SyncResult<Self> {
        let config: SyncConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)?;
        log::info!(
            "[SyncConfig::load] Loaded {} (ring {}, {} visible nodes, {} materials)",
            path.display(),
            config.ring_length,
            config.max_visible_nodes,
            config.max_concurrent_materials
        );
        Ok(config)
    }

    pub fn validate(&self) -> SyncResult<()> {
        let invalid = |msg: String| Err(SyncError::InvalidConfig(msg));

        if self.max_indirection_entries == 0 || self.max_indirection_entries == u32::MAX {
            return invalid(format!(
                "max_indirection_entries must be in 1..{}",
                u32::MAX
            ));
        }
        if self.max_visible_nodes == 0 || self.max_visible_nodes == u32::MAX {
            return invalid(format!("max_visible_nodes must be in 1..{}", u32::MAX));
        }
        if self.max_concurrent_materials == 0
            || self.max_concurrent_materials >= u16::MAX as u32
        {
            return invalid(format!(
                "max_concurrent_materials must be in 1..{}",
                u16::MAX
            ));
        }
        if self.max_commands_per_stage_pass == 0 {
            return invalid("max_commands_per_stage_pass must be non-zero".to_string());
        }
        if self.ring_length == 0 {
            return invalid("ring_length must be at least 1".to_string());
        }
        if (self.max_material_frame_lifetime as usize) < self.ring_length {
            return invalid(format!(
                "max_material_frame_lifetime ({}) is shorter than ring_length ({})",
                self.max_material_frame_lifetime, self.ring_length
            ));
        }
        if self.bin_partition_threshold == 0 {
            return invalid("bin_partition_threshold must be non-zero".to_string());
        }
        if self.worker_threads == Some(0) {
            return invalid("worker_threads must be non-zero when set".to_string());
        }
        if !(self.max_draw_distance > 0.0) {
            return invalid("max_draw_distance must be positive".to_string());
        }
        Ok(())
    }

    /// Worker thread count after applying the CPU-count default
    pub fn effective_worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or_else(num_cpus::get).max(1)
    }
}
