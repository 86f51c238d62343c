//! Scene sync error handling
//!
//! Capacity errors are configuration problems: the static limits in
//! `SyncConfig` are too small for the scene. They are never retried.

use std::fmt;
use thiserror::Error;

/// Pools that can run out of capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    /// Stable object identities
    Identity,
    /// Per-frame transform slots
    Transform,
    /// Deduplicated material blocks
    Material,
    /// Indirect command region of one stage/pass
    Commands,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PoolKind::Identity => "identity",
            PoolKind::Transform => "transform",
            PoolKind::Material => "material",
            PoolKind::Commands => "command",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{pool} pool capacity exceeded ({capacity} entries)")]
    CapacityExceeded { pool: PoolKind, capacity: u32 },

    #[error("transform slot pool exhausted ({capacity} slots)")]
    PoolExhausted { capacity: u32 },

    #[error("object identity {0} is not live")]
    UnknownIdentity(u32),

    #[error("{pool} slot {slot} out of range (capacity {capacity})")]
    SlotOutOfRange {
        pool: PoolKind,
        slot: u32,
        capacity: u32,
    },

    #[error("invalid sync configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse sync configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to read sync configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("GPU write to {target} failed: {reason}")]
    GpuWrite { target: String, reason: String },
}

impl SyncError {
    /// Pool and slot exhaustion. These mean the configured limits are too small.
    pub fn is_capacity_error(&self) -> bool {
        matches!(
            self,
            SyncError::CapacityExceeded { .. } | SyncError::PoolExhausted { .. }
        )
    }
}

/// Type alias for scene sync results
pub type SyncResult<T> = Result<T, SyncError>;

/// Create a capacity error for `pool`
pub fn capacity_error(pool: PoolKind, capacity: u32) -> SyncError {
    SyncError::CapacityExceeded { pool, capacity }
}

/// Create an out of range error for `slot` in `pool`
pub fn slot_out_of_range(pool: PoolKind, slot: u32, capacity: u32) -> SyncError {
    SyncError::SlotOutOfRange {
        pool,
        slot,
        capacity,
    }
}

/// Create a GPU write error
pub fn gpu_write_error(target: impl fmt::Display, reason: impl fmt::Display) -> SyncError {
    SyncError::GpuWrite {
        target: target.to_string(),
        reason: reason.to_string(),
    }
}
