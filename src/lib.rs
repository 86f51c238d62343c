pub mod config;
pub mod constants;
pub mod error;
pub mod gpu;
pub mod memory;
pub mod renderer;
pub mod thread_pool;

pub use config::{CapacityPolicy, SyncConfig};
pub use error::{PoolKind, SyncError, SyncResult};
pub use gpu::{BufferKind, BufferLock, BufferSink, BufferTarget, RecordingSink, WgpuBufferSink};
pub use memory::{BufferUpdateRange, DirtyRangeTracker};
pub use renderer::gpu_driven::{
    BinKind, DrawCommandBuilder, FrameStats, IdentityAllocator, MeshDrawRange, ObjectHandle, ObjectId, PassKind,
    RenderBin, RenderQueue, RenderStage, Renderable, StageDrawList, StagePasses, TransparencyPass, VisibleNode,
};
pub use thread_pool::{WorkerPool, WorkerPoolConfig};

/// Initialize env_logger with the crate's default filter, once
pub fn init_logging() {
    if let Err(e) = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init() {
        log::debug!("[init_logging] env_logger already initialized: {}", e);
    }
}
