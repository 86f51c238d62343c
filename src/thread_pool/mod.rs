// Worker pool for the parallel sync passes
pub mod thread_pool;

pub use thread_pool::{PoolCounters, WorkerPool, WorkerPoolConfig, WorkerPoolStats};
