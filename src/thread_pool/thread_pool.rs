/// Worker Pool
///
/// Shared rayon pool used by the per-frame sync passes. All parallel work is
/// fork-join: a pass spawns its tasks inside a scope and the scope end is the
/// barrier before the next dependent step.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::constants::parallel::WORKER_STACK_SIZE;
use crate::error::{SyncError, SyncResult};

/// Configuration for the worker pool
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads
    pub num_threads: usize,
    /// Enable thread naming
    pub enable_thread_names: bool,
    /// Stack size for worker threads (in bytes)
    pub stack_size: Option<usize>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: num_cpus::get().max(1),
            enable_thread_names: true,
            stack_size: Some(WORKER_STACK_SIZE),
        }
    }
}

impl WorkerPoolConfig {
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: num_threads.max(1),
            ..Self::default()
        }
    }
}

/// Lock-free counters for pool usage
#[derive(Debug, Default)]
pub struct PoolCounters {
    pub scopes_run: AtomicU64,
    pub tasks_spawned: AtomicU64,
}

/// Snapshot of `PoolCounters`
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolStats {
    pub scopes_run: u64,
    pub tasks_spawned: u64,
}

pub struct WorkerPool {
    pool: Arc<ThreadPool>,
    config: WorkerPoolConfig,
    counters: PoolCounters,
}

static GLOBAL_WORKER_POOL: OnceLock<Arc<WorkerPool>> = OnceLock::new();

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> SyncResult<Self> {
        let mut builder = ThreadPoolBuilder::new().num_threads(config.num_threads.max(1));

        if config.enable_thread_names {
            builder = builder.thread_name(|idx| format!("scene-sync-{}", idx));
        }

        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let pool = builder.build().map_err(|e| {
            SyncError::InvalidConfig(format!("failed to build worker pool: {}", e))
        })?;

        log::debug!(
            "[WorkerPool::new] Started {} worker threads",
            pool.current_num_threads()
        );

        Ok(Self {
            pool: Arc::new(pool),
            config,
            counters: PoolCounters::default(),
        })
    }

    /// Shared pool sized to the CPU count, created on first use
    pub fn global() -> SyncResult<Arc<WorkerPool>> {
        if let Some(pool) = GLOBAL_WORKER_POOL.get() {
            return Ok(Arc::clone(pool));
        }
        let pool = Arc::new(Self::new(WorkerPoolConfig::default())?);
        // A racing initializer may have won; use whichever pool was stored.
        Ok(Arc::clone(GLOBAL_WORKER_POOL.get_or_init(|| pool)))
    }

    /// Run `op` inside a scope on this pool and block until every task it
    /// spawned has finished.
    pub fn fork_join<'scope, OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce(&rayon::Scope<'scope>) -> R + Send,
        R: Send,
    {
        self.counters.scopes_run.fetch_add(1, Ordering::Relaxed);
        self.pool.install(|| rayon::scope(op))
    }

    /// Count a task spawned inside `fork_join`
    #[inline]
    pub fn note_spawn(&self) {
        self.counters.tasks_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            scopes_run: self.counters.scopes_run.load(Ordering::Relaxed),
            tasks_spawned: self.counters.tasks_spawned.load(Ordering::Relaxed),
        }
    }
}
