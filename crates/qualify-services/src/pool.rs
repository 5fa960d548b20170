//! Shared worker pool for probe dispatch.
//!
//! Tasks are plain closures run on tokio tasks, at most `limit` at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("worker pool is closed")]
pub struct PoolClosed;

pub struct WorkerPool {
    handle: Handle,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
    limit: usize,
}

impl WorkerPool {
    /// Pool on `handle`. `limit == 0` means available parallelism.
    pub fn new(handle: Handle, limit: usize) -> Self {
        let limit = if limit == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            limit
        };
        tracing::info!(max_concurrent = limit, "worker pool started");
        Self {
            handle,
            permits: Arc::new(Semaphore::new(limit)),
            closed: AtomicBool::new(false),
            limit,
        }
    }

    /// Pool on the current runtime. Panics outside a runtime, like
    /// `Handle::current`.
    pub fn current(limit: usize) -> Self {
        Self::new(Handle::current(), limit)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Queue `task`. Fails once the pool is closed; the task is dropped.
    pub fn enqueue<F>(&self, task: F) -> Result<(), PoolClosed>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_closed() {
            return Err(PoolClosed);
        }
        let permits = self.permits.clone();
        self.handle.spawn(async move {
            // A closed semaphore means shutdown; queued work is dropped.
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            task();
        });
        Ok(())
    }

    /// Refuse new work and drop anything still waiting for a permit.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.permits.close();
            tracing::info!("worker pool closed");
        }
    }
}
