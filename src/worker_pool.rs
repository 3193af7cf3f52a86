//! Bounded pool for blocking file work, with replies delivered back on the
//! backend's sequence.
//!
//! The backend and its entries are `!Send` and live on a tokio `LocalSet`.
//! Blocking tasks run on tokio's blocking threads, at most `max_concurrency`
//! at a time; their results come back through a `spawn_local` task so
//! replies only ever touch backend state from the sequence.

use crate::error::{CacheError, Result};
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tokio::sync::Semaphore;
use tracing::error;

/// Concurrency used by `WorkerPool::shared()`.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

#[derive(Clone, Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    max_concurrency: usize,
}

static SHARED: OnceLock<WorkerPool> = OnceLock::new();

impl WorkerPool {
    pub fn new(max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    /// Process-wide pool, built on first use. Only the outermost
    /// constructor (`SimpleBackend::new`) reaches for it; everything else
    /// receives a pool explicitly.
    pub fn shared() -> WorkerPool {
        SHARED
            .get_or_init(|| WorkerPool::new(DEFAULT_MAX_CONCURRENCY))
            .clone()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run `task` on a blocking thread and hand its result to `reply` on the
    /// current sequence. Must be called from within a `LocalSet`.
    pub(crate) fn post_task_and_reply<T, F, R>(&self, task: F, reply: R)
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
        R: FnOnce(Result<T>) + 'static,
    {
        let permits = self.permits.clone();
        post_future(async move {
            let result = match permits.acquire_owned().await {
                Ok(permit) => tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    task()
                })
                .await
                .unwrap_or_else(|join_err| {
                    error!(error = %join_err, "worker pool task did not complete");
                    Err(CacheError::Failed)
                }),
                Err(_) => Err(CacheError::Aborted),
            };
            reply(result);
        });
    }
}

/// Run `f` later on the current sequence. Used wherever a callback must not
/// fire re-entrantly from inside the call that scheduled it.
pub(crate) fn post_to_sequence<F>(f: F)
where
    F: FnOnce() + 'static,
{
    post_future(async move { f() });
}

fn post_future<Fut>(fut: Fut)
where
    Fut: Future<Output = ()> + 'static,
{
    // Detached: completion is observed through the reply, not the handle.
    drop(tokio::task::spawn_local(fut));
}
