//! Reader worker supervision.
//!
//! # Responsibilities
//! - Spawn exactly one named reader task per connected transport
//! - Track which workers are live, by name
//! - Stop a worker and wait until it has fully exited
//! - Track detached teardown tasks so shutdown can wait for them

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::observability::metrics;

/// Prefix shared by every reader worker name.
pub const WORKER_NAME_PREFIX: &str = "Transport";

/// Spawns and stops reader workers.
///
/// Cloning is cheap; clones share the same live-worker registry and the
/// same cancellation scope. [`scoped`](Self::scoped) shares the registry
/// under a narrower scope.
#[derive(Debug, Clone)]
pub struct WorkerSupervisor {
    /// Live workers: registration key -> worker name.
    live: Arc<DashMap<u64, String>>,
    next_key: Arc<AtomicU64>,
    /// Parent of every worker token spawned through this scope.
    root: CancellationToken,
    /// Detached teardown tasks.
    teardowns: TaskTracker,
    grace: Duration,
}

impl WorkerSupervisor {
    /// Create a supervisor whose `terminate` waits up to `grace` before aborting.
    pub fn new(grace: Duration) -> Self {
        Self {
            live: Arc::new(DashMap::new()),
            next_key: Arc::new(AtomicU64::new(1)),
            root: CancellationToken::new(),
            teardowns: TaskTracker::new(),
            grace,
        }
    }

    /// A supervisor sharing this registry whose workers are cancelled by
    /// [`cancel_all`](Self::cancel_all) on the returned value, or on this one,
    /// but not by sibling scopes.
    pub fn scoped(&self) -> Self {
        Self {
            live: Arc::clone(&self.live),
            next_key: Arc::clone(&self.next_key),
            root: self.root.child_token(),
            teardowns: self.teardowns.clone(),
            grace: self.grace,
        }
    }

    /// Grace period granted to a worker after cancellation.
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Spawn a worker. `work` receives the token it must observe.
    ///
    /// The worker is registered as live before this returns and stays
    /// registered until its task has finished or been aborted.
    pub fn spawn<W, F>(&self, name: String, work: W) -> WorkerHandle
    where
        W: FnOnce(CancellationToken) -> F,
        F: Future<Output = ()> + Send + 'static,
    {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        self.live.insert(key, name.clone());
        metrics::record_workers_active(self.live.len());

        let guard = WorkerGuard {
            live: Arc::clone(&self.live),
            key,
            name: name.clone(),
        };
        let token = self.root.child_token();
        let fut = work(token.clone());

        let join = tokio::spawn(async move {
            let _guard = guard;
            fut.await;
        });

        tracing::debug!(worker = %name, "Worker spawned");

        WorkerHandle { name, token, join }
    }

    /// Cancel a worker and wait for it to exit.
    ///
    /// If the worker has not exited within the grace period it is aborted;
    /// either way it is gone when this returns.
    pub async fn terminate(&self, handle: WorkerHandle) {
        let WorkerHandle { name, token, mut join } = handle;
        token.cancel();

        match tokio::time::timeout(self.grace, &mut join).await {
            Ok(Ok(())) => {
                tracing::debug!(worker = %name, "Worker stopped");
            }
            Ok(Err(e)) => {
                tracing::warn!(worker = %name, error = %e, "Worker ended abnormally");
            }
            Err(_) => {
                tracing::warn!(worker = %name, grace = ?self.grace, "Worker ignored cancellation, aborting");
                join.abort();
                let _ = join.await;
                metrics::record_worker_abort();
            }
        }
    }

    /// Names of all live workers.
    pub fn live_workers(&self) -> Vec<String> {
        self.live.iter().map(|e| e.value().clone()).collect()
    }

    /// Names of live workers starting with `prefix`.
    pub fn live_workers_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.live
            .iter()
            .filter(|e| e.value().starts_with(prefix))
            .map(|e| e.value().clone())
            .collect()
    }

    /// Number of live workers.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Cancel every worker spawned through this scope.
    pub fn cancel_all(&self) {
        self.root.cancel();
    }

    /// Run a teardown future in the background, tracked until it finishes.
    pub(crate) fn spawn_teardown<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.teardowns.spawn(fut);
    }

    /// Number of teardown tasks still running.
    pub fn pending_teardowns(&self) -> usize {
        self.teardowns.len()
    }

    /// Wait until no teardown task is running, or `limit` passes.
    pub async fn wait_teardowns(&self, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        while !self.teardowns.is_empty() {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }

    /// Wait until no worker is live, or `limit` passes.
    ///
    /// Returns whether the registry drained.
    pub async fn wait_idle(&self, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        while !self.live.is_empty() {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }
}

impl Default for WorkerSupervisor {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// Handle to a running worker, consumed by [`WorkerSupervisor::terminate`].
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the worker task has already returned.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Deregisters a worker when its task future is dropped.
struct WorkerGuard {
    live: Arc<DashMap<u64, String>>,
    key: u64,
    name: String,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.live.remove(&self.key);
        metrics::record_workers_active(self.live.len());
        tracing::trace!(worker = %self.name, "Worker deregistered");
    }
}
