//! Tracking of fire-and-forget background work.
//!
//! # Responsibilities
//! - Register a task before it starts, deregister when it ends
//! - Survive panics inside tasks (logged, still deregistered)
//! - Let shutdown wait until every registered task has finished

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::observability::metrics;

/// Using relaxed ordering is sufficient since we only need uniqueness.
static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        Self(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Counts background tasks in flight.
#[derive(Debug, Clone)]
pub struct BackgroundTasks {
    active: Arc<watch::Sender<usize>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { active: Arc::new(tx) }
    }

    /// Record a new task. The count drops again when the guard is dropped.
    pub fn track(&self) -> TaskGuard {
        self.active.send_modify(|n| *n += 1);
        TaskGuard {
            active: Arc::clone(&self.active),
            id: TaskId::next(),
        }
    }

    /// Register `task` and run it on the runtime.
    pub fn spawn<F>(&self, name: &'static str, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.track();
        tokio::spawn(async move {
            if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
                tracing::error!(
                    task = name,
                    task_id = %guard.id(),
                    panic = %panic_message(panic.as_ref()),
                    "Background task panicked"
                );
                metrics::record_background_failure(name);
            }
            drop(guard);
        })
    }

    pub fn active_count(&self) -> usize {
        *self.active.borrow()
    }

    /// Resolve once no task is registered. No upper bound.
    pub async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a task's lifetime.
#[derive(Debug)]
pub struct TaskGuard {
    active: Arc<watch::Sender<usize>>,
    id: TaskId,
}

impl TaskGuard {
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.active.send_modify(|n| *n = n.saturating_sub(1));
        tracing::trace!(task_id = %self.id, "Background task finished");
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[test]
    fn test_guard_counts() {
        let tasks = BackgroundTasks::new();
        assert_eq!(tasks.active_count(), 0);

        let g1 = tasks.track();
        let g2 = tasks.track();
        assert_eq!(tasks.active_count(), 2);
        assert_ne!(g1.id(), g2.id());

        drop(g1);
        assert_eq!(tasks.active_count(), 1);
        drop(g2);
        assert_eq!(tasks.active_count(), 0);
    }

    #[tokio::test]
    async fn test_registered_before_running() {
        let tasks = BackgroundTasks::new();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let handle = tasks.spawn("test", async move {
            let _ = release_rx.await;
        });
        assert_eq!(tasks.active_count(), 1);

        release_tx.send(()).unwrap();
        handle.await.unwrap();
        assert_eq!(tasks.active_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_blocks_until_done() {
        let tasks = BackgroundTasks::new();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        tasks.spawn("test", async move {
            let _ = release_rx.await;
        });

        let waiting = tokio::time::timeout(Duration::from_millis(50), tasks.wait_idle()).await;
        assert!(waiting.is_err(), "must not resolve while a task is running");

        release_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), tasks.wait_idle())
            .await
            .expect("drained");
    }

    #[tokio::test]
    async fn test_panicking_task_deregisters() {
        let tasks = BackgroundTasks::new();
        let handle = tasks.spawn("doomed", async {
            panic!("smtp exploded");
        });
        handle.await.unwrap();
        assert_eq!(tasks.active_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_with_nothing_registered() {
        BackgroundTasks::new().wait_idle().await;
    }
}
