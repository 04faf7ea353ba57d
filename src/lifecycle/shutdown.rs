//! Shutdown coordination for the API server.

use std::sync::Arc;

use tokio::sync::watch;

use crate::lifecycle::tasks::BackgroundTasks;

/// Phase of the process lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Accepting connections and background work.
    Running,
    /// Listener closing; in-flight requests and background tasks finishing.
    Draining,
    /// Everything drained.
    Stopped,
}

/// Coordinator for graceful shutdown.
///
/// Holds the `Running → Draining → Stopped` state on a watch channel that
/// long-running tasks can wait on, and the tracker for background tasks
/// that must finish before the process exits.
#[derive(Debug, Clone)]
pub struct Shutdown {
    state: Arc<watch::Sender<ShutdownState>>,
    tasks: BackgroundTasks,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ShutdownState::Running);
        Self {
            state: Arc::new(tx),
            tasks: BackgroundTasks::new(),
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    /// Move from `Running` to `Draining`.
    ///
    /// Returns `false` if shutdown was already under way; only the first
    /// trigger has any effect.
    pub fn trigger(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ShutdownState::Running {
                *state = ShutdownState::Draining;
                true
            } else {
                false
            }
        })
    }

    /// Resolve once the coordinator has left `Running`.
    pub async fn draining(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state != ShutdownState::Running).await;
    }

    /// Background tasks that shutdown waits for.
    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Block until every registered background task has completed.
    pub async fn drain(&self) {
        self.tasks.wait_idle().await;
    }

    pub fn mark_stopped(&self) {
        self.state.send_replace(ShutdownState::Stopped);
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_only_first_trigger_counts() {
        let shutdown = Shutdown::new();
        assert_eq!(shutdown.state(), ShutdownState::Running);

        assert!(shutdown.trigger());
        assert_eq!(shutdown.state(), ShutdownState::Draining);

        assert!(!shutdown.trigger());
        assert_eq!(shutdown.state(), ShutdownState::Draining);

        shutdown.mark_stopped();
        assert!(!shutdown.trigger());
        assert_eq!(shutdown.state(), ShutdownState::Stopped);
    }

    #[tokio::test]
    async fn test_draining_wakes_waiters() {
        let shutdown = Shutdown::new();
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.draining().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .unwrap();
    }

    #[tokio::test]
    async fn test_draining_after_trigger_resolves_immediately() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        tokio::time::timeout(Duration::from_millis(100), shutdown.draining())
            .await
            .expect("already draining");
    }

    #[tokio::test]
    async fn test_drain_waits_for_background_work() {
        let shutdown = Shutdown::new();
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = finished.clone();
        shutdown.tasks().spawn("email", async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        shutdown.trigger();
        shutdown.drain().await;
        assert!(finished.load(std::sync::atomic::Ordering::SeqCst));
    }
}
