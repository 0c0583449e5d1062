//! Handles for observing spawned background work.

use std::future::Future;

use tokio::sync::watch;

use crate::error::CacheError;

/// Where a background task currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Done,
    Failed(String),
}

/// A handle to a spawned task. Dropping the handle does not cancel the
/// task; any number of clones can observe or await its completion.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    state: watch::Receiver<TaskState>,
}

impl TaskHandle {
    /// Spawn `future` on the runtime and return a handle to its outcome.
    /// A task that errors is logged and reported as `Failed`, never
    /// propagated as a panic.
    pub fn spawn<F>(name: &'static str, future: F) -> Self
    where
        F: Future<Output = Result<(), CacheError>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(TaskState::Running);
        tokio::spawn(async move {
            let state = match future.await {
                Ok(()) => TaskState::Done,
                Err(e) => {
                    log::error!("Background task {name} failed: {e}");
                    TaskState::Failed(e.to_string())
                }
            };
            let _ = tx.send(state);
        });
        Self { state: rx }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state.borrow(), TaskState::Running)
    }

    /// Wait until the task leaves the running state.
    pub async fn wait(&self) -> TaskState {
        let mut rx = self.state.clone();
        match rx.wait_for(|s| !matches!(s, TaskState::Running)).await {
            Ok(state) => state.clone(),
            // Sender dropped without a final state: the runtime shut down
            // under the task.
            Err(_) => TaskState::Failed("task aborted".to_string()),
        }
    }
}
