//! Named background tasks started by REPL commands.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

struct TrackedTask {
    id: u64,
    name: String,
    handle: JoinHandle<()>,
}

#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<Mutex<Vec<TrackedTask>>>,
    next_id: Arc<AtomicU64>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `future` on the runtime and remember it under `name`.
    pub fn spawn<F>(&self, name: impl Into<String>, future: F) -> u64
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let name = name.into();
        debug!("Starting task {} ({})", id, name);
        let handle = tokio::spawn(future);

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|t| !t.handle.is_finished());
        tasks.push(TrackedTask { id, name, handle });
        id
    }

    /// `(id, name)` of every task still running.
    pub fn alive(&self) -> Vec<(u64, String)> {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|t| !t.handle.is_finished());
        tasks.iter().map(|t| (t.id, t.name.clone())).collect()
    }

    /// Wait until every task started so far has finished.
    pub async fn join_all(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            tasks.drain(..).map(|t| t.handle).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }

    pub fn abort_all(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        for task in tasks.drain(..) {
            task.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_finished_tasks_drop_out() {
        let registry = TaskRegistry::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        registry.spawn("waiting", async move {
            let _ = rx.await;
        });
        registry.spawn("quick", async {});
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(registry.alive(), vec![(1, "waiting".to_string())]);
        tx.send(()).unwrap();
        registry.join_all().await;
        assert!(registry.alive().is_empty());
    }

    #[tokio::test]
    async fn test_abort_all() {
        let registry = TaskRegistry::new();
        registry.spawn("forever", std::future::pending());
        registry.abort_all();
        assert!(registry.alive().is_empty());
    }
}
