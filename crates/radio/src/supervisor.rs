//! Ownership of in-flight delivery tasks so the network can wait on them

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use tokio::task::{JoinError, JoinSet};
use log::{debug, error};

/// Tracks every spawned delivery so none outlives the simulation.
/// A failure inside one task is logged and never reaches its siblings.
#[derive(Default)]
pub struct DeliverySupervisor {
    tasks: Mutex<JoinSet<()>>,
}

impl DeliverySupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn a task onto the current runtime. Must be called from within a
    /// tokio runtime.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks();
        // reap whatever already finished so the set doesn't grow unbounded
        while let Some(result) = tasks.try_join_next() {
            report(result);
        }
        tasks.spawn(task);
    }

    /// Tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        let mut tasks = self.tasks();
        while let Some(result) = tasks.try_join_next() {
            report(result);
        }
        tasks.len()
    }

    /// Wait for every tracked task, including ones spawned while draining.
    /// Returns how many tasks were awaited.
    pub async fn drain(&self) -> usize {
        let mut awaited = 0;
        loop {
            let mut batch = {
                let mut tasks = self.tasks();
                std::mem::take(&mut *tasks)
            };
            if batch.is_empty() {
                break;
            }
            while let Some(result) = batch.join_next().await {
                report(result);
                awaited += 1;
            }
        }
        debug!("Delivery supervisor drained {} tasks", awaited);
        awaited
    }
}

fn report(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("Delivery task panicked: {}", e);
        } else {
            debug!("Delivery task cancelled: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_drain_waits_for_all_tasks() {
        let supervisor = DeliverySupervisor::new();
        let done = Arc::new(AtomicUsize::new(0));

        for i in 0..5u64 {
            let done = done.clone();
            supervisor.spawn(async move {
                tokio::time::sleep(Duration::from_millis(50 * i)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(supervisor.in_flight(), 5);

        assert_eq!(supervisor.drain().await, 5);
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(supervisor.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_task_is_isolated() {
        let supervisor = DeliverySupervisor::new();
        let done = Arc::new(AtomicUsize::new(0));

        supervisor.spawn(async {
            panic!("malformed target");
        });
        for _ in 0..3 {
            let done = done.clone();
            supervisor.spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(supervisor.drain().await, 4);
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_covers_tasks_spawned_while_draining() {
        let supervisor = Arc::new(DeliverySupervisor::new());
        let done = Arc::new(AtomicUsize::new(0));

        let inner = supervisor.clone();
        let counter = done.clone();
        supervisor.spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let counter = counter.clone();
            inner.spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            });
        });

        assert_eq!(supervisor.drain().await, 2);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
