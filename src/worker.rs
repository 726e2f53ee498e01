//! Cooperative cancellation for background stress workers.
//!
//! Both the CPU load pool and the leak pool run their workers on the
//! blocking thread pool: a worker exists to burn CPU or allocate as fast
//! as it can, which must not happen on the async threads serving HTTP
//! requests. Each worker polls its stop flag once per iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

struct Worker {
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Registry of cancellable background workers.
///
/// Every spawned worker has exactly one stop flag in the registry, held
/// until [`WorkerSet::stop_all`] both raises it and joins the task.
#[derive(Default)]
pub struct WorkerSet {
    workers: Mutex<Vec<Worker>>,
}

impl WorkerSet {
    pub fn new() -> Self {
        Self {
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Number of workers currently registered.
    pub fn len(&self) -> usize {
        self.workers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawns a worker loop on the blocking pool. `body` runs once per
    /// iteration until the stop flag is raised; pacing between iterations
    /// is the closure's business. The worker is registered under the
    /// registry lock, so a concurrent stop-all either sees it or runs
    /// before it exists.
    pub fn spawn<F>(&self, mut body: F)
    where
        F: FnMut() + Send + 'static,
    {
        let mut workers = self.workers.lock();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let task = tokio::task::spawn_blocking(move || {
            while !flag.load(Ordering::Relaxed) {
                body();
            }
        });
        workers.push(Worker { stop, task });
    }

    /// Raises every stop flag, clears the registry and waits for every
    /// worker to exit. No-op when nothing is registered. A worker that is
    /// mid-sleep delays the return by at most one pacing interval.
    pub async fn stop_all(&self) {
        let drained: Vec<Worker> = {
            let mut workers = self.workers.lock();
            for worker in workers.iter() {
                worker.stop.store(true, Ordering::Relaxed);
            }
            workers.drain(..).collect()
        };

        // Join outside the lock; a panicked worker is logged, not propagated.
        for result in join_all(drained.into_iter().map(|w| w.task)).await {
            if let Err(e) = result {
                warn!("stress worker did not shut down cleanly: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn spawn_registers_and_stop_drains() {
        let set = WorkerSet::new();
        for _ in 0..3 {
            set.spawn(|| std::thread::sleep(Duration::from_millis(1)));
        }
        assert_eq!(set.len(), 3);

        set.stop_all().await;
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn stop_all_without_workers_is_a_noop() {
        let set = WorkerSet::new();
        set.stop_all().await;
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn tight_loop_worker_observes_stop() {
        let set = WorkerSet::new();
        set.spawn(|| {});
        set.stop_all().await;
        assert!(set.is_empty());
    }
}
