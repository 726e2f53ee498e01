//! CPU load generation.
//!
//! Workers spin (or pace themselves with a sleep) until the pool is
//! reset. A pacing of zero saturates one logical core per worker; a
//! nonzero pacing produces partial, controllable load.

use std::thread;
use std::time::Duration;

use tracing::info;

use crate::worker::WorkerSet;

/// Pool of CPU-consuming workers.
#[derive(Default)]
pub struct LoadPool {
    workers: WorkerSet,
}

impl LoadPool {
    pub fn new() -> Self {
        Self {
            workers: WorkerSet::new(),
        }
    }

    /// Starts `count` load workers. Fire and forget: the workers run
    /// until [`LoadPool::stop_all`] is called.
    pub fn start(&self, count: usize, pacing: Duration) {
        info!(
            "starting {count} load workers, with pacing of {}",
            humantime::format_duration(pacing)
        );
        for _ in 0..count {
            self.workers.spawn(move || {
                if !pacing.is_zero() {
                    thread::sleep(pacing);
                }
            });
        }
    }

    /// Stops every load worker and waits for all of them to exit.
    pub async fn stop_all(&self) {
        self.workers.stop_all().await;
        info!("load workers stopped");
    }

    /// Number of workers currently running.
    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_then_stop_leaves_no_workers() {
        let pool = LoadPool::new();
        pool.start(4, Duration::from_millis(1));
        assert_eq!(pool.active_workers(), 4);

        pool.stop_all().await;
        assert_eq!(pool.active_workers(), 0);
    }

    #[tokio::test]
    async fn spinning_workers_stop_too() {
        let pool = LoadPool::new();
        pool.start(2, Duration::ZERO);
        pool.stop_all().await;
        assert_eq!(pool.active_workers(), 0);
    }

    #[tokio::test]
    async fn stop_without_start_is_fine() {
        let pool = LoadPool::new();
        pool.stop_all().await;
        pool.stop_all().await;
        assert_eq!(pool.active_workers(), 0);
    }

    #[tokio::test]
    async fn successive_starts_accumulate() {
        let pool = LoadPool::new();
        pool.start(2, Duration::from_millis(1));
        pool.start(3, Duration::from_millis(1));
        assert_eq!(pool.active_workers(), 5);
        pool.stop_all().await;
        assert_eq!(pool.active_workers(), 0);
    }
}
