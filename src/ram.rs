//! Memory pressure and leak simulation.
//!
//! The pool retains an ordered sequence of heap buffers. Growth appends,
//! shrink trims from the most recent buffer backwards, and leak workers
//! append on a schedule until reset. There is deliberately no upper
//! bound: the host's memory limit is the ceiling under test.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use sysinfo::{Pid, PidExt, ProcessExt, ProcessRefreshKind, RefreshKind, System, SystemExt};
use tracing::{debug, info};

use crate::util::human_size;
use crate::worker::WorkerSet;

/// Point-in-time view of the process memory accounting.
#[derive(Debug, Clone, Serialize)]
pub struct MemorySnapshot {
    /// Resident set size of the process, in bytes.
    pub process_rss: u64,
    /// Bytes currently retained by the leak sequence.
    pub outstanding: u64,
    /// Number of retained buffers.
    pub buffers: usize,
    /// Human readable rendering of `process_rss`.
    pub human: String,
}

impl fmt::Display for MemorySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "memory status: rss: {} ({} bytes), retained: {} ({} bytes) in {} buffer(s)",
            self.human,
            self.process_rss,
            human_size(self.outstanding as f64),
            self.outstanding,
            self.buffers
        )
    }
}

/// Result of a shrink request. A nonzero `shortfall` means the pool had
/// fewer bytes retained than asked for: partial success, not an error.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ShrinkOutcome {
    pub released: u64,
    pub shortfall: u64,
}

/// Pool of retained allocations and the workers that feed it.
pub struct LeakPool {
    leaks: Arc<Mutex<Vec<Vec<u8>>>>,
    workers: WorkerSet,
    worker_seq: AtomicU64,
    system: Mutex<System>,
}

impl LeakPool {
    pub fn new() -> Self {
        Self {
            leaks: Arc::new(Mutex::new(Vec::new())),
            workers: WorkerSet::new(),
            worker_seq: AtomicU64::new(0),
            system: Mutex::new(System::new_with_specifics(
                RefreshKind::new().with_processes(ProcessRefreshKind::new()),
            )),
        }
    }

    /// Allocates and retains `size` bytes, returning the new outstanding
    /// total.
    pub fn grow(&self, size: usize) -> u64 {
        grow_into(&self.leaks, size)
    }

    /// Releases up to `size` bytes, newest buffer first. A buffer no
    /// larger than what is left to release is removed whole; the last
    /// one visited is truncated instead, so the sequence never keeps a
    /// zero-length entry.
    pub fn shrink(&self, size: usize) -> ShrinkOutcome {
        let mut remaining = size;
        {
            let mut leaks = self.leaks.lock();
            while remaining > 0 {
                let Some(last) = leaks.last_mut() else { break };
                if last.len() <= remaining {
                    remaining -= last.len();
                    leaks.pop();
                } else {
                    let keep = last.len() - remaining;
                    last.truncate(keep);
                    last.shrink_to_fit();
                    remaining = 0;
                }
            }
        }
        self.reclaim();
        ShrinkOutcome {
            released: (size - remaining) as u64,
            shortfall: remaining as u64,
        }
    }

    /// Starts a leak worker appending `size` bytes per iteration,
    /// sleeping `interval` between iterations when it is nonzero.
    pub fn leak(&self, size: usize, interval: Duration) {
        let id = self.worker_seq.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            "starting leak worker {id} with {} per {}",
            human_size(size as f64),
            humantime::format_duration(interval)
        );
        let leaks = Arc::clone(&self.leaks);
        self.workers.spawn(move || {
            let outstanding = grow_into(&leaks, size);
            debug!(
                leak_worker_id = id,
                "retaining a total of {} ({outstanding} bytes)",
                human_size(outstanding as f64)
            );
            if !interval.is_zero() {
                thread::sleep(interval);
            }
        });
    }

    /// Stops every leak worker, drops all retained buffers, trims the
    /// allocator and reports the post-reset state.
    pub async fn reset_all(&self) -> MemorySnapshot {
        self.workers.stop_all().await;
        self.leaks.lock().clear();
        self.reclaim();
        self.stats()
    }

    /// Snapshot of the process memory and the retained sequence.
    pub fn stats(&self) -> MemorySnapshot {
        let (outstanding, buffers) = {
            let leaks = self.leaks.lock();
            (leaks.iter().map(|b| b.len() as u64).sum(), leaks.len())
        };
        let pid = Pid::from_u32(std::process::id());
        let mut system = self.system.lock();
        system.refresh_process(pid);
        let process_rss = system.process(pid).map(|p| p.memory()).unwrap_or(0);
        MemorySnapshot {
            process_rss,
            outstanding,
            buffers,
            human: human_size(process_rss as f64),
        }
    }

    /// Bytes currently retained by the sequence.
    pub fn outstanding(&self) -> u64 {
        self.leaks.lock().iter().map(|b| b.len() as u64).sum()
    }

    /// Number of leak workers currently running.
    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    /// Asks the allocator to hand freed memory back to the kernel, so an
    /// external observer sees the release in the RSS. Linux only,
    /// advisory: the outcome is logged, never propagated.
    fn reclaim(&self) {
        #[cfg(target_os = "linux")]
        {
            // SAFETY: malloc_trim only releases unused allocator arenas.
            let released = unsafe { libc::malloc_trim(0) };
            if released == 0 {
                debug!("allocator had no memory to release");
            }
        }
    }
}

impl Default for LeakPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Appends one committed buffer to the sequence and returns the new
/// outstanding total. The buffer is filled so its pages actually exist;
/// allocation happens before the lock is taken.
fn grow_into(leaks: &Mutex<Vec<Vec<u8>>>, size: usize) -> u64 {
    let buf = vec![0x5au8; size];
    let mut leaks = leaks.lock();
    if !buf.is_empty() {
        leaks.push(buf);
    }
    leaks.iter().map(|b| b.len() as u64).sum()
}
