use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::error::{RuntimeErrorKind, RuntimeResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Workers beyond `min` that sit idle this long shrink the pool back down
/// (spec/original `tpn/threadpool.cpp`: 10s).
const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// A worker pool with a floor, a ceiling, and a bounded task queue.
///
/// `min` workers are kept alive for the pool's whole lifetime; additional
/// workers up to `max` are spawned lazily whenever every current worker is
/// busy running a job, and shrink back toward `min` after sitting idle for
/// [`IDLE_TIMEOUT`]. Submitting past `limit` queued-but-not-yet-running
/// tasks fails rather than blocking the caller, so a flooded pool applies
/// backpressure instead of growing memory without bound.
pub struct WorkerPool {
    sender: Sender<Job>,
    receiver: Receiver<Job>,
    min: usize,
    max: usize,
    limit: usize,
    queued: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    count: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(min: usize, max: usize, limit: usize) -> WorkerPool {
        assert!(min >= 1, "meshnet-runtime: worker pool needs at least one core worker");
        assert!(max >= min, "meshnet-runtime: worker pool max must be >= min");

        let (sender, receiver) = bounded::<Job>(limit);
        let queued = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let count = Arc::new(AtomicUsize::new(min));

        for id in 0..min {
            spawn_worker(id, min, receiver.clone(), queued.clone(), active.clone(), count.clone());
        }

        WorkerPool {
            sender,
            receiver,
            min,
            max,
            limit,
            queued,
            active,
            count,
        }
    }

    /// Queue `job` for execution, growing the pool toward `max` if every
    /// current worker is currently busy. Fails with
    /// [`RuntimeErrorKind::QueueFull`] once `limit` tasks are already
    /// waiting for a worker.
    pub fn execute<F>(&self, job: F) -> RuntimeResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.queued.load(Ordering::SeqCst) >= self.limit {
            return Err(RuntimeErrorKind::QueueFull { limit: self.limit }.into());
        }

        self.maybe_grow();

        self.queued.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(Box::new(job)).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Number of workers currently alive, for tests and diagnostics.
    pub fn worker_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    fn maybe_grow(&self) {
        loop {
            let current = self.count.load(Ordering::SeqCst);
            if current >= self.max || self.active.load(Ordering::SeqCst) < current {
                return;
            }
            if self
                .count
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                spawn_worker(
                    current,
                    self.min,
                    self.receiver.clone(),
                    self.queued.clone(),
                    self.active.clone(),
                    self.count.clone(),
                );
                return;
            }
        }
    }
}

fn spawn_worker(
    id: usize,
    min: usize,
    receiver: Receiver<Job>,
    queued: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    count: Arc<AtomicUsize>,
) {
    thread::Builder::new()
        .name(format!("meshnet-worker-{}", id))
        .spawn(move || loop {
            match receiver.recv_timeout(IDLE_TIMEOUT) {
                Ok(job) => {
                    queued.fetch_sub(1, Ordering::SeqCst);
                    active.fetch_add(1, Ordering::SeqCst);
                    job();
                    active.fetch_sub(1, Ordering::SeqCst);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if try_shrink(&count, min) {
                        return;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return,
            }
        })
        .expect("meshnet-runtime: failed to spawn worker thread");
}

/// Claim this worker's exit if the pool is above `min`, keeping `count`
/// accurate for the worker that actually leaves.
fn try_shrink(count: &Arc<AtomicUsize>, min: usize) -> bool {
    loop {
        let current = count.load(Ordering::SeqCst);
        if current <= min {
            return false;
        }
        if count
            .compare_exchange(current, current - 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return true;
        }
    }
}
