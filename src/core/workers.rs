//! Background pool for blocking transport calls.
//!
//! HTTP requests run here so the UI thread never blocks; results travel back
//! over a channel and are applied on the UI thread (see `sync::dispatch`).
//!
//! Jobs are tagged with the session epoch they were queued under. Ending a
//! session advances the epoch, and jobs from the old session that haven't
//! started yet are skipped instead of hitting the server with a stale token.

use crossbeam::deque::{Injector, Stealer, Worker};
use log::trace;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Idle workers poll the queue at this interval.
const IDLE_SLEEP: Duration = Duration::from_millis(2);
/// How long `Drop` waits for in-progress requests before detaching.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Work-stealing thread pool with a session epoch.
pub struct Workers {
    injector: Arc<Injector<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    epoch: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
}

impl Workers {
    /// Spawn `num_threads` workers (at least one).
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let locals: Vec<Worker<Job>> = (0..num_threads).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<Job>> = locals.iter().map(Worker::stealer).collect();

        let handles = locals
            .into_iter()
            .enumerate()
            .map(|(worker_id, local)| {
                let injector = Arc::clone(&injector);
                let shutdown = Arc::clone(&shutdown);
                let stealers = stealers.clone();

                thread::Builder::new()
                    .name(format!("staycal-worker-{}", worker_id))
                    .spawn(move || {
                        trace!("Worker {} started", worker_id);
                        while !shutdown.load(Ordering::Relaxed) {
                            match next_job(&local, &injector, &stealers) {
                                Some(job) => job(),
                                None => thread::sleep(IDLE_SLEEP),
                            }
                        }
                        trace!("Worker {} stopped", worker_id);
                    })
                    .expect("Failed to spawn worker thread")
            })
            .collect();

        trace!("Workers initialized: {} threads", num_threads);

        Self {
            injector,
            handles,
            epoch: Arc::new(AtomicU64::new(0)),
            shutdown,
        }
    }

    pub fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Invalidate every job queued so far. Returns the new epoch.
    pub fn advance_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Run `f` on a worker thread unless the epoch moved on before a worker
    /// picked it up. The check happens at execution time, not enqueue time.
    pub fn execute_with_epoch<F>(&self, epoch: u64, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let current = Arc::clone(&self.epoch);
        self.injector.push(Box::new(move || {
            if current.load(Ordering::SeqCst) == epoch {
                f();
            } else {
                trace!("Skipping job from epoch {}", epoch);
            }
        }));
    }

    pub fn num_threads(&self) -> usize {
        self.handles.len()
    }
}

/// Own queue first, then the global injector, then steal from peers.
fn next_job(local: &Worker<Job>, injector: &Injector<Job>, stealers: &[Stealer<Job>]) -> Option<Job> {
    if let Some(job) = local.pop() {
        return Some(job);
    }
    loop {
        let stolen = injector
            .steal_batch_and_pop(local)
            .or_else(|| stealers.iter().map(Stealer::steal).collect());
        if !stolen.is_retry() {
            return stolen.success();
        }
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);
        self.shutdown.store(true, Ordering::SeqCst);

        // A request stuck on a slow server shouldn't hang exit
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        for handle in std::mem::take(&mut self.handles) {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown grace period elapsed, detaching remaining workers");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            if handle.join().is_err() {
                trace!("Worker panicked during shutdown");
            }
        }
        trace!("All {} workers stopped", num_threads);
    }
}
