//! Bounded thread pool for per-shot directory scans.
//!
//! Uses work-stealing deques:
//! - Jobs enter through a global injector
//! - Idle workers steal from each other
//! - A panicking job is caught and logged, the worker keeps running

use crossbeam::deque::{Injector, Worker};
use log::{error, trace};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Worker pool with a fixed number of named threads.
///
/// # Example
/// ```ignore
/// let workers = Workers::new(4);
/// let tx = tx.clone();
/// workers.execute(move || {
///     tx.send(scanner.scan_shot_detail(&ep, &seq, &shot)).ok();
/// });
/// ```
pub struct Workers {
    injector: Arc<Injector<Job>>,         // Global queue for submitted jobs
    handles: Vec<thread::JoinHandle<()>>, // Thread handles for shutdown
    shutdown: Arc<AtomicBool>,            // Shutdown signal
}

impl Workers {
    /// Spawn `num_threads` workers (at least one).
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers_local: Vec<Worker<Job>> = Vec::new();
        let mut stealers = Vec::new();
        let mut handles = Vec::new();

        for _ in 0..num_threads {
            let worker: Worker<Job> = Worker::new_fifo();
            stealers.push(worker.stealer());
            workers_local.push(worker);
        }

        for (worker_id, worker) in workers_local.into_iter().enumerate() {
            let injector = Arc::clone(&injector);
            let shutdown = Arc::clone(&shutdown);
            let stealers = stealers.clone();

            let handle = thread::Builder::new()
                .name(format!("shotreel-scan-{}", worker_id))
                .spawn(move || {
                    trace!("Worker {} started", worker_id);

                    loop {
                        // Own queue, then injector (batch into own queue), then peers
                        if let Some(job) = worker.pop() {
                            run_job(worker_id, job);
                            continue;
                        }

                        if let Some(job) = injector.steal_batch_and_pop(&worker).success() {
                            run_job(worker_id, job);
                            continue;
                        }

                        let stolen = stealers
                            .iter()
                            .find_map(|stealer| stealer.steal().success());
                        if let Some(job) = stolen {
                            run_job(worker_id, job);
                            continue;
                        }

                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }

                        thread::sleep(std::time::Duration::from_millis(1));
                    }

                    trace!("Worker {} stopped", worker_id);
                })
                .expect("Failed to spawn worker thread");

            handles.push(handle);
        }

        trace!("Workers initialized: {} threads", num_threads);

        Self {
            injector,
            handles,
            shutdown,
        }
    }

    /// Number of worker threads.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Queue a closure for execution on a worker thread.
    ///
    /// No return value: send results back through a channel.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.injector.push(Box::new(f));
    }
}

fn run_job(worker_id: usize, job: Job) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
        error!("Worker {}: job panicked: {}", worker_id, panic_message(&payload));
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        use std::time::{Duration, Instant};

        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);

        // Workers drain the queue before they observe the flag
        self.shutdown.store(true, Ordering::SeqCst);

        let deadline = Instant::now() + Duration::from_millis(500);

        let handles = std::mem::take(&mut self.handles);
        for handle in handles {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, exiting anyway");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }

        trace!("All {} workers stopped", num_threads);
    }
}
