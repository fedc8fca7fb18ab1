//!
//! Single-Worker Executor
//!
//! Backs every future handed out by skein. Jobs go into one FIFO queue that
//! exactly one background thread drains, so:
//!
//! - at most one job body runs at a time
//! - a job submitted after another starts after it
//! - a new submission waits behind everything already queued
//!
//! The worker thread is started when the executor is created. `shutdown`
//! stops admission, lets the worker finish what is already queued, and joins
//! it. Calling `shutdown` again is a no-op.
//!

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use skein_std_core::{ConcurrencyError, Result, catch_task};
use tracing::{debug, info};

use crate::future::{FutureHandle, future_pair};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// The FIFO queue shared with the worker
struct JobQueue {
    jobs: Mutex<VecDeque<Job>>,
    condvar: Condvar,
    shutdown: AtomicBool,
}

impl JobQueue {
    fn new() -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    fn jobs(&self) -> MutexGuard<'_, VecDeque<Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, job: Job) -> Result<()> {
        let mut jobs = self.jobs();
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(ConcurrencyError::ExecutorShutdown);
        }
        jobs.push_back(job);
        self.condvar.notify_one();
        Ok(())
    }

    fn pop(&self) -> Option<Job> {
        let mut jobs = self.jobs();
        while jobs.is_empty() && !self.shutdown.load(Ordering::SeqCst) {
            jobs = self
                .condvar
                .wait(jobs)
                .unwrap_or_else(PoisonError::into_inner);
        }
        jobs.pop_front()
    }

    /// Returns false if the queue was already shut down
    fn shutdown(&self) -> bool {
        let _jobs = self.jobs();
        let first = !self.shutdown.swap(true, Ordering::SeqCst);
        self.condvar.notify_all();
        first
    }
}

pub struct SingleWorker {
    name: String,
    queue: Arc<JobQueue>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    pending: Arc<AtomicUsize>,
    poll: Duration,
}

impl SingleWorker {
    /// Start the worker thread
    pub fn start(name: &str, poll: Duration) -> Result<Self> {
        let queue = Arc::new(JobQueue::new());
        let pending = Arc::new(AtomicUsize::new(0));

        let queue_clone = Arc::clone(&queue);
        let pending_clone = Arc::clone(&pending);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(queue_clone, pending_clone))
            .map_err(ConcurrencyError::Spawn)?;

        debug!(worker = %name, "future executor started");

        Ok(Self {
            name: name.to_string(),
            worker_id: handle.thread().id(),
            queue,
            worker: Mutex::new(Some(handle)),
            pending,
            poll,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue `func` behind every job already submitted
    pub fn submit<F, T>(&self, name: &str, func: F) -> Result<FutureHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (future, completer) = future_pair(self.poll);
        let task_name = name.to_string();
        let pending = Arc::clone(&self.pending);

        self.pending.fetch_add(1, Ordering::SeqCst);
        let job: Job = Box::new(move || {
            completer.complete(catch_task(&task_name, func));
            pending.fetch_sub(1, Ordering::SeqCst);
        });

        if let Err(err) = self.queue.push(job) {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(err);
        }

        debug!(worker = %self.name, task = name, "future submitted");
        Ok(future)
    }

    /// Jobs submitted but not yet finished
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_shutdown(&self) -> bool {
        self.queue.shutdown.load(Ordering::SeqCst)
    }

    /// Stop accepting jobs, drain the queue, and join the worker.
    ///
    /// Returns true for the call that actually shut the executor down. When
    /// called from a job running on the worker itself, the join is skipped.
    pub fn shutdown(&self) -> bool {
        if !self.queue.shutdown() {
            return false;
        }

        if thread::current().id() != self.worker_id {
            let handle = self
                .worker
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(handle) = handle {
                let _ = handle.join();
            }
        }

        info!(worker = %self.name, "future executor shut down");
        true
    }
}

impl Drop for SingleWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(queue: Arc<JobQueue>, pending: Arc<AtomicUsize>) {
    while let Some(job) = queue.pop() {
        job();
    }
    debug!(remaining = pending.load(Ordering::SeqCst), "future worker exiting");
}
