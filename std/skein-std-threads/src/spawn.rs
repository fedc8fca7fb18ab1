//!
//! Thread Spawning
//!
//! `Spawner::spawn` starts a regular thread, `Spawner::spawn_daemon` a daemon
//! thread. Both return a `ThreadHandle` as soon as the thread is started.
//! Neither captures the task's result; a panicking task is logged and the
//! thread ends.
//!
//! Rust does not wait for any thread when `main` returns, so the daemon
//! distinction is kept by the spawner itself: regular threads are recorded
//! and `join_non_daemon` blocks until all of them (including those they
//! spawned in turn) have finished. Daemon threads are never recorded.
//!
//! `join_non_daemon` ignores interruption: it is the shutdown wait, and
//! giving up early would let exit hooks run beside live regular threads.
//!

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use skein_std_core::{Config, ConcurrencyError, Result, Task};
use tracing::{debug, warn};

use crate::interrupt::{InterruptToken, install_token, wait_interruptibly};

struct HandleInner {
    name: String,
    daemon: bool,
    token: InterruptToken,
    finished: Mutex<bool>,
    done: Arc<Condvar>,
    poll: Duration,
}

/// Handle to a thread started by a `Spawner`
#[derive(Clone)]
pub struct ThreadHandle {
    inner: Arc<HandleInner>,
}

impl ThreadHandle {
    fn new(name: String, daemon: bool, poll: Duration) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                name,
                daemon,
                token: InterruptToken::new(),
                finished: Mutex::new(false),
                done: Arc::new(Condvar::new()),
                poll,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_daemon(&self) -> bool {
        self.inner.daemon
    }

    pub fn is_finished(&self) -> bool {
        *self.finished()
    }

    /// Ask the thread to stop. It notices at its next blocking call.
    pub fn interrupt(&self) {
        self.inner.token.interrupt();
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.token.is_interrupted()
    }

    /// Block until the thread has finished. Interruptible.
    pub fn join(&self) -> Result<()> {
        let mut finished = self.finished();
        while !*finished {
            finished = wait_interruptibly(&self.inner.done, finished, None, self.inner.poll)?.0;
        }
        Ok(())
    }

    /// Block until the thread has finished or `timeout` elapses.
    /// Returns whether the thread finished.
    pub fn join_timeout(&self, timeout: Duration) -> Result<bool> {
        let finished = self.finished();
        if *finished {
            return Ok(true);
        }
        let (finished, _) =
            wait_interruptibly(&self.inner.done, finished, Some(timeout), self.inner.poll)?;
        Ok(*finished)
    }

    /// Block until the thread has finished, ignoring interrupts
    fn wait_finished(&self) {
        let mut finished = self.finished();
        while !*finished {
            finished = self
                .inner
                .done
                .wait(finished)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn finished(&self) -> MutexGuard<'_, bool> {
        self.inner.finished.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(self, task: Task) {
        install_token(self.inner.token.clone());

        let task_name = task.name().to_string();
        if let Err(err) = task.run() {
            warn!(thread = %self.name(), task = %task_name, error = %err, "spawned task failed");
        }

        *self.finished() = true;
        self.inner.done.notify_all();
        debug!(thread = %self.name(), "thread finished");
    }
}

impl std::fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("name", &self.inner.name)
            .field("daemon", &self.inner.daemon)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Starts threads and tracks the regular (non-daemon) ones
pub struct Spawner {
    prefix: String,
    stack_size: Option<usize>,
    poll: Duration,
    next_id: AtomicU64,
    live: Mutex<Vec<ThreadHandle>>,
}

impl Spawner {
    pub fn new(config: &Config) -> Self {
        Self {
            prefix: config.thread_name_prefix.clone(),
            stack_size: config.stack_size,
            poll: config.interrupt_poll(),
            next_id: AtomicU64::new(1),
            live: Mutex::new(Vec::new()),
        }
    }

    pub fn spawn(&self, task: impl Into<Task>) -> Result<ThreadHandle> {
        self.start(task.into(), false)
    }

    pub fn spawn_daemon(&self, task: impl Into<Task>) -> Result<ThreadHandle> {
        self.start(task.into(), true)
    }

    /// Regular threads that have been started and not yet finished
    pub fn live_count(&self) -> usize {
        let mut live = self.live();
        live.retain(|h| !h.is_finished());
        live.len()
    }

    /// Wait for every regular thread, including ones started while waiting.
    /// Returns how many threads were waited on. Not interruptible.
    pub fn join_non_daemon(&self) -> usize {
        let mut joined = 0;
        loop {
            let pending = std::mem::take(&mut *self.live());
            if pending.is_empty() {
                return joined;
            }
            for handle in pending {
                if !handle.is_finished() {
                    debug!(thread = %handle.name(), "waiting for non-daemon thread");
                }
                handle.wait_finished();
                joined += 1;
            }
        }
    }

    fn start(&self, task: Task, daemon: bool) -> Result<ThreadHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = if daemon {
            format!("{}-daemon-{}", self.prefix, id)
        } else {
            format!("{}-{}", self.prefix, id)
        };

        let handle = ThreadHandle::new(name.clone(), daemon, self.poll);

        // record before starting so a concurrent join_non_daemon cannot miss it
        if !daemon {
            let mut live = self.live();
            live.retain(|h| !h.is_finished());
            live.push(handle.clone());
        }

        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }

        let worker = handle.clone();
        if let Err(err) = builder.spawn(move || worker.run(task)) {
            if !daemon {
                self.live().retain(|h| !Arc::ptr_eq(&h.inner, &handle.inner));
            }
            return Err(ConcurrencyError::Spawn(err));
        }

        debug!(thread = %name, daemon, "thread started");
        Ok(handle)
    }

    fn live(&self) -> MutexGuard<'_, Vec<ThreadHandle>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Spawner {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::{self, current_token, install_token, take_interrupt};
    use std::sync::atomic::AtomicI64;

    #[test]
    fn test_spawn_runs_task() {
        let spawner = Spawner::default();
        let counter = Arc::new(AtomicI64::new(0));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let counter = Arc::clone(&counter);
                spawner
                    .spawn(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap()
            })
            .collect();

        for h in &handles {
            h.join().unwrap();
            assert!(h.is_finished());
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_thread_names() {
        let config = Config {
            thread_name_prefix: "unit".to_string(),
            ..Config::default()
        };
        let spawner = Spawner::new(&config);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (Arc::clone(&seen), Arc::clone(&seen));

        let regular = spawner
            .spawn(move || {
                a.lock().unwrap().push(thread::current().name().map(str::to_string));
            })
            .unwrap();
        regular.join().unwrap();
        let daemon = spawner
            .spawn_daemon(move || {
                b.lock().unwrap().push(thread::current().name().map(str::to_string));
            })
            .unwrap();
        daemon.join().unwrap();

        assert_eq!(regular.name(), "unit-1");
        assert!(!regular.is_daemon());
        assert_eq!(daemon.name(), "unit-daemon-2");
        assert!(daemon.is_daemon());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some("unit-1".to_string()), Some("unit-daemon-2".to_string())]
        );
    }

    #[test]
    fn test_panicking_task_still_finishes() {
        let spawner = Spawner::default();
        let handle = spawner
            .spawn(Task::named("doomed", || panic!("fire and forget")))
            .unwrap();
        handle.join().unwrap();
        assert!(handle.is_finished());
    }

    #[test]
    fn test_join_non_daemon_waits_only_for_regular_threads() {
        let spawner = Spawner::default();

        let regular = spawner
            .spawn(|| thread::sleep(Duration::from_millis(80)))
            .unwrap();
        let daemon = spawner
            .spawn_daemon(|| {
                let _ = interrupt::sleep(Duration::from_secs(30));
            })
            .unwrap();

        let joined = spawner.join_non_daemon();
        assert_eq!(joined, 1);
        assert!(regular.is_finished());
        assert!(!daemon.is_finished());
        assert_eq!(spawner.live_count(), 0);

        daemon.interrupt();
        daemon.join().unwrap();
    }

    #[test]
    fn test_interrupt_stops_sleeping_thread() {
        let spawner = Spawner::default();
        let observed = Arc::new(AtomicI64::new(0));
        let seen = Arc::clone(&observed);

        let handle = spawner
            .spawn(move || {
                if interrupt::sleep(Duration::from_secs(30)).is_err() {
                    seen.store(1, Ordering::SeqCst);
                }
            })
            .unwrap();

        thread::sleep(Duration::from_millis(30));
        handle.interrupt();
        assert!(handle.join_timeout(Duration::from_secs(5)).unwrap());
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_join_non_daemon_ignores_interrupt() {
        let spawner = Spawner::default();
        let regular = spawner
            .spawn(|| thread::sleep(Duration::from_millis(150)))
            .unwrap();

        current_token().interrupt();
        let joined = spawner.join_non_daemon();

        assert_eq!(joined, 1);
        assert!(regular.is_finished());
        // the pending interrupt is left for the next blocking call
        assert!(take_interrupt());
    }

    #[test]
    fn test_join_is_interruptible() {
        let spawner = Spawner::default();
        let target = spawner
            .spawn_daemon(|| {
                let _ = interrupt::sleep(Duration::from_secs(30));
            })
            .unwrap();

        let token = InterruptToken::new();
        let worker_token = token.clone();
        let joiner_target = target.clone();
        let joiner = thread::spawn(move || {
            install_token(worker_token);
            joiner_target.join()
        });

        thread::sleep(Duration::from_millis(30));
        token.interrupt();

        assert!(matches!(joiner.join().unwrap(), Err(ConcurrencyError::Interrupted)));
        assert!(!token.is_interrupted());
        assert!(!target.is_finished());

        target.interrupt();
        target.join().unwrap();
    }
}
