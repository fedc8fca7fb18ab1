//!
//! The Runtime
//!
//! All process-scoped state lives in one `Runtime` value:
//!
//! - the spawner, which remembers regular threads so shutdown can wait on them
//! - the future executor, started on first use and registered as an exit hook
//! - the exit hooks themselves
//! - the named thread-local registry
//!
//! `shutdown` is the orderly exit sequence: wait for regular threads, then
//! run each exit hook once on its own thread. Only the first call does
//! anything.
//!

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use skein_std_core::{Config, ConcurrencyError, Result, Task};
use skein_std_threads::{
    ExitHooks, FutureHandle, Lockable, Monitor, SingleWorker, Spawner, ThreadHandle, ThreadLocals,
};
use skein_std_timers::TimerHandle;
use tracing::info;

/// Task name used for futures submitted without one
const FUTURE_TASK: &str = "future";

pub struct Runtime {
    config: Config,
    spawner: Spawner,
    exit_hooks: ExitHooks,
    executor: Mutex<Option<Arc<SingleWorker>>>,
    locals: ThreadLocals<Value>,
    shut_down: AtomicBool,
}

/// What an orderly shutdown did
#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub joined_threads: usize,
    pub hooks_run: usize,
    pub failures: Vec<ConcurrencyError>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::build(Config::default())
    }

    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: Config) -> Self {
        Self {
            spawner: Spawner::new(&config),
            exit_hooks: ExitHooks::new(&config.thread_name_prefix),
            executor: Mutex::new(None),
            locals: ThreadLocals::new(),
            shut_down: AtomicBool::new(false),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn spawner(&self) -> &Spawner {
        &self.spawner
    }

    pub fn spawn(&self, task: impl Into<Task>) -> Result<ThreadHandle> {
        self.spawner.spawn(task)
    }

    pub fn spawn_daemon(&self, task: impl Into<Task>) -> Result<ThreadHandle> {
        self.spawner.spawn_daemon(task)
    }

    /// Queue `func` on the shared single-worker executor
    pub fn submit_future<F, T>(&self, func: F) -> Result<FutureHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.submit_named_future(FUTURE_TASK, func)
    }

    pub fn submit_named_future<F, T>(&self, name: &str, func: F) -> Result<FutureHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.executor()?.submit(name, func)
    }

    pub fn register_at_exit(&self, task: impl Into<Task>) -> Result<()> {
        self.exit_hooks.register(task)
    }

    pub fn run_with_lock<L, F, R>(&self, lock: Option<&L>, func: F) -> Result<R>
    where
        L: Lockable,
        F: FnOnce() -> R,
    {
        skein_std_threads::run_with_lock(lock, func)
    }

    pub fn sleep(&self, duration: Duration) -> Result<()> {
        skein_std_threads::sleep(duration)
    }

    /// A monitor whose waits honour this runtime's interrupt poll interval
    pub fn monitor<T>(&self, value: T) -> Monitor<T> {
        Monitor::with_poll(value, self.config.interrupt_poll())
    }

    pub fn schedule_periodic<F>(&self, callback: F, interval: Duration) -> Result<TimerHandle>
    where
        F: FnMut() + Send + 'static,
    {
        skein_std_timers::schedule_periodic(
            &self.spawner,
            callback,
            interval,
            self.config.min_interval(),
        )
    }

    pub fn schedule_once<F>(&self, callback: F, delay: Duration) -> Result<TimerHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        skein_std_timers::schedule_once(&self.spawner, callback, delay)
    }

    pub fn cancel_periodic(&self, handle: &TimerHandle) {
        skein_std_timers::cancel_periodic(handle);
    }

    pub fn thread_local(&self) -> &ThreadLocals<Value> {
        &self.locals
    }

    pub fn executor_started(&self) -> bool {
        self.executor_slot().is_some()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Wait for regular threads, then run every exit hook once
    pub fn shutdown(&self) -> ShutdownReport {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return ShutdownReport::default();
        }
        info!("runtime shutting down");

        let mut report = ShutdownReport {
            joined_threads: self.spawner.join_non_daemon(),
            ..ShutdownReport::default()
        };

        let exit = self.exit_hooks.run_all();
        report.hooks_run = exit.ran;
        report.failures.extend(exit.failures);

        info!(
            joined = report.joined_threads,
            hooks = report.hooks_run,
            failures = report.failures.len(),
            "runtime shut down"
        );
        report
    }

    fn executor(&self) -> Result<Arc<SingleWorker>> {
        let mut slot = self.executor_slot();
        if let Some(executor) = slot.as_ref() {
            return Ok(Arc::clone(executor));
        }
        if self.exit_hooks.has_run() {
            return Err(ConcurrencyError::ExecutorShutdown);
        }
        self.start_executor(&mut slot)
    }

    /// Start the worker and register its shutdown as an exit hook.
    ///
    /// If the exit hooks start running first, the new worker is dropped
    /// (which shuts it down) and the caller sees `ExecutorShutdown`.
    fn start_executor(&self, slot: &mut Option<Arc<SingleWorker>>) -> Result<Arc<SingleWorker>> {
        let executor = Arc::new(SingleWorker::start(
            &self.config.executor_thread_name,
            self.config.interrupt_poll(),
        )?);

        let at_exit = Arc::clone(&executor);
        self.exit_hooks
            .register(Task::named("shutdown-future-executor", move || {
                at_exit.shutdown();
            }))
            .map_err(|_| ConcurrencyError::ExecutorShutdown)?;

        *slot = Some(Arc::clone(&executor));
        Ok(executor)
    }

    fn executor_slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<SingleWorker>>> {
        self.executor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI64;

    #[test]
    fn test_executor_is_lazy() {
        let runtime = Runtime::new();
        assert!(!runtime.executor_started());
        let future = runtime.submit_future(|| 1 + 1).unwrap();
        assert!(runtime.executor_started());
        assert_eq!(future.get().unwrap(), 2);
    }

    #[test]
    fn test_executor_shutdown_registered_at_exit() {
        let runtime = Runtime::new();
        runtime.submit_future(|| ()).unwrap().get().unwrap();

        let report = runtime.shutdown();
        assert_eq!(report.hooks_run, 1);
        assert!(report.failures.is_empty());

        let err = runtime.submit_future(|| ()).unwrap_err();
        assert!(matches!(err, ConcurrencyError::ExecutorShutdown));
    }

    #[test]
    fn test_no_executor_created_after_shutdown() {
        let runtime = Runtime::new();
        runtime.shutdown();
        assert!(matches!(
            runtime.submit_future(|| ()),
            Err(ConcurrencyError::ExecutorShutdown)
        ));
        assert!(!runtime.executor_started());
    }

    #[test]
    fn test_shutdown_twice_is_noop() {
        let runtime = Runtime::new();
        let counter = Arc::new(AtomicI64::new(0));
        let c = Arc::clone(&counter);
        runtime
            .register_at_exit(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let first = runtime.shutdown();
        let second = runtime.shutdown();
        assert_eq!(first.hooks_run, 1);
        assert_eq!(second.hooks_run, 0);
        assert!(runtime.is_shut_down());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_executor_started_during_shutdown_is_rejected() {
        let runtime = Runtime::new();
        runtime.exit_hooks.run_all();

        let mut slot = None;
        let err = runtime.start_executor(&mut slot).err().unwrap();
        assert!(matches!(err, ConcurrencyError::ExecutorShutdown));
        assert!(slot.is_none());
    }

    #[test]
    fn test_shutdown_waits_for_regular_threads_when_interrupted() {
        let runtime = Arc::new(Runtime::new());
        let regular = runtime
            .spawn(|| std::thread::sleep(Duration::from_millis(300)))
            .unwrap();
        runtime.submit_future(|| ()).unwrap().get().unwrap();

        let closer = Arc::clone(&runtime);
        let report = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&report);
        let stopper = runtime
            .spawn_daemon(move || {
                let report = closer.shutdown();
                *slot.lock().unwrap() =
                    Some((report.joined_threads, report.hooks_run, report.failures.len()));
            })
            .unwrap();

        std::thread::sleep(Duration::from_millis(50));
        stopper.interrupt();
        stopper.join().unwrap();

        assert_eq!(*report.lock().unwrap(), Some((1, 1, 0)));
        assert!(regular.is_finished());
        assert!(runtime.is_shut_down());
    }

    #[test]
    fn test_with_config_validates() {
        let config = Config {
            interrupt_poll_ms: 0,
            ..Config::default()
        };
        assert!(matches!(
            Runtime::with_config(config),
            Err(ConcurrencyError::Config { .. })
        ));
    }

    #[test]
    fn test_periodic_interval_uses_configured_minimum() {
        let config = Config {
            min_interval_ms: 20,
            ..Config::default()
        };
        let runtime = Runtime::with_config(config).unwrap();
        let handle = runtime.schedule_periodic(|| {}, Duration::ZERO).unwrap();
        assert_eq!(handle.interval(), Duration::from_millis(20));
        runtime.cancel_periodic(&handle);
        handle.join().unwrap();
    }
}
