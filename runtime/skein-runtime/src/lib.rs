///
/// skein Runtime
///
/// One process-wide `Runtime` plus free functions over it, for hosts that
/// want to hand scripts a flat set of concurrency helpers:
///
/// - spawn / spawn_daemon - start threads
/// - submit_future - serialised background work with a retrievable result
/// - register_at_exit - tasks for orderly shutdown
/// - run_with_lock - lock-guarded execution
/// - wait_on / notify_one / notify_all - monitor operations
/// - sleep - interruptible sleep
/// - schedule_periodic / schedule_once / cancel_periodic - timers
/// - thread_local::{get, set, has, delete} - named per-thread values
///
/// The global runtime is created on first use with the default
/// configuration, or explicitly with `init`. Hosts call `shutdown` (or hold
/// the guard `init` returns) at exit so regular threads are waited for and
/// exit hooks run.
///

mod catalog;
mod runtime;

use std::sync::OnceLock;
use std::time::Duration;

pub use catalog::{Operation, describe, operations};
pub use runtime::{Runtime, ShutdownReport};

pub use serde_json::Value;
pub use skein_std_core::{ConcurrencyError, Config, Result, Task, bind};
pub use skein_std_threads::{
    FutureHandle, Lock, Lockable, Monitor, MonitorGuard, RwLock, ThreadHandle, current_interrupted,
    notify_all, notify_one, run_locked, run_with_lock, take_interrupt, wait_on, wait_on_for,
};
pub use skein_std_timers::TimerHandle;

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// The global runtime, created with defaults on first use
pub fn runtime() -> &'static Runtime {
    RUNTIME.get_or_init(Runtime::new)
}

/// Install the global runtime with `config`.
///
/// Fails if the global runtime already exists. Dropping the returned guard
/// performs the orderly shutdown.
pub fn init(config: Config) -> Result<ShutdownGuard> {
    let runtime = Runtime::with_config(config)?;
    RUNTIME.set(runtime).map_err(|_| {
        ConcurrencyError::invalid_argument("init", "runtime is already initialized")
    })?;
    Ok(ShutdownGuard { _private: () })
}

/// Runs `shutdown` when dropped
#[must_use = "dropping the guard shuts the runtime down immediately"]
pub struct ShutdownGuard {
    _private: (),
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        shutdown();
    }
}

pub fn shutdown() -> ShutdownReport {
    runtime().shutdown()
}

pub fn spawn(task: impl Into<Task>) -> Result<ThreadHandle> {
    runtime().spawn(task)
}

pub fn spawn_daemon(task: impl Into<Task>) -> Result<ThreadHandle> {
    runtime().spawn_daemon(task)
}

pub fn submit_future<F, T>(func: F) -> Result<FutureHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    runtime().submit_future(func)
}

pub fn register_at_exit(task: impl Into<Task>) -> Result<()> {
    runtime().register_at_exit(task)
}

pub fn sleep(duration: Duration) -> Result<()> {
    runtime().sleep(duration)
}

pub fn monitor<T>(value: T) -> Monitor<T> {
    runtime().monitor(value)
}

pub fn schedule_periodic<F>(callback: F, interval: Duration) -> Result<TimerHandle>
where
    F: FnMut() + Send + 'static,
{
    runtime().schedule_periodic(callback, interval)
}

pub fn schedule_once<F>(callback: F, delay: Duration) -> Result<TimerHandle>
where
    F: FnOnce() + Send + 'static,
{
    runtime().schedule_once(callback, delay)
}

pub fn cancel_periodic(handle: &TimerHandle) {
    runtime().cancel_periodic(handle);
}

/// Named per-thread values on the global runtime
pub mod thread_local {
    use super::{Result, Value, runtime};

    pub fn get(name: &str) -> Option<Value> {
        runtime().thread_local().get(name)
    }

    pub fn set(name: &str, value: impl Into<Value>) -> Result<()> {
        runtime().thread_local().set(name, value.into())
    }

    pub fn has(name: &str) -> bool {
        runtime().thread_local().has(name)
    }

    pub fn delete(name: &str) -> bool {
        runtime().thread_local().delete(name)
    }
}
