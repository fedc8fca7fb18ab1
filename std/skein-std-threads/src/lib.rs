//!
//! skein-std-threads - Concurrency Primitives
//!
//! Thin, uniform wrappers over the operating system's threads, locks, and
//! condition variables.
//!
//! ## Threads
//!
//! - `Spawner::spawn(task) -> ThreadHandle` - start a regular thread
//! - `Spawner::spawn_daemon(task) -> ThreadHandle` - start a daemon thread
//! - `ThreadHandle::interrupt()` - wake the thread out of its blocking call
//! - `sleep(duration)` - interruptible sleep
//!
//! ## Locks and Monitors
//!
//! - `run_with_lock(Some(&lock), f)` - run `f` holding `lock`, release on every path
//! - `Lock` - reentrant mutual exclusion
//! - `RwLock::read()` / `RwLock::write()` - shared and exclusive lock handles
//! - `Monitor<T>` with `wait_on`, `notify_one`, `notify_all`
//!
//! ## Futures
//!
//! - `SingleWorker::submit(name, f) -> FutureHandle<T>` - serialised background work
//!
//! ## Exit Hooks and Thread-Locals
//!
//! - `ExitHooks::register(task)` / `ExitHooks::run_all()`
//! - `ThreadLocals<V>` with `get`, `set`, `has`, `delete`
//!
//! ## Platform Support
//!
//! Native platforms only.
//!

pub mod exit;
pub mod future;
pub mod interrupt;
pub mod local;
pub mod monitor;
pub mod mutex;
pub mod rwlock;
pub mod scheduler;
pub mod spawn;

pub use exit::*;
pub use future::*;
pub use interrupt::*;
pub use local::*;
pub use monitor::*;
pub use mutex::*;
pub use rwlock::*;
pub use scheduler::*;
pub use spawn::*;
