//!
//! Locks and Lock-Guarded Execution
//!
//! Provides the reentrant `Lock` handle and the `Lockable` capability shared
//! by every lock skein accepts. `run_with_lock` acquires a lock, runs a task,
//! and releases the lock on every exit path, including a panicking task.
//!
//! Usage:
//! ```
//! use skein_std_threads::{Lock, run_with_lock};
//!
//! let lock = Lock::new();
//! let total = run_with_lock(Some(&lock), || 40 + 2).unwrap();
//! assert_eq!(total, 42);
//! assert!(!lock.is_locked());
//! ```
//!
//! Acquisition blocks without a timeout. A lock cycle between threads
//! blocks forever; nothing here detects deadlock.
//!

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use skein_std_core::{ConcurrencyError, Result, panic_message};

/// Anything that can be held exclusively for the duration of a call.
///
/// Dropping the guard releases the lock.
pub trait Lockable {
    type Guard<'a>
    where
        Self: 'a;

    fn acquire(&self) -> Self::Guard<'_>;
}

impl<T> Lockable for Mutex<T> {
    type Guard<'a>
        = MutexGuard<'a, T>
    where
        Self: 'a;

    fn acquire(&self) -> Self::Guard<'_> {
        self.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Acquire `lock`, run `func`, release the lock exactly once.
///
/// A missing lock fails with `InvalidArgument` before anything is acquired.
/// A panic in `func` is reported as `TaskFailed` after the lock is released.
pub fn run_with_lock<L, F, R>(lock: Option<&L>, func: F) -> Result<R>
where
    L: Lockable,
    F: FnOnce() -> R,
{
    let lock = lock.ok_or_else(|| {
        ConcurrencyError::invalid_argument("run_with_lock", "lock is missing")
    })?;

    let guard = lock.acquire();
    let outcome = panic::catch_unwind(AssertUnwindSafe(func));
    drop(guard);

    outcome.map_err(|payload| {
        ConcurrencyError::task_failed("run_with_lock", panic_message(payload.as_ref()))
    })
}

/// Like `run_with_lock`, but hands the protected value to `func`.
pub fn run_locked<T, F, R>(mutex: Option<&Mutex<T>>, func: F) -> Result<R>
where
    F: FnOnce(&mut T) -> R,
{
    let mutex = mutex.ok_or_else(|| {
        ConcurrencyError::invalid_argument("run_locked", "lock is missing")
    })?;

    let mut guard = mutex.acquire();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| func(&mut guard)));
    drop(guard);

    outcome.map_err(|payload| {
        ConcurrencyError::task_failed("run_locked", panic_message(payload.as_ref()))
    })
}

struct LockState {
    owner: Option<ThreadId>,
    holds: usize,
}

struct LockInner {
    state: Mutex<LockState>,
    released: Condvar,
}

/// A reentrant mutual-exclusion lock.
///
/// Clones share the same underlying lock. The owning thread may acquire it
/// again; it is released once every guard has been dropped.
#[derive(Clone)]
pub struct Lock {
    inner: Arc<LockInner>,
}

pub struct LockGuard<'a> {
    lock: &'a Lock,
}

impl Lock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LockInner {
                state: Mutex::new(LockState {
                    owner: None,
                    holds: 0,
                }),
                released: Condvar::new(),
            }),
        }
    }

    pub fn lock(&self) -> LockGuard<'_> {
        let me = thread::current().id();
        let mut state = self.state();
        while state.owner.is_some_and(|owner| owner != me) {
            state = self
                .inner
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.owner = Some(me);
        state.holds += 1;
        LockGuard { lock: self }
    }

    pub fn try_lock(&self) -> Option<LockGuard<'_>> {
        let me = thread::current().id();
        let mut state = self.state();
        match state.owner {
            Some(owner) if owner != me => None,
            _ => {
                state.owner = Some(me);
                state.holds += 1;
                Some(LockGuard { lock: self })
            }
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state().owner.is_some()
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.state().owner == Some(thread::current().id())
    }

    /// Number of holds the calling thread has on this lock
    pub fn hold_count(&self) -> usize {
        let state = self.state();
        if state.owner == Some(thread::current().id()) {
            state.holds
        } else {
            0
        }
    }

    pub fn ptr_eq(&self, other: &Lock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        let mut state = self.state();
        state.holds -= 1;
        if state.holds == 0 {
            state.owner = None;
            self.inner.released.notify_one();
        }
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Lock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lock").field("locked", &self.is_locked()).finish()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

impl Lockable for Lock {
    type Guard<'a>
        = LockGuard<'a>
    where
        Self: 'a;

    fn acquire(&self) -> Self::Guard<'_> {
        self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_lock_basic() {
        let lock = Lock::new();
        assert!(!lock.is_locked());
        {
            let _guard = lock.lock();
            assert!(lock.is_locked());
            assert!(lock.is_held_by_current_thread());
            assert_eq!(lock.hold_count(), 1);
        }
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_lock_is_reentrant() {
        let lock = Lock::new();
        let outer = lock.lock();
        let inner = lock.lock();
        assert_eq!(lock.hold_count(), 2);
        drop(inner);
        assert!(lock.is_locked());
        drop(outer);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_try_lock_fails_for_other_thread() {
        let lock = Lock::new();
        let _guard = lock.lock();

        let other = lock.clone();
        let acquired = thread::spawn(move || other.try_lock().is_some())
            .join()
            .unwrap();
        assert!(!acquired);
    }

    #[test]
    fn test_missing_lock_is_invalid_argument() {
        let ran = AtomicUsize::new(0);
        let result = run_with_lock(None::<&Lock>, || {
            ran.fetch_add(1, Ordering::SeqCst);
        });
        assert!(matches!(
            result,
            Err(ConcurrencyError::InvalidArgument { operation: "run_with_lock", .. })
        ));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_run_with_lock_returns_value() {
        let lock = Lock::new();
        let value = run_with_lock(Some(&lock), || {
            assert!(lock.is_held_by_current_thread());
            "done"
        })
        .unwrap();
        assert_eq!(value, "done");
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_run_with_lock_releases_on_panic() {
        let lock = Lock::new();
        let result: Result<()> = run_with_lock(Some(&lock), || panic!("inside lock"));

        match result {
            Err(ConcurrencyError::TaskFailed { message, .. }) => {
                assert_eq!(message, "inside lock");
            }
            other => panic!("expected TaskFailed, got {:?}", other),
        }
        assert!(!lock.is_locked());
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn test_run_with_lock_on_std_mutex() {
        let mutex = Mutex::new(());
        run_with_lock(Some(&mutex), || {}).unwrap();
        assert!(mutex.try_lock().is_ok());
    }

    #[test]
    fn test_run_locked_mutates_value() {
        let counter = Mutex::new(41);
        let seen = run_locked(Some(&counter), |value| {
            *value += 1;
            *value
        })
        .unwrap();
        assert_eq!(seen, 42);
        assert_eq!(*counter.lock().unwrap(), 42);
    }

    #[test]
    fn test_lock_concurrent_mutual_exclusion() {
        let lock = Lock::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));
        let total = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = lock.clone();
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                let total = Arc::clone(&total);
                thread::spawn(move || {
                    for _ in 0..50 {
                        run_with_lock(Some(&lock), || {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_inside.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(Duration::from_micros(50));
                            total.fetch_add(1, Ordering::SeqCst);
                            inside.fetch_sub(1, Ordering::SeqCst);
                        })
                        .unwrap();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(total.load(Ordering::SeqCst), 400);
    }
}
