///
/// Future Handles
///
/// A `FutureHandle` is the caller's side of a task submitted to the
/// single-worker executor; the executor keeps the matching `Completer`.
/// The result is stored once and can be retrieved once, by blocking `get`,
/// bounded `get_timeout`, or non-blocking `try_get`.
///
/// A completer dropped without completing (its task was discarded by an
/// executor shutdown) resolves the future to `ExecutorShutdown`, so waiters
/// never hang on a task that will not run.
///

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use skein_std_core::{ConcurrencyError, Result};

use crate::interrupt::wait_interruptibly;

enum Slot<T> {
    Pending,
    Ready(Result<T>),
    Taken,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    ready: Arc<Condvar>,
}

impl<T> Shared<T> {
    fn slot(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fill(&self, result: Result<T>) {
        let mut slot = self.slot();
        if matches!(*slot, Slot::Pending) {
            *slot = Slot::Ready(result);
            self.ready.notify_all();
        }
    }
}

pub struct FutureHandle<T> {
    shared: Arc<Shared<T>>,
    poll: Duration,
}

pub struct Completer<T> {
    shared: Option<Arc<Shared<T>>>,
}

/// Create a connected future/completer pair
pub fn future_pair<T>(poll: Duration) -> (FutureHandle<T>, Completer<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot::Pending),
        ready: Arc::new(Condvar::new()),
    });
    (
        FutureHandle {
            shared: Arc::clone(&shared),
            poll,
        },
        Completer {
            shared: Some(shared),
        },
    )
}

impl<T> FutureHandle<T> {
    pub fn is_done(&self) -> bool {
        !matches!(*self.shared.slot(), Slot::Pending)
    }

    /// Block until the result is available. Interruptible.
    pub fn get(mut self) -> Result<T> {
        self.wait(None)
    }

    /// Block for at most `timeout`; fails with `Timeout` if still pending.
    pub fn get_timeout(&mut self, timeout: Duration) -> Result<T> {
        self.wait(Some(timeout))
    }

    /// Take the result if it is ready, without blocking
    pub fn try_get(&mut self) -> Option<Result<T>> {
        let mut slot = self.shared.slot();
        if matches!(*slot, Slot::Pending) {
            None
        } else {
            Some(take(&mut *slot))
        }
    }

    fn wait(&mut self, timeout: Option<Duration>) -> Result<T> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut slot = self.shared.slot();

        while matches!(*slot, Slot::Pending) {
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(ConcurrencyError::Timeout {
                            waited: timeout.unwrap_or_default(),
                        });
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            slot = wait_interruptibly(&self.shared.ready, slot, remaining, self.poll)?.0;
        }

        take(&mut *slot)
    }
}

fn take<T>(slot: &mut Slot<T>) -> Result<T> {
    match std::mem::replace(slot, Slot::Taken) {
        Slot::Ready(result) => result,
        Slot::Taken => Err(ConcurrencyError::invalid_argument(
            "future_get",
            "result has already been taken",
        )),
        Slot::Pending => unreachable!("take called on a pending future"),
    }
}

impl<T> std::fmt::Debug for FutureHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FutureHandle")
            .field("done", &self.is_done())
            .finish()
    }
}

impl<T> Completer<T> {
    pub fn complete(mut self, result: Result<T>) {
        if let Some(shared) = self.shared.take() {
            shared.fill(result);
        }
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.fill(Err(ConcurrencyError::ExecutorShutdown));
        }
    }
}
