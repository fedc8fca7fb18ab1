///
/// Thread Interruption
///
/// Every thread owns an interrupt token. Interrupting a thread raises its
/// flag and wakes it if it is parked in one of the skein blocking calls:
/// `sleep`, a monitor wait, a future retrieval, or a thread join. The
/// blocked call then fails with `ConcurrencyError::Interrupted` and clears
/// the flag. Code that never blocks does not observe interruption until its
/// next blocking call.
///
/// Threads started by the spawner share their token with the returned
/// `ThreadHandle`. Any other thread gets a token the first time it asks.
///
/// ## Waking condvar waiters
///
/// A thread blocked on some other component's condvar registers that condvar
/// as its blocker so `interrupt` can notify it. The waiter additionally
/// re-checks its flag every poll interval, which closes the window where the
/// interrupt lands between the flag check and the wait.
///

use std::cell::OnceCell;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use skein_std_core::{ConcurrencyError, Result};

/// Poll interval used when no configuration is at hand
pub const DEFAULT_INTERRUPT_POLL: Duration = Duration::from_millis(10);

struct InterruptState {
    interrupted: Mutex<bool>,
    wakeup: Condvar,
    blocker: Mutex<Option<Arc<Condvar>>>,
}

impl InterruptState {
    fn new() -> Self {
        Self {
            interrupted: Mutex::new(false),
            wakeup: Condvar::new(),
            blocker: Mutex::new(None),
        }
    }
}

#[derive(Clone)]
pub struct InterruptToken {
    state: Arc<InterruptState>,
}

impl InterruptToken {
    pub fn new() -> Self {
        Self {
            state: Arc::new(InterruptState::new()),
        }
    }

    /// Raise the interrupt flag and wake the owning thread if it is blocked
    pub fn interrupt(&self) {
        *lock(&self.state.interrupted) = true;
        self.state.wakeup.notify_all();

        let blocker = lock(&self.state.blocker).clone();
        if let Some(condvar) = blocker {
            condvar.notify_all();
        }
    }

    pub fn is_interrupted(&self) -> bool {
        *lock(&self.state.interrupted)
    }

    /// Test and clear the interrupt flag
    pub fn take(&self) -> bool {
        std::mem::replace(&mut *lock(&self.state.interrupted), false)
    }

    pub fn ptr_eq(&self, other: &InterruptToken) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    fn sleep(&self, duration: Duration) -> Result<()> {
        let deadline = Instant::now().checked_add(duration);
        let mut interrupted = lock(&self.state.interrupted);

        loop {
            if *interrupted {
                *interrupted = false;
                return Err(ConcurrencyError::Interrupted);
            }

            interrupted = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(());
                    }
                    self.state
                        .wakeup
                        .wait_timeout(interrupted, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .state
                    .wakeup
                    .wait(interrupted)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    fn set_blocker(&self, condvar: Option<Arc<Condvar>>) {
        *lock(&self.state.blocker) = condvar;
    }
}

impl Default for InterruptToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InterruptToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptToken")
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

thread_local! {
    static CURRENT_TOKEN: OnceCell<InterruptToken> = const { OnceCell::new() };
}

/// Bind `token` to the calling thread. Only the first binding sticks.
pub(crate) fn install_token(token: InterruptToken) {
    CURRENT_TOKEN.with(|current| {
        let _ = current.set(token);
    });
}

/// The calling thread's interrupt token
pub fn current_token() -> InterruptToken {
    CURRENT_TOKEN.with(|current| current.get_or_init(InterruptToken::new).clone())
}

/// Whether the calling thread has a pending interrupt (does not clear it)
pub fn current_interrupted() -> bool {
    current_token().is_interrupted()
}

/// Test and clear the calling thread's interrupt flag
pub fn take_interrupt() -> bool {
    current_token().take()
}

/// Block the calling thread for at least `duration`.
///
/// Returns early only when the thread is interrupted, in which case the
/// interrupt is consumed and `Interrupted` is returned.
pub fn sleep(duration: Duration) -> Result<()> {
    current_token().sleep(duration)
}

/// Wait on `condvar` with the calling thread registered as interruptible.
///
/// Returns the reacquired guard and whether the optional timeout elapsed.
/// Like any condvar wait this may wake spuriously, so callers loop on their
/// own predicate.
pub(crate) fn wait_interruptibly<'a, T>(
    condvar: &Arc<Condvar>,
    guard: MutexGuard<'a, T>,
    timeout: Option<Duration>,
    poll: Duration,
) -> Result<(MutexGuard<'a, T>, bool)> {
    let token = current_token();
    token.set_blocker(Some(Arc::clone(condvar)));

    let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
    let mut guard = guard;
    let outcome = loop {
        if token.take() {
            break Err(ConcurrencyError::Interrupted);
        }

        let slice = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    break Ok(true);
                }
                (deadline - now).min(poll)
            }
            None => poll,
        };

        let (next, result) = condvar
            .wait_timeout(guard, slice)
            .unwrap_or_else(PoisonError::into_inner);
        guard = next;

        if token.take() {
            break Err(ConcurrencyError::Interrupted);
        }
        if !result.timed_out() {
            break Ok(false);
        }
    };

    token.set_blocker(None);
    outcome.map(|timed_out| (guard, timed_out))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
