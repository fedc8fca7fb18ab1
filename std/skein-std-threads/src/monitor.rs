//!
//! Monitors
//!
//! A monitor pairs one lock with one condition queue. Waiting and notifying
//! go through the guard returned by `Monitor::lock`, so the "must hold the
//! monitor's lock" precondition is checked by the type system: there is no
//! way to call `wait_on` or `notify_one` without holding it.
//!
//! ```
//! use std::sync::Arc;
//! use skein_std_threads::{Monitor, wait_on, notify_all};
//!
//! let ready = Arc::new(Monitor::new(false));
//! let signaller = Arc::clone(&ready);
//! std::thread::spawn(move || {
//!     let mut flag = signaller.lock();
//!     *flag = true;
//!     notify_all(&flag);
//! });
//!
//! let mut flag = ready.lock();
//! while !*flag {
//!     flag = wait_on(flag).unwrap();
//! }
//! ```
//!

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use skein_std_core::Result;

use crate::interrupt::{DEFAULT_INTERRUPT_POLL, wait_interruptibly};

pub struct Monitor<T> {
    state: Mutex<T>,
    condvar: Arc<Condvar>,
    poll: Duration,
}

pub struct MonitorGuard<'a, T> {
    monitor: &'a Monitor<T>,
    guard: MutexGuard<'a, T>,
}

impl<T> Monitor<T> {
    pub fn new(value: T) -> Self {
        Self::with_poll(value, DEFAULT_INTERRUPT_POLL)
    }

    /// Create a monitor whose waiters re-check their interrupt flag every `poll`
    pub fn with_poll(value: T, poll: Duration) -> Self {
        Self {
            state: Mutex::new(value),
            condvar: Arc::new(Condvar::new()),
            poll,
        }
    }

    pub fn lock(&self) -> MonitorGuard<'_, T> {
        MonitorGuard {
            monitor: self,
            guard: self.state.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    pub fn into_inner(self) -> T {
        self.state.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Default> Default for Monitor<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<'a, T> MonitorGuard<'a, T> {
    /// Release the monitor, block until notified, then reacquire it.
    ///
    /// Wakeups may be spurious; callers loop on their condition.
    pub fn wait(self) -> Result<Self> {
        let MonitorGuard { monitor, guard } = self;
        let (guard, _) = wait_interruptibly(&monitor.condvar, guard, None, monitor.poll)?;
        Ok(MonitorGuard { monitor, guard })
    }

    /// Like `wait`, but gives up after `timeout`. The flag is true on timeout.
    pub fn wait_for(self, timeout: Duration) -> Result<(Self, bool)> {
        let MonitorGuard { monitor, guard } = self;
        let (guard, timed_out) =
            wait_interruptibly(&monitor.condvar, guard, Some(timeout), monitor.poll)?;
        Ok((MonitorGuard { monitor, guard }, timed_out))
    }

    pub fn notify_one(&self) {
        self.monitor.condvar.notify_one();
    }

    pub fn notify_all(&self) {
        self.monitor.condvar.notify_all();
    }
}

impl<T> Deref for MonitorGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for MonitorGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

pub fn wait_on<T>(guard: MonitorGuard<'_, T>) -> Result<MonitorGuard<'_, T>> {
    guard.wait()
}

pub fn wait_on_for<T>(
    guard: MonitorGuard<'_, T>,
    timeout: Duration,
) -> Result<(MonitorGuard<'_, T>, bool)> {
    guard.wait_for(timeout)
}

pub fn notify_one<T>(guard: &MonitorGuard<'_, T>) {
    guard.notify_one();
}

pub fn notify_all<T>(guard: &MonitorGuard<'_, T>) {
    guard.notify_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::{InterruptToken, install_token};
    use skein_std_core::ConcurrencyError;
    use std::thread;

    #[test]
    fn test_wait_and_notify() {
        let monitor = Arc::new(Monitor::new(0));
        let producer = Arc::clone(&monitor);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            let mut value = producer.lock();
            *value = 7;
            notify_one(&value);
        });

        let mut value = monitor.lock();
        while *value == 0 {
            value = wait_on(value).unwrap();
        }
        assert_eq!(*value, 7);
        drop(value);
        handle.join().unwrap();
    }

    #[test]
    fn test_notify_all_wakes_every_waiter() {
        let monitor = Arc::new(Monitor::new(false));

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let monitor = Arc::clone(&monitor);
                thread::spawn(move || {
                    let mut open = monitor.lock();
                    while !*open {
                        open = wait_on(open).unwrap();
                    }
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(30));
        {
            let mut open = monitor.lock();
            *open = true;
            notify_all(&open);
        }

        for w in waiters {
            w.join().unwrap();
        }
    }

    #[test]
    fn test_wait_for_times_out() {
        let monitor = Monitor::new(());
        let (_guard, timed_out) = wait_on_for(monitor.lock(), Duration::from_millis(20)).unwrap();
        assert!(timed_out);
    }

    #[test]
    fn test_wait_is_interruptible() {
        let monitor = Arc::new(Monitor::new(()));
        let token = InterruptToken::new();
        let worker_token = token.clone();
        let worker_monitor = Arc::clone(&monitor);

        let handle = thread::spawn(move || {
            install_token(worker_token);
            let guard = worker_monitor.lock();
            wait_on(guard).map(|_| ())
        });

        thread::sleep(Duration::from_millis(30));
        token.interrupt();

        assert!(matches!(handle.join().unwrap(), Err(ConcurrencyError::Interrupted)));
        // lock is free again after the failed wait
        drop(monitor.lock());
    }

    #[test]
    fn test_into_inner() {
        let monitor = Monitor::new(vec![1, 2]);
        monitor.lock().push(3);
        assert_eq!(monitor.into_inner(), vec![1, 2, 3]);
    }
}
