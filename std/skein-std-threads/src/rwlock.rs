//!
//! Read/Write Lock Pair
//!
//! A reader-writer lock whose two sides are separate lock handles: `read()`
//! admits any number of concurrent holders, `write()` admits one holder and
//! excludes readers. Either side can be passed to `run_with_lock`.
//!
//! ```
//! use skein_std_threads::{RwLock, run_with_lock};
//!
//! let rw = RwLock::new();
//! run_with_lock(Some(&rw.read()), || println!("reading")).unwrap();
//! run_with_lock(Some(&rw.write()), || println!("writing")).unwrap();
//! ```
//!
//! Unlike `Lock`, neither side is reentrant: a thread that already holds
//! the write side and asks for it again blocks forever.
//!

use std::sync::{Arc, PoisonError, RwLockReadGuard, RwLockWriteGuard};

use crate::mutex::Lockable;

#[derive(Clone, Default)]
pub struct RwLock {
    inner: Arc<std::sync::RwLock<()>>,
}

/// Shared side of an `RwLock`
#[derive(Clone, Copy)]
pub struct ReadLock<'r> {
    inner: &'r std::sync::RwLock<()>,
}

/// Exclusive side of an `RwLock`
#[derive(Clone, Copy)]
pub struct WriteLock<'r> {
    inner: &'r std::sync::RwLock<()>,
}

impl RwLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> ReadLock<'_> {
        ReadLock { inner: &self.inner }
    }

    pub fn write(&self) -> WriteLock<'_> {
        WriteLock { inner: &self.inner }
    }

    /// True while a writer holds the lock
    pub fn is_write_locked(&self) -> bool {
        matches!(
            self.inner.try_read(),
            Err(std::sync::TryLockError::WouldBlock)
        )
    }

    pub fn ptr_eq(&self, other: &RwLock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for RwLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RwLock")
            .field("write_locked", &self.is_write_locked())
            .finish()
    }
}

impl<'r> Lockable for ReadLock<'r> {
    type Guard<'a>
        = RwLockReadGuard<'a, ()>
    where
        Self: 'a;

    fn acquire(&self) -> Self::Guard<'_> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<'r> Lockable for WriteLock<'r> {
    type Guard<'a>
        = RwLockWriteGuard<'a, ()>
    where
        Self: 'a;

    fn acquire(&self) -> Self::Guard<'_> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutex::run_with_lock;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_readers_share() {
        let rw = RwLock::new();
        let barrier = Arc::new(Barrier::new(3));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let rw = rw.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    run_with_lock(Some(&rw.read()), || {
                        // every reader must be inside at once for the barrier to open
                        barrier.wait();
                    })
                    .unwrap();
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_writer_excludes_readers() {
        let rw = RwLock::new();
        let observed_write = Arc::new(AtomicUsize::new(0));

        {
            let write = rw.write();
            let _guard = write.acquire();
            assert!(rw.is_write_locked());

            let reader = rw.clone();
            let seen = Arc::clone(&observed_write);
            let handle = thread::spawn(move || {
                let blocked = reader.inner.try_read().is_err();
                seen.store(blocked as usize, Ordering::SeqCst);
            });
            handle.join().unwrap();
        }

        assert_eq!(observed_write.load(Ordering::SeqCst), 1);
        assert!(!rw.is_write_locked());
    }

    #[test]
    fn test_write_side_released_after_panic() {
        let rw = RwLock::new();
        let result: skein_std_core::Result<()> =
            run_with_lock(Some(&rw.write()), || panic!("writer failed"));
        assert!(result.is_err());
        assert!(!rw.is_write_locked());
        run_with_lock(Some(&rw.read()), || {}).unwrap();
    }
}
