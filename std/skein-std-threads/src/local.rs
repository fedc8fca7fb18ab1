//!
//! Named Thread-Local Storage
//!
//! `LocalCell<V>` is one per-thread storage slot: every thread sees its own
//! value, and a thread that never wrote reads `None`. `ThreadLocals<V>` maps
//! names to cells. The registry is shared by all threads; the values are
//! not.
//!
//! Cells are created on the first `set` of a name. Creation runs under the
//! registry lock, so two threads racing on a new name end up with one cell.
//! `delete` only clears the calling thread's value; the cell stays in the
//! registry because other threads may still hold values under that name.
//!
//! Values live in the thread's own storage and are dropped when the thread
//! exits.
//!

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use skein_std_core::Result;
use tracing::debug;

use crate::mutex::run_locked;

static NEXT_CELL_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static SLOTS: RefCell<HashMap<u64, Box<dyn Any>>> = RefCell::new(HashMap::new());
}

/// A per-thread value slot
pub struct LocalCell<V> {
    id: u64,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for LocalCell<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for LocalCell<V> {}

impl<V: Clone + 'static> LocalCell<V> {
    pub fn new() -> Self {
        Self {
            id: NEXT_CELL_ID.fetch_add(1, Ordering::Relaxed),
            _value: PhantomData,
        }
    }

    pub fn get(&self) -> Option<V> {
        SLOTS
            .try_with(|slots| {
                slots
                    .borrow()
                    .get(&self.id)
                    .and_then(|value| value.downcast_ref::<V>())
                    .cloned()
            })
            .ok()
            .flatten()
    }

    /// Store `value` for the calling thread, returning the previous one
    pub fn set(&self, value: V) -> Option<V> {
        let previous = SLOTS
            .try_with(|slots| slots.borrow_mut().insert(self.id, Box::new(value)))
            .ok()
            .flatten();
        previous.and_then(|old| old.downcast::<V>().ok().map(|old| *old))
    }

    /// Clear the calling thread's value, returning it
    pub fn take(&self) -> Option<V> {
        let previous = SLOTS
            .try_with(|slots| slots.borrow_mut().remove(&self.id))
            .ok()
            .flatten();
        previous.and_then(|old| old.downcast::<V>().ok().map(|old| *old))
    }

    pub fn is_set(&self) -> bool {
        SLOTS
            .try_with(|slots| slots.borrow().contains_key(&self.id))
            .unwrap_or(false)
    }
}

impl<V: Clone + 'static> Default for LocalCell<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of named thread-local cells
pub struct ThreadLocals<V> {
    cells: Mutex<HashMap<String, LocalCell<V>>>,
}

impl<V: Clone + 'static> ThreadLocals<V> {
    pub fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// The calling thread's value for `name`, if it has one
    pub fn get(&self, name: &str) -> Option<V> {
        self.cell(name)?.get()
    }

    /// Store `value` under `name` for the calling thread only
    pub fn set(&self, name: &str, value: V) -> Result<()> {
        let cell = run_locked(Some(&self.cells), |cells| {
            *cells.entry(name.to_string()).or_insert_with(|| {
                debug!(cell = name, "thread-local cell created");
                LocalCell::new()
            })
        })?;
        // dropped outside the registry lock
        let _previous = cell.set(value);
        Ok(())
    }

    /// Whether the calling thread currently holds a value for `name`
    pub fn has(&self, name: &str) -> bool {
        self.cell(name).is_some_and(|cell| cell.is_set())
    }

    /// Clear the calling thread's value for `name`. Returns whether one was set.
    pub fn delete(&self, name: &str) -> bool {
        self.cell(name).and_then(|cell| cell.take()).is_some()
    }

    /// Number of cells ever created, across all threads
    pub fn cell_count(&self) -> usize {
        self.lock_cells().len()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock_cells().keys().cloned().collect();
        names.sort();
        names
    }

    fn cell(&self, name: &str) -> Option<LocalCell<V>> {
        self.lock_cells().get(name).copied()
    }

    fn lock_cells(&self) -> std::sync::MutexGuard<'_, HashMap<String, LocalCell<V>>> {
        self.cells.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<V: Clone + 'static> Default for ThreadLocals<V> {
    fn default() -> Self {
        Self::new()
    }
}
