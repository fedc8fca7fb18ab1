//!
//! Tasks
//!
//! A task is a zero-argument unit of work that is consumed exactly once,
//! either by a freshly spawned thread, by a lock-guarded call, or by the
//! future executor. Arguments are captured up front, either by a closure or
//! through `bind`.
//!

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::error::{ConcurrencyError, Result};

/// Name given to tasks created without an explicit one
pub const ANONYMOUS_TASK: &str = "<anonymous>";

pub struct Task {
    name: String,
    func: Box<dyn FnOnce() + Send + 'static>,
}

impl Task {
    pub fn new<F>(func: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::named(ANONYMOUS_TASK, func)
    }

    pub fn named<F>(name: impl Into<String>, func: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the task, turning a panic into `TaskFailed`.
    pub fn run(self) -> Result<()> {
        let Task { name, func } = self;
        catch_task(&name, func)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<F> From<F> for Task
where
    F: FnOnce() + Send + 'static,
{
    fn from(func: F) -> Self {
        Task::new(func)
    }
}

/// Bind a function to its arguments, producing a zero-argument callable.
///
/// ```
/// let add = skein_std_core::bind(|(a, b): (i64, i64)| a + b, (2, 3));
/// assert_eq!(add(), 5);
/// ```
pub fn bind<A, R, F>(func: F, args: A) -> impl FnOnce() -> R
where
    F: FnOnce(A) -> R,
{
    move || func(args)
}

/// Invoke `func`, converting an unwinding panic into `TaskFailed`.
pub fn catch_task<R>(name: &str, func: impl FnOnce() -> R) -> Result<R> {
    panic::catch_unwind(AssertUnwindSafe(func))
        .map_err(|payload| ConcurrencyError::task_failed(name, panic_message(payload.as_ref())))
}

/// Extract the human-readable message from a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
