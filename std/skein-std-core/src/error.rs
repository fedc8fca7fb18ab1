///
/// Concurrency error types.
///
/// Every fallible skein operation reports one of these. Bad arguments fail
/// before any side effect. Task panics are carried back to whoever can
/// observe them (the lock-guard caller or the future holder).
///

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConcurrencyError {
    #[error("Invalid argument to {operation}: {reason}")]
    InvalidArgument {
        operation: &'static str,
        reason: String,
    },

    #[error("Interrupted while blocked")]
    Interrupted,

    #[error("Task '{task}' failed: {message}")]
    TaskFailed { task: String, message: String },

    #[error("Executor has been shut down")]
    ExecutorShutdown,

    #[error("Timed out after {}ms", waited.as_millis())]
    Timeout { waited: Duration },

    #[error("Failed to spawn thread: {0}")]
    Spawn(std::io::Error),

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ConcurrencyError {
    pub fn invalid_argument(operation: &'static str, reason: impl Into<String>) -> Self {
        ConcurrencyError::InvalidArgument {
            operation,
            reason: reason.into(),
        }
    }

    pub fn task_failed(task: impl Into<String>, message: impl Into<String>) -> Self {
        ConcurrencyError::TaskFailed {
            task: task.into(),
            message: message.into(),
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, ConcurrencyError::Interrupted)
    }
}

pub type Result<T> = std::result::Result<T, ConcurrencyError>;
