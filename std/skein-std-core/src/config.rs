///
/// # Configuration
///
/// Runtime knobs read from a `skein.toml` file (or any TOML string). Every
/// field has a default, so an empty document is a valid configuration.
///
/// ## Example skein.toml
///
/// ```toml
/// thread_name_prefix = "worker"
/// executor_thread_name = "worker-future"
/// stack_size = 2097152
/// min_interval_ms = 5
/// interrupt_poll_ms = 10
/// ```
///
/// `min_interval_ms` is the floor applied to periodic intervals; a zero
/// interval is raised to it instead of spinning. `interrupt_poll_ms` bounds
/// how long a monitor or future wait may sleep before it re-checks whether
/// its thread was interrupted.
///

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ConcurrencyError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub thread_name_prefix: String,
    pub executor_thread_name: String,
    pub stack_size: Option<usize>,
    pub min_interval_ms: u64,
    pub interrupt_poll_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            thread_name_prefix: "skein".to_string(),
            executor_thread_name: "skein-future".to_string(),
            stack_size: None,
            min_interval_ms: 1,
            interrupt_poll_ms: 10,
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.thread_name_prefix.is_empty() {
            return Err(config_error("thread_name_prefix must not be empty"));
        }
        if self.executor_thread_name.is_empty() {
            return Err(config_error("executor_thread_name must not be empty"));
        }
        if self.min_interval_ms == 0 {
            return Err(config_error("min_interval_ms must be at least 1"));
        }
        if self.interrupt_poll_ms == 0 {
            return Err(config_error("interrupt_poll_ms must be at least 1"));
        }
        if self.stack_size == Some(0) {
            return Err(config_error("stack_size must be positive when set"));
        }
        Ok(())
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn interrupt_poll(&self) -> Duration {
        Duration::from_millis(self.interrupt_poll_ms)
    }
}

fn config_error(reason: &str) -> ConcurrencyError {
    ConcurrencyError::Config {
        reason: reason.to_string(),
    }
}
