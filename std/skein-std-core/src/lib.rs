//!
//! skein-std-core - Core Types
//!
//! This crate provides the pieces shared by every skein standard library crate:
//!
//! - `ConcurrencyError` and the `Result` alias
//! - `Task` for boxed zero-argument work, plus `bind` for argument capture
//! - `Config` for runtime knobs loaded from TOML
//!
//! Panics raised inside tasks are caught at the task boundary and turned into
//! `ConcurrencyError::TaskFailed` so callers that can observe a task's outcome
//! receive a value instead of an unwinding thread.
//!

pub mod config;
pub mod error;
pub mod task;

pub use config::*;
pub use error::*;
pub use task::*;
