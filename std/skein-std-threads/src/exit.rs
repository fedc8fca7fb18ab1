///
/// Exit Hooks
///
/// Tasks registered here run once, during orderly shutdown. Each hook gets a
/// thread of its own; all hooks are started together and then joined, so no
/// ordering between hooks is promised. A hook that panics is logged and does
/// not stop the others.
///
/// Running the hooks a second time does nothing, and registering after the
/// hooks have started is rejected.
///

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use skein_std_core::{ConcurrencyError, Result, Task};
use tracing::{debug, warn};

pub struct ExitHooks {
    hooks: Mutex<Vec<Task>>,
    started: AtomicBool,
    thread_prefix: String,
}

/// Outcome of running the exit hooks
#[derive(Debug, Default)]
pub struct ExitReport {
    pub ran: usize,
    pub failures: Vec<ConcurrencyError>,
}

impl ExitHooks {
    pub fn new(thread_prefix: &str) -> Self {
        Self {
            hooks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            thread_prefix: thread_prefix.to_string(),
        }
    }

    pub fn register(&self, task: impl Into<Task>) -> Result<()> {
        let mut hooks = self.hooks();
        if self.started.load(Ordering::SeqCst) {
            return Err(ConcurrencyError::invalid_argument(
                "register_at_exit",
                "shutdown is already in progress",
            ));
        }
        let task = task.into();
        debug!(task = %task.name(), "exit hook registered");
        hooks.push(task);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.hooks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_run(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Run every registered hook once, each on its own thread
    pub fn run_all(&self) -> ExitReport {
        let hooks = {
            let mut hooks = self.hooks();
            if self.started.swap(true, Ordering::SeqCst) {
                return ExitReport::default();
            }
            std::mem::take(&mut *hooks)
        };

        let mut report = ExitReport::default();
        let mut running = Vec::with_capacity(hooks.len());

        for (index, task) in hooks.into_iter().enumerate() {
            let name = task.name().to_string();
            let spawned = thread::Builder::new()
                .name(format!("{}-exit-{}", self.thread_prefix, index + 1))
                .spawn(move || task.run());
            match spawned {
                Ok(handle) => running.push((name, handle)),
                Err(err) => {
                    warn!(task = %name, error = %err, "could not start exit hook");
                    report.failures.push(ConcurrencyError::Spawn(err));
                }
            }
        }

        for (name, handle) in running {
            report.ran += 1;
            let outcome = handle.join().unwrap_or_else(|_| {
                Err(ConcurrencyError::task_failed(&name, "exit hook thread aborted"))
            });
            if let Err(err) = outcome {
                warn!(task = %name, error = %err, "exit hook failed");
                report.failures.push(err);
            }
        }

        report
    }

    fn hooks(&self) -> MutexGuard<'_, Vec<Task>> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicI64;

    #[test]
    fn test_hooks_run_once() {
        let hooks = ExitHooks::new("test");
        let counter = Arc::new(AtomicI64::new(0));

        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            hooks
                .register(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        assert_eq!(hooks.len(), 3);

        let report = hooks.run_all();
        assert_eq!(report.ran, 3);
        assert!(report.failures.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        let again = hooks.run_all();
        assert_eq!(again.ran, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_failing_hook_does_not_block_others() {
        let hooks = ExitHooks::new("test");
        let counter = Arc::new(AtomicI64::new(0));

        hooks
            .register(Task::named("bad", || panic!("hook failed")))
            .unwrap();
        let c = Arc::clone(&counter);
        hooks
            .register(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let report = hooks.run_all();
        assert_eq!(report.ran, 2);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].to_string().contains("hook failed"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hooks_run_on_their_own_threads() {
        let hooks = ExitHooks::new("test");
        let names = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&names);
        hooks
            .register(move || {
                let name = thread::current().name().map(str::to_string);
                seen.lock().unwrap().push(name);
            })
            .unwrap();

        hooks.run_all();
        assert_eq!(*names.lock().unwrap(), vec![Some("test-exit-1".to_string())]);
    }

    #[test]
    fn test_register_after_run_is_rejected() {
        let hooks = ExitHooks::new("test");
        hooks.run_all();
        assert!(hooks.has_run());
        let err = hooks.register(|| {}).unwrap_err();
        assert!(matches!(err, ConcurrencyError::InvalidArgument { .. }));
    }
}
