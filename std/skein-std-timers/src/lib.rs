///
/// skein-std-timers - Periodic and delayed callbacks
///
/// Provides schedule_periodic, schedule_once, and cancel_periodic. Every
/// timer owns one daemon thread that sleeps, checks for cancellation, then
/// runs the callback.
///
/// ## Scheduling
///
/// Intervals are fixed-delay: the next sleep starts when the callback
/// returns, so callbacks on one timer never overlap and a slow callback
/// pushes later ticks back. Intervals below the configured minimum (1ms by
/// default) are raised to it, so a zero interval does not spin.
///
/// ## Cancellation
///
/// `cancel_periodic` sets the timer's cancelled flag and interrupts its
/// thread. The flag is checked after every sleep, and the interrupt cuts a
/// sleep short. A callback already running when the cancel arrives is left
/// to finish. A cancel that lands between the flag check and the call lets
/// that one callback run, so at most one callback runs after `cancel`
/// returns and none after that.
///
/// ## Failures
///
/// A panicking callback is logged and ends its timer.
///

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use skein_std_core::{Result, Task, catch_task};
use skein_std_threads::{Spawner, ThreadHandle, sleep};
use tracing::{debug, warn};

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

struct TimerState {
    id: u64,
    cancelled: AtomicBool,
    ticks: AtomicU64,
}

/// Handle to a running timer
#[derive(Clone)]
pub struct TimerHandle {
    state: Arc<TimerState>,
    thread: ThreadHandle,
    interval: Duration,
    repeating: bool,
}

impl TimerHandle {
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Stop the timer. At most one more callback runs (one already in
    /// progress, or one that passed the cancellation check); none after it.
    pub fn cancel(&self) {
        if !self.state.cancelled.swap(true, Ordering::SeqCst) {
            debug!(timer = self.state.id, "timer cancelled");
        }
        self.thread.interrupt();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Whether the timer thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Number of completed callback invocations
    pub fn ticks(&self) -> u64 {
        self.state.ticks.load(Ordering::SeqCst)
    }

    /// Effective interval after clamping
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_repeating(&self) -> bool {
        self.repeating
    }

    pub fn thread(&self) -> &ThreadHandle {
        &self.thread
    }

    /// Block until the timer thread exits
    pub fn join(&self) -> Result<()> {
        self.thread.join()
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("id", &self.state.id)
            .field("interval", &self.interval)
            .field("repeating", &self.repeating)
            .field("cancelled", &self.is_cancelled())
            .field("ticks", &self.ticks())
            .finish()
    }
}

/// Run `callback` every `interval` on a dedicated daemon thread until cancelled
pub fn schedule_periodic<F>(
    spawner: &Spawner,
    callback: F,
    interval: Duration,
    min_interval: Duration,
) -> Result<TimerHandle>
where
    F: FnMut() + Send + 'static,
{
    start_timer(spawner, callback, interval.max(min_interval), true)
}

/// Run `callback` once after `delay`, unless cancelled first
pub fn schedule_once<F>(spawner: &Spawner, callback: F, delay: Duration) -> Result<TimerHandle>
where
    F: FnOnce() + Send + 'static,
{
    let mut callback = Some(callback);
    start_timer(
        spawner,
        move || {
            if let Some(callback) = callback.take() {
                callback();
            }
        },
        delay,
        false,
    )
}

/// Stop a timer started by `schedule_periodic` or `schedule_once`.
///
/// At most one callback runs after this returns.
pub fn cancel_periodic(handle: &TimerHandle) {
    handle.cancel();
}

fn start_timer<F>(
    spawner: &Spawner,
    mut callback: F,
    interval: Duration,
    repeating: bool,
) -> Result<TimerHandle>
where
    F: FnMut() + Send + 'static,
{
    let state = Arc::new(TimerState {
        id: NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed),
        cancelled: AtomicBool::new(false),
        ticks: AtomicU64::new(0),
    });

    let id = state.id;
    let worker_state = Arc::clone(&state);
    let task_name = format!("timer-{}", id);
    let loop_name = task_name.clone();

    let thread = spawner.spawn_daemon(Task::named(task_name, move || {
        loop {
            if sleep(interval).is_err() {
                break;
            }
            if worker_state.cancelled.load(Ordering::SeqCst) {
                break;
            }
            if let Err(err) = catch_task(&loop_name, &mut callback) {
                warn!(timer = id, error = %err, "timer callback failed; timer stopped");
                break;
            }
            worker_state.ticks.fetch_add(1, Ordering::SeqCst);
            if !repeating {
                break;
            }
        }
        debug!(timer = id, "timer thread exiting");
    }))?;

    debug!(timer = id, interval_ms = interval.as_millis() as u64, repeating, "timer started");

    Ok(TimerHandle {
        state,
        thread,
        interval,
        repeating,
    })
}
