///
/// Operation catalogue
///
/// One entry per facade operation, with a short description a host can show
/// as help text. Serialisable so tools can emit it as JSON.
///

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Operation {
    pub name: &'static str,
    pub signature: &'static str,
    pub summary: &'static str,
}

const OPERATIONS: &[Operation] = &[
    Operation {
        name: "wait_on",
        signature: "wait_on(guard) -> guard",
        summary: "release a monitor, block until notified, reacquire it",
    },
    Operation {
        name: "notify_one",
        signature: "notify_one(&guard)",
        summary: "wake one thread waiting on a monitor",
    },
    Operation {
        name: "notify_all",
        signature: "notify_all(&guard)",
        summary: "wake every thread waiting on a monitor",
    },
    Operation {
        name: "spawn",
        signature: "spawn(task) -> ThreadHandle",
        summary: "start a thread that shutdown waits for",
    },
    Operation {
        name: "spawn_daemon",
        signature: "spawn_daemon(task) -> ThreadHandle",
        summary: "start a thread that does not delay shutdown",
    },
    Operation {
        name: "submit_future",
        signature: "submit_future(task) -> FutureHandle",
        summary: "run a task on the shared single-worker executor",
    },
    Operation {
        name: "register_at_exit",
        signature: "register_at_exit(task)",
        summary: "run a task once during orderly shutdown",
    },
    Operation {
        name: "run_with_lock",
        signature: "run_with_lock(lock, task) -> result",
        summary: "run a task holding a lock, releasing it on every path",
    },
    Operation {
        name: "sleep",
        signature: "sleep(duration)",
        summary: "block the calling thread; fails if interrupted",
    },
    Operation {
        name: "schedule_periodic",
        signature: "schedule_periodic(callback, interval) -> TimerHandle",
        summary: "call a callback every interval on a daemon thread",
    },
    Operation {
        name: "schedule_once",
        signature: "schedule_once(callback, delay) -> TimerHandle",
        summary: "call a callback once after a delay",
    },
    Operation {
        name: "cancel_periodic",
        signature: "cancel_periodic(&handle)",
        summary: "stop a timer; a callback in progress may finish",
    },
    Operation {
        name: "thread_local",
        signature: "thread_local::{get, set, has, delete}(name)",
        summary: "per-thread values under shared names",
    },
];

pub fn operations() -> &'static [Operation] {
    OPERATIONS
}

pub fn describe(name: &str) -> Option<&'static Operation> {
    OPERATIONS.iter().find(|op| op.name == name)
}
