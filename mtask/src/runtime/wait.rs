//! Blocking waits shared by tasks and groups.
//!
//! A thread that is not a worker simply parks on its thread-local signal. A
//! worker thread instead keeps draining its own ready queue while it waits, so a
//! task body can spawn sub-tasks and wait on them without starving the pool.
use crate::runtime::context;
use crate::runtime::scheduler::Handle;
use crate::timeout::Timeout;
use crate::utils::{ScopeGuard, Signal};
use std::sync::Arc;
use std::time::Instant;

/// Something a thread can block on.
pub(crate) trait Waitable {
    type Output;

    /// Returns the output if the condition holds, otherwise registers `signal`
    /// to be notified on progress. Both happen under the owner's lock.
    fn poll_or_register(&self, signal: &Arc<Signal>) -> Option<Self::Output>;

    fn deregister(&self, signal: &Arc<Signal>);
}

/// Blocks until `waitable` yields an output or the timeout expires, in which
/// case `None` is returned.
pub(crate) fn block_on<W: Waitable>(
    handle: &Handle,
    waitable: &W,
    timeout: Timeout,
) -> Option<W::Output> {
    let deadline = timeout.deadline();
    let worker = context::worker_index_for(handle);

    let signal = match worker {
        Some(index) => handle.worker_signal(index),
        None => context::thread_signal(),
    };

    let _deregister = ScopeGuard::new(|| waitable.deregister(&signal));

    loop {
        if let Some(output) = waitable.poll_or_register(&signal) {
            return Some(output);
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            return None;
        }

        // Reentrant loop: run our own ready tasks instead of parking.
        if let Some(index) = worker
            && handle.run_next(index)
        {
            continue;
        }

        if signal.wait(deadline).is_empty() {
            return waitable.poll_or_register(&signal);
        }
    }
}
