use bitflags::bitflags;
use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::Instant;

bitflags! {
    /// Why a parked thread was woken up.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub(crate) struct Wake: u8 {
        /// A task was pushed on the worker's ready queue.
        const TASK_READY = 1;

        /// A task or group the thread is waiting on made progress.
        const COMPLETION = 1 << 1;

        /// The runtime is shutting down.
        const SHUTDOWN = 1 << 2;
    }
}

/// A one-thread parking spot.
///
/// Notifications are sticky: a `notify` issued while nobody waits is consumed
/// by the next `wait`, so there is no lost wakeup between checking a condition
/// and parking. Only the owning thread waits on a signal, any thread notifies.
#[derive(Debug)]
pub(crate) struct Signal {
    pending: Mutex<Wake>,
    cv: Condvar,
}

impl Signal {
    pub(crate) fn new() -> Self {
        Self {
            pending: Mutex::new(Wake::empty()),
            cv: Condvar::new(),
        }
    }

    pub(crate) fn notify(&self, reason: Wake) {
        let mut pending = self.pending.lock();
        pending.insert(reason);
        self.cv.notify_one();
    }

    /// Parks until notified or until `deadline`. Returns the accumulated wake
    /// reasons, which are empty if the deadline passed first.
    pub(crate) fn wait(&self, deadline: Option<Instant>) -> Wake {
        let mut pending = self.pending.lock();

        while pending.is_empty() {
            match deadline {
                None => self.cv.wait(&mut pending),
                Some(deadline) => {
                    if self.cv.wait_until(&mut pending, deadline).timed_out() {
                        break;
                    }
                }
            }
        }

        std::mem::replace(&mut *pending, Wake::empty())
    }
}

/// Signals registered on a task or group. Always accessed under the owner's
/// lock so that registration and completion cannot interleave.
#[derive(Debug, Default)]
pub(crate) struct Waiters(SmallVec<[Arc<Signal>; 2]>);

impl Waiters {
    pub(crate) fn register(&mut self, signal: &Arc<Signal>) {
        if !self.0.iter().any(|s| Arc::ptr_eq(s, signal)) {
            self.0.push(Arc::clone(signal));
        }
    }

    pub(crate) fn deregister(&mut self, signal: &Arc<Signal>) {
        self.0.retain(|s| !Arc::ptr_eq(s, signal));
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    /// Drains the waiters. Call `notify` on the result after releasing the
    /// owner's lock.
    pub(crate) fn take(&mut self) -> Notify {
        Notify(std::mem::take(&mut self.0))
    }
}

#[must_use]
pub(crate) struct Notify(SmallVec<[Arc<Signal>; 2]>);

impl Notify {
    pub(crate) fn notify(self) {
        for signal in self.0 {
            signal.notify(Wake::COMPLETION);
        }
    }
}
