use crate::runtime::context;
use std::sync::atomic::{AtomicU64, Ordering};
use std::{fmt, num::NonZeroU64};

/// An opaque ID that uniquely identifies a task within the process.
///
/// IDs are assigned by the runtime when a task is started and are never
/// reused. Callers who need their own identifiers attach a correlation id
/// through [`StartOptions::correlation`](crate::StartOptions::correlation).
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct TaskId(NonZeroU64);

/// Returns the [`TaskId`] of the task running on the current thread, or `None`
/// when called outside of a task body.
pub fn try_id() -> Option<TaskId> {
    context::current_task_id()
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TaskId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);

        let id = COUNTER.fetch_add(1, Ordering::Relaxed);

        // Even at a billion tasks per second this takes centuries to wrap.
        let Some(id) = NonZeroU64::new(id) else {
            Self::exhausted();
        };

        Self(id)
    }

    #[cold]
    fn exhausted() -> ! {
        panic!("failed to generate unique task ID: bitspace exhausted")
    }

    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }
}

/// Sets the current task id for the duration of a body, restoring the outer
/// one on drop. Bodies nest when a worker inlines tasks inside a wait.
pub(crate) struct TaskIdGuard {
    parent_task_id: Option<TaskId>,
}

impl TaskIdGuard {
    pub(crate) fn enter(id: TaskId) -> Self {
        TaskIdGuard {
            parent_task_id: context::set_current_task_id(Some(id)),
        }
    }
}

impl Drop for TaskIdGuard {
    fn drop(&mut self) {
        context::set_current_task_id(self.parent_task_id);
    }
}
