use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::runtime::Handle;
use crate::runtime::wait::block_on;
use crate::task::id::TaskId;
use crate::task::inner::TaskInner;
use crate::task::state::Status;
use crate::timeout::Timeout;
use std::fmt;
use std::sync::Arc;

/// Handle to a started task.
///
/// Cloning is cheap and every clone observes the same task. The task itself is
/// kept alive by the runtime until it is terminal, so dropping every handle
/// does not cancel it.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
    handle: Handle,
}

impl Task {
    pub(crate) fn new(inner: Arc<TaskInner>, handle: Handle) -> Self {
        Self { inner, handle }
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn correlation_id(&self) -> Option<u64> {
        self.inner.correlation
    }

    pub fn status(&self) -> Status {
        self.inner.status()
    }

    pub fn descriptor(&self) -> Descriptor {
        self.inner.descriptor
    }

    /// Blocks until the task is terminal or the timeout expires.
    ///
    /// Returns `Ok(())` for COMPLETED, `Cancelled` for CANCELLED and
    /// `TaskExecution` for ERROR. An expired wait returns `Timeout` and leaves
    /// the task untouched, so it can be waited on again. Waiting on a terminal
    /// task returns the same outcome every time.
    ///
    /// On a worker thread the wait keeps running that worker's ready tasks.
    pub fn wait(&self, timeout: impl Into<Timeout>) -> Result<()> {
        block_on(&self.handle, &*self.inner, timeout.into()).unwrap_or(Err(Error::Timeout))
    }

    /// Withdraws the task if it has not started running yet. Returns `true` if
    /// it was cancelled this way.
    ///
    /// A running task only gets its cancellation flag raised, see
    /// [`TaskContext::is_cancel_requested`](crate::TaskContext::is_cancel_requested).
    pub fn cancel(&self) -> bool {
        self.handle.cancel(&self.inner)
    }

    /// Takes the result buffer of a terminal action task. Returns `None` before
    /// the task is terminal, for closure tasks, if the body panicked, or if the
    /// result was already taken.
    pub fn take_result(&self) -> Option<Vec<u8>> {
        if !self.inner.is_finished() {
            return None;
        }
        self.inner.result.lock().take()
    }

    /// Waits without timeout and returns the result buffer.
    pub fn join(self) -> Result<Vec<u8>> {
        self.wait(Timeout::Infinite)?;
        Ok(self.take_result().unwrap_or_default())
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Task {}
