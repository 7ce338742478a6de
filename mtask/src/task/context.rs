use crate::descriptor::Priority;
use crate::runtime::Handle;
use crate::task::id::TaskId;
use crate::task::inner::TaskInner;
use std::any::Any;
use std::fmt;

/// View of the running task handed to every body.
pub struct TaskContext<'a> {
    task: &'a TaskInner,
    handle: &'a Handle,
    worker_index: usize,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(task: &'a TaskInner, handle: &'a Handle, worker_index: usize) -> Self {
        Self {
            task,
            handle,
            worker_index,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task.id
    }

    pub fn correlation_id(&self) -> Option<u64> {
        self.task.correlation
    }

    /// Index of the worker running this task.
    pub fn worker_index(&self) -> usize {
        self.worker_index
    }

    pub fn priority(&self) -> Priority {
        self.task.descriptor.priority
    }

    /// Set when someone cancelled the task after it started running. Bodies
    /// honour it by returning [`Fault::Cancelled`](crate::Fault::Cancelled).
    pub fn is_cancel_requested(&self) -> bool {
        self.task.is_cancel_requested()
    }

    /// Node-local data attached to the action, if it has the requested type.
    /// Always `None` for closure tasks.
    pub fn node_local<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.task
            .action()
            .and_then(|action| action.node_local.as_deref())
            .and_then(|data| data.downcast_ref::<T>())
    }

    /// Runtime handle, used to start and wait on sub-tasks.
    pub fn handle(&self) -> &Handle {
        self.handle
    }
}

impl fmt::Debug for TaskContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("task_id", &self.task.id)
            .field("worker_index", &self.worker_index)
            .finish_non_exhaustive()
    }
}
