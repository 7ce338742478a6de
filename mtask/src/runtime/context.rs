use crate::runtime::scheduler::Handle;
use crate::task::TaskId;
use crate::utils::Signal;
use std::cell::{Cell, RefCell};
use std::sync::Arc;

thread_local! {
    static WORKER: RefCell<Option<WorkerContext>> = const { RefCell::new(None) };

    static CURRENT_TASK_ID: Cell<Option<TaskId>> = const { Cell::new(None) };

    // Parking spot for threads that are not workers of the runtime they wait on.
    static THREAD_SIGNAL: Arc<Signal> = Arc::new(Signal::new());
}

/// Installed once per worker thread, before its event loop starts.
struct WorkerContext {
    handle: Handle,
    index: usize,
}

#[must_use]
pub(crate) struct WorkerGuard(());

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        let _ = WORKER.try_with(|w| w.borrow_mut().take());
    }
}

pub(crate) fn enter_worker(handle: Handle, index: usize) -> WorkerGuard {
    WORKER.with(|w| {
        let prev = w.borrow_mut().replace(WorkerContext { handle, index });
        debug_assert!(prev.is_none(), "worker context already set");
    });
    WorkerGuard(())
}

/// Index of the current thread within `handle`'s pool, or `None` if this thread
/// is not one of its workers.
pub(crate) fn worker_index_for(handle: &Handle) -> Option<usize> {
    WORKER
        .try_with(|w| {
            w.borrow()
                .as_ref()
                .filter(|ctx| ctx.handle.ptr_eq(handle))
                .map(|ctx| ctx.index)
        })
        .ok()
        .flatten()
}

/// Index of the worker running on the current thread, if any.
pub fn current_worker() -> Option<usize> {
    WORKER
        .try_with(|w| w.borrow().as_ref().map(|ctx| ctx.index))
        .ok()
        .flatten()
}

pub(crate) fn current_task_id() -> Option<TaskId> {
    CURRENT_TASK_ID.try_with(Cell::get).ok().flatten()
}

/// Returns the previous value.
pub(crate) fn set_current_task_id(id: Option<TaskId>) -> Option<TaskId> {
    CURRENT_TASK_ID.try_with(|c| c.replace(id)).ok().flatten()
}

pub(crate) fn thread_signal() -> Arc<Signal> {
    THREAD_SIGNAL.with(Arc::clone)
}
