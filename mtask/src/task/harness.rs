use crate::error::{Error, Fault, PANIC_ERROR_CODE, Result};
use crate::runtime::Handle;
use crate::task::context::TaskContext;
use crate::task::id::TaskIdGuard;
use crate::task::inner::{Body, TaskInner};
use crate::task::state::Status;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{trace, warn};

/// Runs a task the current worker just claimed (QUEUED -> RUNNING).
pub(crate) fn run(task: Arc<TaskInner>, handle: &Handle, worker_index: usize) {
    debug_assert_eq!(task.status(), Status::Running);
    trace!(task = %task.id, worker = worker_index, "running task");

    let outcome = {
        let _id_guard = TaskIdGuard::enter(task.id);
        let ctx = TaskContext::new(&task, handle, worker_index);
        panic::catch_unwind(AssertUnwindSafe(|| execute(&task, &ctx)))
    };

    let (status, outcome): (Status, Result<()>) = match outcome {
        Ok(Ok(())) => (Status::Completed, Ok(())),
        Ok(Err(Fault::Cancelled)) => (Status::Cancelled, Err(Error::Cancelled)),
        Ok(Err(Fault::Error(code))) => (Status::Error, Err(Error::TaskExecution { code })),
        Err(payload) => {
            warn!(
                task = %task.id,
                panic = panic_payload_as_str(&payload),
                "task body panicked"
            );
            (
                Status::Error,
                Err(Error::TaskExecution {
                    code: PANIC_ERROR_CODE,
                }),
            )
        }
    };

    let _ = task.outcome.set(outcome);

    // Only the claiming worker moves a task out of RUNNING.
    let transitioned = task.state.transition(Status::Running, status);
    debug_assert!(transitioned, "running task changed status under its worker");

    finish(&task, handle, Status::Running);
}

fn execute(task: &TaskInner, ctx: &TaskContext<'_>) -> std::result::Result<(), Fault> {
    match &task.body {
        Body::Action(action) => {
            let mut result = vec![0u8; task.result_size];
            let outcome = (action.entry)(ctx, &task.args, &mut result);
            *task.result.lock() = Some(result);
            outcome
        }
        Body::Closure(cell) => {
            let closure = cell.lock().take();
            match closure {
                Some(f) => f(ctx),
                None => Ok(()),
            }
        }
    }
}

/// Publishes a terminal task: frees its slots, wakes waiters, then hands the
/// completion to its group and queue. `from` is the status the task left.
pub(crate) fn finish(task: &Arc<TaskInner>, handle: &Handle, from: Status) {
    let status = task.status();
    debug_assert!(status.is_terminal());
    trace!(task = %task.id, %from, %status, "task finished");

    if let Body::Closure(cell) = &task.body {
        // A closure may hold a `Handle`, drop it before the task lingers in a
        // group or user handle.
        let closure = cell.lock().take();
        drop(closure);
    }

    if let Some(action) = task.action() {
        action.release();
    }

    handle.tasks().remove(&task.id);

    let notify = {
        let mut waiters = task.waiters.lock();
        waiters.finished = true;
        waiters.waiters.take()
    };
    notify.notify();

    let group = task.group.lock().take();
    if let Some(group) = group {
        group.on_complete(task);
    }

    let queue = task.queue.lock().take();
    if let Some(queue) = queue {
        queue.on_complete(task, from, handle);
    }
}

fn panic_payload_as_str(payload: &Box<dyn Any + Send>) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "Box<dyn Any>"
    }
}
