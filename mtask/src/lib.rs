//! Task-parallel runtime for multicore machines.
//!
//! Work is registered as [`Action`]s under a [`JobId`], started as [`Task`]s on
//! a fixed pool of worker threads chosen by [`Affinity`] and [`Priority`], and
//! synchronized through [`Task::wait`], [`Group::wait_any`] and
//! [`Group::wait_all`], all bounded by a [`Timeout`].
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! use mtask::{ActionBuilder, Builder, Timeout};
//!
//! let rt = Builder::new().worker_threads(4).try_build()?;
//!
//! rt.register(
//!     ActionBuilder::new(1, |_ctx, args, result| {
//!         result.copy_from_slice(&[args[0] * 2]);
//!     })
//!     .arg_size(1)
//!     .result_size(1),
//! )?;
//!
//! let task = rt.start(&rt.job(1), &[21], 1)?;
//! task.wait(Timeout::Infinite)?;
//! assert_eq!(task.take_result(), Some(vec![42]));
//! # Ok(())
//! # }
//! ```
//!
//! A task body may start sub-tasks and wait on them: a worker that waits keeps
//! running tasks from its own ready queue until the wait is satisfied.

mod action;
pub use action::{Action, ActionBuilder};

mod descriptor;
pub use descriptor::{Affinity, Descriptor, MAX_WORKERS, Priority};

mod error;
pub use error::{Error, Fault, IntoOutcome, PANIC_ERROR_CODE, Result};

mod group;
pub use group::{Completion, Group};

mod invoke;
pub use invoke::{ExecutionPolicy, TaskGuard, invoke};

mod job;
pub use job::{DomainId, Job, JobId, NodeId};

mod queue;
pub use queue::Queue;

pub mod runtime;
pub use runtime::{Builder, Handle, JobBinding, Runtime, current_worker};

pub mod task;
pub use task::{StartOptions, Status, Task, TaskContext, TaskId};

mod timeout;
pub use timeout::Timeout;

mod utils;

#[cfg(test)]
mod test_utils;
