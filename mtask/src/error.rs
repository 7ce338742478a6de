use crate::job::JobId;
use crate::task::Status;

/// Error code reported when an action body panics.
pub const PANIC_ERROR_CODE: i32 = -1;

/// A centralized error type for every runtime operation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The argument buffer does not match the size declared by the action.
    #[error("argument size mismatch: action expects {expected} bytes, got {actual}")]
    ArgSize { expected: usize, actual: usize },

    /// The result buffer does not match the size declared by the action.
    #[error("result size mismatch: action expects {expected} bytes, got {actual}")]
    ResultSize { expected: usize, actual: usize },

    #[error("no action registered for job {0}")]
    UnknownJob(JobId),

    #[error("job {0} is already bound to an action")]
    DuplicateJob(JobId),

    /// The action still has tasks that did not reach a terminal status.
    #[error("action for job {job} still referenced by {live} live task(s)")]
    ActionBusy { job: JobId, live: usize },

    #[error("action for job {0} is disabled")]
    ActionDisabled(JobId),

    /// The wait expired. The waited-on entity is left untouched.
    #[error("wait timed out")]
    Timeout,

    #[error("task was cancelled")]
    Cancelled,

    /// The action body reported a failure (or panicked).
    #[error("task failed with error code {code}")]
    TaskExecution { code: i32 },

    /// The runtime was finalized, or never initialized.
    #[error("runtime is not initialized")]
    NotInitialized,

    /// A configured limit was reached. Nothing was allocated.
    #[error("resource exhausted: no free {0} slot")]
    ResourceExhausted(&'static str),

    #[error("priority {priority} out of range, runtime has {max} priority level(s)")]
    InvalidPriority { priority: u8, max: u8 },

    #[error("affinity does not contain any of the {workers} worker(s)")]
    InvalidAffinity { workers: usize },

    #[error("group still has {pending} pending task(s)")]
    GroupBusy { pending: usize },

    /// The group was closed by a terminal `wait_all`.
    #[error("group is closed")]
    GroupClosed,

    /// Every member of the group has been consumed by `wait_any`.
    #[error("all tasks of the group have been consumed")]
    GroupCompleted,
}

impl Error {
    /// Waits can be repeated after this error, nothing changed state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout | Error::ResourceExhausted(_))
    }

    /// Terminal status that corresponds to this error, when it describes the
    /// outcome of a task.
    pub fn as_status(&self) -> Option<Status> {
        match self {
            Error::Cancelled => Some(Status::Cancelled),
            Error::TaskExecution { .. } => Some(Status::Error),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by an action body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The body honoured a cancellation request.
    Cancelled,

    /// The body failed, the code is handed to the waiter untouched.
    Error(i32),
}

impl From<Fault> for Error {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::Cancelled => Error::Cancelled,
            Fault::Error(code) => Error::TaskExecution { code },
        }
    }
}

/// Return types accepted from an action or closure body.
pub trait IntoOutcome {
    fn into_outcome(self) -> std::result::Result<(), Fault>;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> std::result::Result<(), Fault> {
        Ok(())
    }
}

impl IntoOutcome for std::result::Result<(), Fault> {
    fn into_outcome(self) -> std::result::Result<(), Fault> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(Error: Send, Sync, Clone, std::error::Error);

    #[test]
    fn test_fault_into_error() {
        assert_eq!(Error::from(Fault::Cancelled), Error::Cancelled);
        assert_eq!(
            Error::from(Fault::Error(7)),
            Error::TaskExecution { code: 7 }
        );
        assert_eq!(Error::Cancelled.as_status(), Some(Status::Cancelled));
        assert_eq!(Error::Timeout.as_status(), None);
        assert!(Error::Timeout.is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }
}
