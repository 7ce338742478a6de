use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a task.
///
/// ```text
/// CREATED -> QUEUED -> RUNNING -> COMPLETED | CANCELLED | ERROR
///    |          |
///    +----------+-------------> CANCELLED
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    /// Allocated, not yet eligible. Queue tasks wait here for their predecessor.
    Created = 0,
    Queued = 1,
    Running = 2,
    Completed = 3,
    Cancelled = 4,
    Error = 5,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Cancelled | Status::Error)
    }

    fn from_u8(val: u8) -> Status {
        match val {
            0 => Status::Created,
            1 => Status::Queued,
            2 => Status::Running,
            3 => Status::Completed,
            4 => Status::Cancelled,
            5 => Status::Error,
            _ => unreachable!("invalid task status {val}"),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Created => "CREATED",
            Status::Queued => "QUEUED",
            Status::Running => "RUNNING",
            Status::Completed => "COMPLETED",
            Status::Cancelled => "CANCELLED",
            Status::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Atomic task status. Every change goes through [`State::transition`], a
/// compare-exchange, so concurrent claimers and cancellers agree on a single
/// winner.
#[derive(Debug)]
pub(crate) struct State(AtomicU8);

impl State {
    pub(crate) fn new() -> Self {
        State(AtomicU8::new(Status::Created as u8))
    }

    pub(crate) fn load(&self) -> Status {
        Status::from_u8(self.0.load(Ordering::Acquire))
    }

    #[must_use]
    pub(crate) fn transition(&self, from: Status, to: Status) -> bool {
        debug_assert!(
            is_allowed(from, to),
            "illegal task transition {from} -> {to}"
        );
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

fn is_allowed(from: Status, to: Status) -> bool {
    use Status::*;
    matches!(
        (from, to),
        (Created, Queued)
            | (Created, Cancelled)
            | (Queued, Running)
            | (Queued, Cancelled)
            | (Running, Completed)
            | (Running, Cancelled)
            | (Running, Error)
    )
}
