use crate::action::ActionInner;
use crate::descriptor::Descriptor;
use crate::error::{Error, Fault, Result};
use crate::group::GroupShared;
use crate::queue::QueueShared;
use crate::runtime::wait::Waitable;
use crate::task::context::TaskContext;
use crate::task::id::TaskId;
use crate::task::state::{State, Status};
use crate::utils::{Signal, Waiters};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

pub(crate) type Closure =
    Box<dyn FnOnce(&TaskContext<'_>) -> std::result::Result<(), Fault> + Send + 'static>;

/// What a task runs.
pub(crate) enum Body {
    Action(Arc<ActionInner>),

    /// Taken out when the task runs or is cancelled.
    Closure(Mutex<Option<Closure>>),
}

#[derive(Default)]
pub(crate) struct WaitState {
    pub(crate) finished: bool,
    pub(crate) waiters: Waiters,
}

/// State shared between the scheduler, the worker running the task and every
/// [`Task`](crate::Task) handle.
pub(crate) struct TaskInner {
    pub(crate) id: TaskId,
    pub(crate) correlation: Option<u64>,
    pub(crate) descriptor: Descriptor,
    pub(crate) body: Body,
    pub(crate) args: Box<[u8]>,
    pub(crate) result_size: usize,
    pub(crate) result: Mutex<Option<Vec<u8>>>,
    pub(crate) state: State,
    pub(crate) cancel_requested: AtomicBool,
    pub(crate) outcome: OnceLock<Result<()>>,
    pub(crate) waiters: Mutex<WaitState>,

    /// Taken out by `harness::finish`. A group keeps its completed members
    /// alive, so the link must not outlive the task's run.
    pub(crate) group: Mutex<Option<Arc<GroupShared>>>,
    pub(crate) queue: Mutex<Option<Arc<QueueShared>>>,
}

impl TaskInner {
    pub(crate) fn new(
        body: Body,
        args: &[u8],
        result_size: usize,
        descriptor: Descriptor,
        correlation: Option<u64>,
    ) -> Self {
        Self {
            id: TaskId::next(),
            correlation,
            descriptor,
            body,
            args: args.into(),
            result_size,
            result: Mutex::new(None),
            state: State::new(),
            cancel_requested: AtomicBool::new(false),
            outcome: OnceLock::new(),
            waiters: Mutex::new(WaitState::default()),
            group: Mutex::new(None),
            queue: Mutex::new(None),
        }
    }

    pub(crate) fn with_group(mut self, group: Option<Arc<GroupShared>>) -> Self {
        self.group = Mutex::new(group);
        self
    }

    pub(crate) fn with_queue(mut self, queue: Option<Arc<QueueShared>>) -> Self {
        self.queue = Mutex::new(queue);
        self
    }

    pub(crate) fn status(&self) -> Status {
        self.state.load()
    }

    pub(crate) fn action(&self) -> Option<&Arc<ActionInner>> {
        match &self.body {
            Body::Action(action) => Some(action),
            Body::Closure(_) => None,
        }
    }

    pub(crate) fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::Release);
    }

    pub(crate) fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    /// Outcome of a terminal task. Only valid once `finished` is observed.
    pub(crate) fn outcome(&self) -> Result<()> {
        self.outcome.get().cloned().unwrap_or(Err(Error::Cancelled))
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.waiters.lock().finished
    }
}

impl Waitable for TaskInner {
    type Output = Result<()>;

    fn poll_or_register(&self, signal: &Arc<Signal>) -> Option<Self::Output> {
        let mut waiters = self.waiters.lock();
        if waiters.finished {
            return Some(self.outcome());
        }
        waiters.waiters.register(signal);
        None
    }

    fn deregister(&self, signal: &Arc<Signal>) {
        self.waiters.lock().waiters.deregister(signal);
    }
}

impl fmt::Debug for TaskInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("correlation", &self.correlation)
            .field("status", &self.status())
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}
