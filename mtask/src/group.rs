//! Correlation sets of tasks with `wait_any` / `wait_all`.
use crate::descriptor::Descriptor;
use crate::error::{Error, IntoOutcome, Result};
use crate::job::Job;
use crate::runtime::Handle;
use crate::runtime::registry::Slot;
use crate::runtime::scheduler::{Launch, Target};
use crate::runtime::wait::{Waitable, block_on};
use crate::task::{StartOptions, Status, Task, TaskContext, TaskId, TaskInner};
use crate::timeout::Timeout;
use crate::utils::{Signal, Waiters};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

#[derive(Default)]
struct GroupState {
    /// Members not terminal yet.
    pending: usize,

    /// Terminal members not consumed by `wait_any`, in completion order.
    ready: VecDeque<Arc<TaskInner>>,

    first_failure: Option<Error>,

    /// Set by a terminal `wait_all` or by `release`.
    closed: bool,

    waiters: Waiters,
}

#[derive(Default)]
pub(crate) struct GroupShared {
    state: Mutex<GroupState>,
}

impl GroupShared {
    /// Accounts for a member about to be started.
    pub(crate) fn attach(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::GroupClosed);
        }
        state.pending += 1;
        Ok(())
    }

    pub(crate) fn on_complete(&self, task: &Arc<TaskInner>) {
        let notify = {
            let mut state = self.state.lock();
            debug_assert!(state.pending > 0, "completion for a task not in the group");
            state.pending -= 1;

            if state.first_failure.is_none()
                && let Err(e) = task.outcome()
            {
                state.first_failure = Some(e);
            }

            state.ready.push_back(Arc::clone(task));
            state.waiters.take()
        };
        notify.notify();
    }

    fn pending(&self) -> usize {
        self.state.lock().pending
    }
}

struct WaitAny<'a>(&'a GroupShared);

impl Waitable for WaitAny<'_> {
    type Output = Result<Completion>;

    fn poll_or_register(&self, signal: &Arc<Signal>) -> Option<Self::Output> {
        let mut state = self.0.state.lock();
        if let Some(task) = state.ready.pop_front() {
            return Some(Ok(Completion { task }));
        }
        if state.pending == 0 {
            return Some(Err(Error::GroupCompleted));
        }
        state.waiters.register(signal);
        None
    }

    fn deregister(&self, signal: &Arc<Signal>) {
        self.0.state.lock().waiters.deregister(signal);
    }
}

struct WaitAll<'a>(&'a GroupShared);

impl Waitable for WaitAll<'_> {
    type Output = Result<()>;

    fn poll_or_register(&self, signal: &Arc<Signal>) -> Option<Self::Output> {
        let mut state = self.0.state.lock();
        if state.pending == 0 {
            state.closed = true;
            return Some(state.first_failure.clone().map_or(Ok(()), Err));
        }
        state.waiters.register(signal);
        None
    }

    fn deregister(&self, signal: &Arc<Signal>) {
        self.0.state.lock().waiters.deregister(signal);
    }
}

/// A set of tasks started together.
///
/// Tasks join a group only when they are started through it and are never
/// removed. Starting more tasks while another thread is inside
/// [`wait_all`](Group::wait_all) is not supported.
///
/// ```no_run
/// # fn main() -> anyhow::Result<()> {
/// use mtask::{Descriptor, Timeout};
///
/// let rt = mtask::Builder::new().worker_threads(2).try_build()?;
/// let group = rt.group()?;
/// for _ in 0..4 {
///     group.spawn(|_ctx| {}, Descriptor::new())?;
/// }
/// group.wait_all(Timeout::Infinite)?;
/// # Ok(())
/// # }
/// ```
pub struct Group {
    shared: Arc<GroupShared>,
    handle: Handle,
    slot: Option<Slot>,
}

impl Group {
    pub(crate) fn new(handle: Handle, slot: Slot) -> Self {
        Self {
            shared: Arc::new(GroupShared::default()),
            handle,
            slot: Some(slot),
        }
    }

    /// Starts a task for `job` as a member of this group.
    pub fn start(&self, job: &Job, args: &[u8], result_size: usize) -> Result<Task> {
        self.start_with(job, args, result_size, StartOptions::new())
    }

    pub fn start_with(
        &self,
        job: &Job,
        args: &[u8],
        result_size: usize,
        opts: StartOptions,
    ) -> Result<Task> {
        self.handle.launch(Launch {
            target: Target::Job(job),
            args,
            result_size,
            opts,
            group: Some(&self.shared),
            queue: None,
        })
    }

    /// Runs a closure as a member of this group.
    pub fn spawn<F, R>(&self, f: F, descriptor: Descriptor) -> Result<Task>
    where
        F: FnOnce(&TaskContext<'_>) -> R + Send + 'static,
        R: IntoOutcome,
    {
        self.spawn_with(f, StartOptions::new().descriptor(descriptor))
    }

    pub fn spawn_with<F, R>(&self, f: F, opts: StartOptions) -> Result<Task>
    where
        F: FnOnce(&TaskContext<'_>) -> R + Send + 'static,
        R: IntoOutcome,
    {
        self.handle.launch(Launch {
            target: Target::closure(f),
            args: &[],
            result_size: 0,
            opts,
            group: Some(&self.shared),
            queue: None,
        })
    }

    /// Consumes exactly one completion.
    ///
    /// Concurrent callers each receive a different completion. Returns
    /// `GroupCompleted` once every member has been consumed, and `Timeout` if
    /// nothing completed in time.
    pub fn wait_any(&self, timeout: impl Into<Timeout>) -> Result<Completion> {
        block_on(&self.handle, &WaitAny(&self.shared), timeout.into())
            .unwrap_or(Err(Error::Timeout))
    }

    /// Blocks until every member is terminal.
    ///
    /// Returns the first failure observed, if any. A successful call closes the
    /// group, after which starting members fails with `GroupClosed`. `Timeout`
    /// leaves the group untouched and the call can be repeated.
    pub fn wait_all(&self, timeout: impl Into<Timeout>) -> Result<()> {
        block_on(&self.handle, &WaitAll(&self.shared), timeout.into())
            .unwrap_or(Err(Error::Timeout))
    }

    /// Members not terminal yet.
    pub fn pending(&self) -> usize {
        self.shared.pending()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Closes the group and gives its slot back to the runtime. Fails with
    /// `GroupBusy` while members are pending.
    pub fn release(&mut self) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if state.pending > 0 {
                return Err(Error::GroupBusy {
                    pending: state.pending,
                });
            }
            state.closed = true;
        }
        self.slot.take();
        Ok(())
    }

    pub(crate) fn shared(&self) -> &Arc<GroupShared> {
        &self.shared
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Group")
            .field("pending", &state.pending)
            .field("ready", &state.ready.len())
            .field("closed", &state.closed)
            .finish()
    }
}

/// A terminal group member handed out by [`Group::wait_any`].
pub struct Completion {
    task: Arc<TaskInner>,
}

impl Completion {
    pub fn task_id(&self) -> TaskId {
        self.task.id
    }

    pub fn correlation_id(&self) -> Option<u64> {
        self.task.correlation
    }

    pub fn status(&self) -> Status {
        self.task.status()
    }

    /// `Ok(())` for COMPLETED, the task's error otherwise.
    pub fn outcome(&self) -> Result<()> {
        self.task.outcome()
    }

    /// Takes the task's result buffer, see [`Task::take_result`].
    pub fn take_result(&self) -> Option<Vec<u8>> {
        self.task.result.lock().take()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("task_id", &self.task.id)
            .field("correlation_id", &self.task.correlation)
            .field("status", &self.task.status())
            .finish()
    }
}
