use crate::action::{Action, ActionBuilder, ActionInner};
use crate::descriptor::Descriptor;
use crate::error::{Error, IntoOutcome, Result};
use crate::group::{Group, GroupShared};
use crate::job::{DomainId, Job, JobId, NodeId};
use crate::queue::{Queue, QueueShared};
use crate::runtime::RuntimeConfig;
use crate::runtime::registry::{ActionRegistry, OwnedTasks, Slots};
use crate::runtime::worker::Worker;
use crate::task::harness;
use crate::task::inner::Closure;
use crate::task::{Body, StartOptions, Status, Task, TaskContext, TaskInner};
use crate::utils::{ScopeGuard, Signal, Wake};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

pub(crate) struct Scheduler {
    pub(crate) cfg: RuntimeConfig,

    pub(crate) workers: Box<[Worker]>,

    registry: ActionRegistry,

    tasks: OwnedTasks,

    groups: Arc<Slots>,

    queues: Arc<Slots>,

    shutdown: AtomicBool,
}

impl Scheduler {
    pub(crate) fn new(cfg: RuntimeConfig) -> Self {
        let workers = (0..cfg.worker_threads)
            .map(|index| Worker::new(index, cfg.max_priorities))
            .collect();

        Self {
            registry: ActionRegistry::new(cfg.job_binding, cfg.max_actions),
            tasks: OwnedTasks::new(cfg.max_tasks),
            groups: Slots::new("group", cfg.max_groups),
            queues: Slots::new("queue", cfg.max_queues),
            shutdown: AtomicBool::new(false),
            workers,
            cfg,
        }
    }

    pub(crate) fn into_handle(self) -> Handle {
        Handle(Arc::new(self))
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("domain", &self.cfg.domain)
            .field("node", &self.cfg.node)
            .field(
                "ready",
                &self.workers.iter().map(Worker::backlog).collect::<Vec<_>>(),
            )
            .field("actions", &self.registry.len())
            .field("live_tasks", &self.tasks.len())
            .field("shutdown", &self.shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

/// What a new task runs.
pub(crate) enum Target<'a> {
    Job(&'a Job),
    Closure(Closure),
}

impl Target<'_> {
    pub(crate) fn closure<F, R>(f: F) -> Self
    where
        F: FnOnce(&TaskContext<'_>) -> R + Send + 'static,
        R: IntoOutcome,
    {
        Target::Closure(Box::new(move |ctx: &TaskContext<'_>| f(ctx).into_outcome()))
    }
}

/// Everything needed to start one task.
pub(crate) struct Launch<'a> {
    pub(crate) target: Target<'a>,
    pub(crate) args: &'a [u8],
    pub(crate) result_size: usize,
    pub(crate) opts: StartOptions,
    pub(crate) group: Option<&'a Arc<GroupShared>>,
    pub(crate) queue: Option<&'a Arc<QueueShared>>,
}

/// Cloneable handle to a runtime.
///
/// Every operation fails with `NotInitialized` once the runtime is shut down.
#[derive(Clone)]
pub struct Handle(Arc<Scheduler>);

impl Handle {
    /// Registers an action under its job id.
    pub fn register(&self, builder: ActionBuilder) -> Result<Action> {
        self.ensure_running()?;
        self.validate(builder.default_descriptor())?;
        self.0.registry.register(builder).map(Action::new)
    }

    /// Action a start on `job` would run.
    pub fn resolve(&self, job: &Job) -> Result<Action> {
        self.ensure_running()?;
        self.check_domain(job)?;
        self.0.registry.resolve(job.id()).map(Action::new)
    }

    /// Removes the action from the registry. Fails with `ActionBusy` while
    /// tasks started against it are not terminal.
    pub fn unregister(&self, action: &Action) -> Result<()> {
        self.ensure_running()?;
        self.0.registry.unregister(&action.inner)
    }

    /// Job key for `id` in this runtime's domain.
    pub fn job(&self, id: impl Into<JobId>) -> Job {
        Job::new(id, self.0.cfg.domain)
    }

    /// Starts a task for `job` with a copy of `args` and a result buffer of
    /// `result_size` bytes. Never blocks.
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
        self.launch(Launch {
            target: Target::Job(job),
            args,
            result_size,
            opts,
            group: None,
            queue: None,
        })
    }

    /// Runs a closure as a task, without registering an action.
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
        self.launch(Launch {
            target: Target::closure(f),
            args: &[],
            result_size: 0,
            opts,
            group: None,
            queue: None,
        })
    }

    pub fn group(&self) -> Result<Group> {
        self.ensure_running()?;
        let slot = self.0.groups.try_acquire()?;
        Ok(Group::new(self.clone(), slot))
    }

    /// Creates a queue for `job`. Its tasks use `descriptor` and run one after
    /// the other.
    pub fn queue(&self, job: &Job, descriptor: Descriptor) -> Result<Queue> {
        self.ensure_running()?;
        self.check_domain(job)?;
        self.validate(&descriptor)?;
        let slot = self.0.queues.try_acquire()?;
        Ok(Queue::new(self.clone(), *job, descriptor, slot))
    }

    pub fn num_workers(&self) -> usize {
        self.0.workers.len()
    }

    /// Tasks started and not terminal yet.
    pub fn live_tasks(&self) -> usize {
        self.0.tasks.len()
    }

    pub fn num_actions(&self) -> usize {
        self.0.registry.len()
    }

    pub fn domain(&self) -> DomainId {
        self.0.cfg.domain
    }

    pub fn node(&self) -> NodeId {
        self.0.cfg.node
    }

    pub fn is_shutdown(&self) -> bool {
        self.0.shutdown.load(Ordering::Acquire)
    }
}

// --- Crate-internal scheduling ---
impl Handle {
    pub(crate) fn ptr_eq(&self, other: &Handle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn cfg(&self) -> &RuntimeConfig {
        &self.0.cfg
    }

    pub(crate) fn tasks(&self) -> &OwnedTasks {
        &self.0.tasks
    }

    pub(crate) fn worker(&self, index: usize) -> &Worker {
        &self.0.workers[index]
    }

    pub(crate) fn worker_signal(&self, index: usize) -> Arc<Signal> {
        Arc::clone(&self.worker(index).signal)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shutdown() {
            return Err(Error::NotInitialized);
        }
        Ok(())
    }

    fn check_domain(&self, job: &Job) -> Result<()> {
        if job.domain() != self.0.cfg.domain {
            return Err(Error::UnknownJob(job.id()));
        }
        Ok(())
    }

    fn validate(&self, descriptor: &Descriptor) -> Result<()> {
        let max = self.0.cfg.max_priorities;
        let priority = descriptor.priority.get();
        if priority >= max {
            return Err(Error::InvalidPriority { priority, max });
        }

        let workers = self.num_workers();
        if descriptor.affinity.clamp(workers).is_empty() {
            return Err(Error::InvalidAffinity { workers });
        }

        Ok(())
    }

    /// Validates and creates a task, then makes it eligible. Nothing is
    /// allocated when an error is returned.
    pub(crate) fn launch(&self, launch: Launch<'_>) -> Result<Task> {
        self.ensure_running()?;

        let Launch {
            target,
            args,
            result_size,
            opts,
            group,
            queue,
        } = launch;

        let (body, descriptor) = match target {
            Target::Job(job) => {
                self.check_domain(job)?;
                let action = self.0.registry.acquire(job.id())?;
                let descriptor = opts.descriptor.unwrap_or(action.descriptor);

                let checked = action
                    .check_buffers(args.len(), result_size)
                    .and_then(|()| self.validate(&descriptor));
                if let Err(e) = checked {
                    action.release();
                    return Err(e);
                }

                (Body::Action(action), descriptor)
            }
            Target::Closure(f) => {
                let descriptor = opts.descriptor.unwrap_or_default();
                self.validate(&descriptor)?;
                (Body::Closure(Mutex::new(Some(f))), descriptor)
            }
        };

        if let Err(e) = self.0.tasks.reserve() {
            release_action(&body);
            return Err(e);
        }

        let unreserve = ScopeGuard::new(|| self.0.tasks.unreserve());
        if let Some(group) = group
            && let Err(e) = group.attach()
        {
            drop(unreserve);
            release_action(&body);
            return Err(e);
        }
        unreserve.disarm();

        let task = Arc::new(
            TaskInner::new(body, args, result_size, descriptor, opts.correlation)
                .with_group(group.cloned())
                .with_queue(queue.cloned()),
        );

        trace!(task = %task.id, ?descriptor, correlation = ?task.correlation, "task created");

        if !self.0.tasks.insert(&task) {
            // Lost a race with shutdown.
            self.cancel(&task);
            return Ok(Task::new(task, self.clone()));
        }

        let eligible = match queue {
            Some(queue) => queue.submit(&task),
            None => task.state.transition(Status::Created, Status::Queued),
        };

        if eligible {
            self.push_ready(&task);
        }

        Ok(Task::new(task, self.clone()))
    }

    /// Inserts a QUEUED task into the ready queue of every eligible worker.
    pub(crate) fn push_ready(&self, task: &Arc<TaskInner>) {
        for index in task.descriptor.affinity.clamp(self.num_workers()).iter() {
            self.worker(index).push(Arc::clone(task));
        }
    }

    /// Withdraws a task that is not running yet, or flags a running one.
    pub(crate) fn cancel(&self, task: &Arc<TaskInner>) -> bool {
        if task.state.transition(Status::Created, Status::Cancelled) {
            self.finish_cancelled(task, Status::Created);
            return true;
        }

        if task.state.transition(Status::Queued, Status::Cancelled) {
            for index in task.descriptor.affinity.clamp(self.num_workers()).iter() {
                self.worker(index).remove(task.id);
            }
            self.finish_cancelled(task, Status::Queued);
            return true;
        }

        if task.status() == Status::Running {
            trace!(task = %task.id, "cancellation requested on running task");
            task.request_cancel();
        }

        false
    }

    fn finish_cancelled(&self, task: &Arc<TaskInner>, from: Status) {
        let _ = task.outcome.set(Err(Error::Cancelled));
        harness::finish(task, self, from);
    }

    /// Claims and runs one task from the worker's ready queue. Returns `false`
    /// if there was nothing to run.
    pub(crate) fn run_next(&self, index: usize) -> bool {
        if self.is_shutdown() {
            return false;
        }

        match self.worker(index).claim() {
            Some(task) => {
                harness::run(task, self, index);
                true
            }
            None => false,
        }
    }

    /// Refuses new work, cancels every task not running yet and wakes the
    /// workers so they exit. Returns `false` if already shut down.
    pub(crate) fn shutdown(&self) -> bool {
        if self.0.shutdown.swap(true, Ordering::AcqRel) {
            return false;
        }

        let alive = self.0.tasks.close().unwrap_or_default();
        debug!(live_tasks = alive.len(), "shutting down runtime");

        for task in &alive {
            self.cancel(task);
        }

        for worker in self.0.workers.iter() {
            worker.signal.notify(Wake::SHUTDOWN);
        }

        true
    }
}

fn release_action(body: &Body) {
    if let Body::Action(action) = body {
        ActionInner::release(action);
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
