use crate::descriptor::MAX_WORKERS;
use crate::job::{DomainId, NodeId};
use crate::runtime::context;
use crate::runtime::pool::ThreadPool;
use crate::runtime::scheduler::{Handle, Scheduler};
use anyhow::{Result, anyhow};
use std::convert::TryFrom;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tracing::{debug, error, warn};

/// Default number of priority levels.
const MAX_PRIORITIES: u8 = 4;

/// Default limit of live tasks.
const MAX_TASKS: usize = 4096;

const MAX_ACTIONS: usize = 256;

const MAX_GROUPS: usize = 256;

const MAX_QUEUES: usize = 64;

#[derive(Clone)]
pub(crate) struct ThreadNameFn(pub(crate) Arc<dyn Fn() -> String + Send + Sync + 'static>);

fn default_thread_name_fn() -> ThreadNameFn {
    let worker_count = Arc::new(AtomicUsize::new(0));

    ThreadNameFn(Arc::new(move || {
        let id = worker_count.fetch_add(1, Ordering::Relaxed);
        format!("mtask-{}", id)
    }))
}

impl fmt::Debug for ThreadNameFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadNameFn").field(&"<function>").finish()
    }
}

/// How many actions may be bound to one job id.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobBinding {
    /// One action per job. Registering a second one fails with `DuplicateJob`.
    #[default]
    Exclusive,

    /// Several actions per job. Starts pick them in round-robin order and skip
    /// disabled ones.
    RoundRobin,
}

#[derive(Debug)]
pub struct Builder {
    domain: DomainId,

    node: NodeId,

    /// Defaults to one worker per core, capped at [`MAX_WORKERS`].
    worker_threads: Option<usize>,

    /// Name fn used for threads spawned by the runtime.
    thread_name: ThreadNameFn,

    /// Stack size used for threads spawned by the runtime.
    thread_stack_size: Option<usize>,

    /// Pin worker `i` to core `i % cores`.
    pin_workers: bool,

    max_priorities: u8,

    max_tasks: usize,

    max_actions: usize,

    max_groups: usize,

    max_queues: usize,

    job_binding: JobBinding,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Builder {
        Self {
            domain: DomainId::default(),
            node: NodeId::default(),
            worker_threads: None,
            thread_name: default_thread_name_fn(),
            thread_stack_size: None,
            pin_workers: false,
            max_priorities: MAX_PRIORITIES,
            max_tasks: MAX_TASKS,
            max_actions: MAX_ACTIONS,
            max_groups: MAX_GROUPS,
            max_queues: MAX_QUEUES,
            job_binding: JobBinding::default(),
        }
    }

    /// Domain of the runtime. Jobs of other domains never resolve.
    pub fn domain(mut self, domain: impl Into<DomainId>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn node(mut self, node: impl Into<NodeId>) -> Self {
        self.node = node.into();
        self
    }

    /// The number of worker threads.
    ///
    /// Defaults to 1 worker per CPU core, at most [`MAX_WORKERS`].
    #[track_caller]
    pub fn worker_threads(mut self, val: usize) -> Self {
        assert!(val > 0, "worker_threads must be greater than 0");
        assert!(
            val <= MAX_WORKERS,
            "worker_threads must be at most {MAX_WORKERS}"
        );
        self.worker_threads = Some(val);
        self
    }

    /// Sets name of threads spawned by the `Runtime`'s thread pool.
    ///
    /// The default name is "mtask-{id}", where id is monotonically increasing.
    ///
    /// Thread names are truncated beyond 15 bytes according to pthread
    /// limitations.
    pub fn thread_name(mut self, val: impl Into<String>) -> Self {
        let val = val.into();
        self.thread_name = ThreadNameFn(Arc::new(move || val.clone()));
        self
    }

    /// Sets a function used to generate the name of threads spawned by the
    /// `Runtime`'s thread pool.
    pub fn thread_name_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.thread_name = ThreadNameFn(Arc::new(f));
        self
    }

    /// Sets the stack size (in bytes) for worker threads.
    ///
    /// Task bodies that wait on sub-tasks run inlined tasks on the same stack,
    /// deep recursion needs a larger one.
    #[track_caller]
    pub fn thread_stack_size(mut self, val: usize) -> Self {
        assert!(
            val.is_power_of_two(),
            "thread_stack_size must be a power of two"
        );
        self.thread_stack_size = Some(val);
        self
    }

    /// Pins each worker thread to a CPU core. Only supported on Linux, a
    /// failure to pin is logged and ignored.
    pub fn pin_workers(mut self, val: bool) -> Self {
        self.pin_workers = val;
        self
    }

    /// Number of priority levels. Valid priorities are `0..val`.
    #[track_caller]
    pub fn max_priorities(mut self, val: u8) -> Self {
        assert!(val > 0, "max_priorities must be greater than 0");
        self.max_priorities = val;
        self
    }

    /// Maximum number of live (non-terminal) tasks.
    #[track_caller]
    pub fn max_tasks(mut self, val: usize) -> Self {
        assert!(val > 0, "max_tasks must be greater than 0");
        self.max_tasks = val;
        self
    }

    #[track_caller]
    pub fn max_actions(mut self, val: usize) -> Self {
        assert!(val > 0, "max_actions must be greater than 0");
        self.max_actions = val;
        self
    }

    #[track_caller]
    pub fn max_groups(mut self, val: usize) -> Self {
        assert!(val > 0, "max_groups must be greater than 0");
        self.max_groups = val;
        self
    }

    #[track_caller]
    pub fn max_queues(mut self, val: usize) -> Self {
        assert!(val > 0, "max_queues must be greater than 0");
        self.max_queues = val;
        self
    }

    pub fn job_binding(mut self, binding: JobBinding) -> Self {
        self.job_binding = binding;
        self
    }

    /// Creates the configured `Runtime`.
    ///
    /// Worker threads are running when this returns, the runtime is ready to
    /// accept actions and tasks.
    pub fn try_build(self) -> Result<Runtime> {
        let cfg = RuntimeConfig::try_from(self)?;
        let handle = Scheduler::new(cfg).into_handle();

        let pool = ThreadPool::spawn(&handle)?;

        debug!(
            domain = %handle.domain(),
            workers = handle.num_workers(),
            "runtime started"
        );

        Ok(Runtime { handle, pool })
    }
}

/// Owns the worker threads. Dereferences to its [`Handle`].
///
/// Dropping the runtime shuts it down.
#[derive(Debug)]
pub struct Runtime {
    handle: Handle,
    pool: ThreadPool,
}

impl Runtime {
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Shutdown the runtime.
    ///
    /// Tasks that are not running yet are cancelled, running tasks finish their
    /// body and can observe the cancellation flag. The calling thread blocks
    /// until every worker exits. Operations on a [`Handle`] fail with
    /// `NotInitialized` afterwards.
    ///
    /// Must not be called from a task body.
    pub fn shutdown(self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&self) {
        if !self.handle.shutdown() {
            return;
        }

        if context::worker_index_for(&self.handle).is_some() {
            warn!("runtime dropped from one of its own workers, not joining worker threads");
            return;
        }

        if let Err(e) = self.pool.join_all() {
            error!("error during runtime shutdown: {:?}", e);
        }

        debug!("runtime stopped");
    }
}

impl Deref for Runtime {
    type Target = Handle;

    fn deref(&self) -> &Handle {
        &self.handle
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

// Export runtime builder as a RuntimeConfig object to be consumed by the
// scheduler and the thread pool.
#[derive(Debug, Clone)]
pub(crate) struct RuntimeConfig {
    pub(crate) domain: DomainId,
    pub(crate) node: NodeId,
    pub(crate) worker_threads: usize,
    pub(crate) thread_name: ThreadNameFn,
    pub(crate) thread_stack_size: Option<usize>,
    pub(crate) pin_workers: bool,
    pub(crate) max_priorities: u8,
    pub(crate) max_tasks: usize,
    pub(crate) max_actions: usize,
    pub(crate) max_groups: usize,
    pub(crate) max_queues: usize,
    pub(crate) job_binding: JobBinding,
}

impl TryFrom<Builder> for RuntimeConfig {
    type Error = anyhow::Error;

    fn try_from(builder: Builder) -> Result<Self, Self::Error> {
        let worker_threads = match builder.worker_threads {
            Some(n) => n,
            None => thread::available_parallelism()?.get().min(MAX_WORKERS),
        };

        if worker_threads == 0 || worker_threads > MAX_WORKERS {
            return Err(anyhow!(
                "worker_threads must be in 1..={MAX_WORKERS}, got {worker_threads}"
            ));
        }

        Ok(RuntimeConfig {
            domain: builder.domain,
            node: builder.node,
            worker_threads,
            thread_name: builder.thread_name,
            thread_stack_size: builder.thread_stack_size,
            pin_workers: builder.pin_workers,
            max_priorities: builder.max_priorities,
            max_tasks: builder.max_tasks,
            max_actions: builder.max_actions,
            max_groups: builder.max_groups,
            max_queues: builder.max_queues,
            job_binding: builder.job_binding,
        })
    }
}
