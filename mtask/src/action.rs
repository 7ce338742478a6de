//! Actions are the executable units behind jobs.
//!
//! An action is built with an [`ActionBuilder`] and registered on a runtime
//! [`Handle`](crate::Handle) under a [`JobId`]. Tasks are started against a
//! [`Job`](crate::Job) and the registry picks the action at start time.
use crate::descriptor::Descriptor;
use crate::error::{Error, Fault, IntoOutcome, Result};
use crate::job::JobId;
use crate::task::TaskContext;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub(crate) type EntryFn =
    dyn Fn(&TaskContext<'_>, &[u8], &mut [u8]) -> std::result::Result<(), Fault> + Send + Sync;

pub(crate) type NodeLocal = Arc<dyn Any + Send + Sync>;

/// Describes an action before it is registered.
///
/// ```
/// use mtask::{ActionBuilder, Descriptor, Fault};
///
/// let builder = ActionBuilder::new(7, |_ctx, args, result| {
///     let n = u32::from_le_bytes(args.try_into().map_err(|_| Fault::Error(1))?);
///     result.copy_from_slice(&(n * 2).to_le_bytes());
///     Ok(())
/// })
/// .arg_size(4)
/// .result_size(4)
/// .descriptor(Descriptor::new().priority(1));
/// ```
pub struct ActionBuilder {
    job: JobId,
    entry: Arc<EntryFn>,
    node_local: Option<NodeLocal>,
    descriptor: Descriptor,
    arg_size: Option<usize>,
    result_size: Option<usize>,
}

impl ActionBuilder {
    /// The entry receives the task context, the argument buffer and the result
    /// buffer. It returns `()` or `Result<(), Fault>`.
    pub fn new<F, R>(job: impl Into<JobId>, entry: F) -> Self
    where
        F: Fn(&TaskContext<'_>, &[u8], &mut [u8]) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        Self {
            job: job.into(),
            entry: Arc::new(move |ctx: &TaskContext<'_>, args: &[u8], result: &mut [u8]| {
                entry(ctx, args, result).into_outcome()
            }),
            node_local: None,
            descriptor: Descriptor::default(),
            arg_size: None,
            result_size: None,
        }
    }

    /// Data shared by every task of this action, see
    /// [`TaskContext::node_local`].
    pub fn node_local<T: Any + Send + Sync>(mut self, data: T) -> Self {
        self.node_local = Some(Arc::new(data));
        self
    }

    /// Placement used when a start call does not provide its own.
    pub fn descriptor(mut self, descriptor: Descriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    /// Exact argument size in bytes. Unchecked when not set.
    pub fn arg_size(mut self, size: usize) -> Self {
        self.arg_size = Some(size);
        self
    }

    /// Exact result buffer size in bytes. Unchecked when not set.
    pub fn result_size(mut self, size: usize) -> Self {
        self.result_size = Some(size);
        self
    }

    pub(crate) fn job(&self) -> JobId {
        self.job
    }

    pub(crate) fn default_descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub(crate) fn build(self) -> ActionInner {
        ActionInner {
            job: self.job,
            entry: self.entry,
            node_local: self.node_local,
            descriptor: self.descriptor,
            arg_size: self.arg_size,
            result_size: self.result_size,
            live: AtomicUsize::new(0),
            enabled: AtomicBool::new(true),
        }
    }
}

impl fmt::Debug for ActionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionBuilder")
            .field("job", &self.job)
            .field("descriptor", &self.descriptor)
            .field("arg_size", &self.arg_size)
            .field("result_size", &self.result_size)
            .finish_non_exhaustive()
    }
}

pub(crate) struct ActionInner {
    pub(crate) job: JobId,
    pub(crate) entry: Arc<EntryFn>,
    pub(crate) node_local: Option<NodeLocal>,
    pub(crate) descriptor: Descriptor,
    arg_size: Option<usize>,
    result_size: Option<usize>,

    /// Tasks started against this action that are not terminal yet.
    live: AtomicUsize,

    enabled: AtomicBool,
}

impl ActionInner {
    pub(crate) fn check_buffers(&self, args: usize, result: usize) -> Result<()> {
        if let Some(expected) = self.arg_size
            && expected != args
        {
            return Err(Error::ArgSize {
                expected,
                actual: args,
            });
        }

        if let Some(expected) = self.result_size
            && expected != result
        {
            return Err(Error::ResultSize {
                expected,
                actual: result,
            });
        }

        Ok(())
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn retain(&self) {
        self.live.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release(&self) {
        let prev = self.live.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "action live count underflow");
    }

    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ActionInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("job", &self.job)
            .field("descriptor", &self.descriptor)
            .field("live", &self.live())
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

/// Handle to a registered action.
///
/// Cloning is cheap. The handle stays usable after the action is unregistered,
/// but new tasks can no longer resolve to it.
#[derive(Clone, Debug)]
pub struct Action {
    pub(crate) inner: Arc<ActionInner>,
}

impl Action {
    pub(crate) fn new(inner: Arc<ActionInner>) -> Self {
        Self { inner }
    }

    pub fn job(&self) -> JobId {
        self.inner.job
    }

    pub fn descriptor(&self) -> Descriptor {
        self.inner.descriptor
    }

    /// Number of tasks referencing this action that are not terminal yet.
    pub fn live_tasks(&self) -> usize {
        self.inner.live()
    }

    /// New starts resolving to this action fail with `ActionDisabled` until it
    /// is enabled again. Tasks already started are unaffected.
    pub fn disable(&self) {
        self.inner.enabled.store(false, Ordering::Release);
    }

    pub fn enable(&self) {
        self.inner.enabled.store(true, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_enabled()
    }
}
