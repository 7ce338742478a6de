//! Fork-join helpers built on the public task and group API.
use crate::descriptor::{Affinity, Descriptor, Priority};
use crate::error::Result;
use crate::runtime::Handle;
use crate::task::Task;
use crate::timeout::Timeout;

/// Where the closures of an [`invoke`] or a [`TaskGuard`] run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutionPolicy {
    descriptor: Descriptor,
}

impl ExecutionPolicy {
    pub const fn new() -> Self {
        Self {
            descriptor: Descriptor::new(),
        }
    }

    pub const fn affinity(mut self, affinity: Affinity) -> Self {
        self.descriptor = self.descriptor.affinity(affinity);
        self
    }

    pub fn priority(mut self, priority: impl Into<Priority>) -> Self {
        self.descriptor = self.descriptor.priority(priority);
        self
    }

    pub fn descriptor(&self) -> Descriptor {
        self.descriptor
    }
}

impl From<Descriptor> for ExecutionPolicy {
    fn from(descriptor: Descriptor) -> Self {
        Self { descriptor }
    }
}

/// Starts a closure on construction and waits for it when dropped, on every
/// exit path of the enclosing scope.
///
/// ```no_run
/// # fn main() -> anyhow::Result<()> {
/// use mtask::{ExecutionPolicy, TaskGuard};
///
/// let rt = mtask::Builder::new().try_build()?;
/// {
///     let _left = TaskGuard::new(&rt, ExecutionPolicy::new(), || println!("left"))?;
///     let _right = TaskGuard::new(&rt, ExecutionPolicy::new(), || println!("right"))?;
/// } // both done here
/// # Ok(())
/// # }
/// ```
#[must_use = "dropping the guard immediately waits for the task"]
#[derive(Debug)]
pub struct TaskGuard {
    task: Option<Task>,
}

impl TaskGuard {
    pub fn new<F>(handle: &Handle, policy: ExecutionPolicy, f: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let task = handle.spawn(move |_ctx| f(), policy.descriptor())?;
        Ok(Self { task: Some(task) })
    }

    pub fn task(&self) -> Option<&Task> {
        self.task.as_ref()
    }

    /// Waits now and reports the outcome, which `Drop` discards.
    pub fn join(mut self) -> Result<()> {
        match self.task.take() {
            Some(task) => task.wait(Timeout::Infinite),
            None => Ok(()),
        }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.wait(Timeout::Infinite);
        }
    }
}

/// Runs every closure in parallel and blocks until all of them are done.
///
/// Returns the first failure observed, a panicking closure is reported as
/// `TaskExecution` with [`PANIC_ERROR_CODE`](crate::PANIC_ERROR_CODE). Called
/// from a task body, the waiting worker keeps running ready tasks.
pub fn invoke<I, F>(handle: &Handle, policy: ExecutionPolicy, fs: I) -> Result<()>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() + Send + 'static,
{
    let group = handle.group()?;

    for f in fs {
        if let Err(e) = group.spawn(move |_ctx| f(), policy.descriptor()) {
            // Do not leave members running behind the caller's back.
            let _ = group.wait_all(Timeout::Infinite);
            return Err(e);
        }
    }

    group.wait_all(Timeout::Infinite)
}

/// Runs closures of different types in parallel, see [`invoke`].
///
/// ```no_run
/// # fn main() -> anyhow::Result<()> {
/// use mtask::ExecutionPolicy;
///
/// let rt = mtask::Builder::new().try_build()?;
/// mtask::invoke!(&rt, ExecutionPolicy::new(); || println!("a"), move || println!("b"))?;
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! invoke {
    ($handle:expr, $policy:expr; $($f:expr),+ $(,)?) => {
        $crate::invoke(
            $handle,
            $policy,
            [$(::std::boxed::Box::new($f) as ::std::boxed::Box<dyn FnOnce() + Send + 'static>),+],
        )
    };
}
