use crate::{Action, ActionBuilder, Affinity, Builder, Descriptor, Handle, Runtime, Status, Task};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub(crate) const ECHO_JOB: u32 = 1;

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub(crate) fn init_runtime(workers: usize) -> anyhow::Result<Runtime> {
    init_runtime_with(Builder::new().worker_threads(workers))
}

pub(crate) fn init_runtime_with(builder: Builder) -> anyhow::Result<Runtime> {
    init_tracing();
    builder.try_build()
}

/// Copies its arguments into the result buffer.
pub(crate) fn register_echo(handle: &Handle, size: usize) -> crate::Result<Action> {
    handle.register(
        ActionBuilder::new(ECHO_JOB, |_ctx, args, result| {
            result.copy_from_slice(args);
        })
        .arg_size(size)
        .result_size(size),
    )
}

/// A latch test bodies block on, outside of the runtime's own waits.
#[derive(Debug, Default)]
pub(crate) struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cv.wait(&mut open);
        }
    }

    pub(crate) fn open(&self) {
        *self.open.lock() = true;
        self.cv.notify_all();
    }
}

/// Occupies `worker` until the returned gate is opened. Returns once the
/// blocking task is running.
pub(crate) fn block_worker(handle: &Handle, worker: usize) -> anyhow::Result<(Arc<Gate>, Task)> {
    let gate = Gate::new();
    let inner = Arc::clone(&gate);

    let task = handle.spawn(
        move |_ctx| inner.wait(),
        Descriptor::new().affinity(Affinity::worker(worker)),
    )?;

    wait_until(|| task.status() == Status::Running)?;
    Ok((gate, task))
}

/// Spins until `cond` holds, failing after a generous deadline.
pub(crate) fn wait_until(mut cond: impl FnMut() -> bool) -> anyhow::Result<()> {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        if Instant::now() > deadline {
            anyhow::bail!("condition not met in time");
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    Ok(())
}
