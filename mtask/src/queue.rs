//! Strictly ordered submission of tasks for one job.
use crate::descriptor::Descriptor;
use crate::error::Result;
use crate::group::Group;
use crate::job::Job;
use crate::runtime::Handle;
use crate::runtime::registry::Slot;
use crate::runtime::scheduler::{Launch, Target};
use crate::task::{StartOptions, Status, Task, TaskInner};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

#[derive(Default)]
struct QueueState {
    /// A member was dispatched and is not terminal yet.
    busy: bool,

    /// Members waiting for their predecessor, in submission order. All of them
    /// are CREATED, or CANCELLED and about to be removed.
    pending: VecDeque<Arc<TaskInner>>,
}

#[derive(Default)]
pub(crate) struct QueueShared {
    state: Mutex<QueueState>,
}

impl QueueShared {
    /// Called on a freshly created member. Returns `true` if the caller must
    /// push it to the ready queues, the member is QUEUED already.
    pub(crate) fn submit(&self, task: &Arc<TaskInner>) -> bool {
        let mut state = self.state.lock();
        if state.busy {
            state.pending.push_back(Arc::clone(task));
            return false;
        }

        if !task.state.transition(Status::Created, Status::Queued) {
            return false;
        }
        state.busy = true;
        true
    }

    pub(crate) fn on_complete(&self, task: &Arc<TaskInner>, from: Status, handle: &Handle) {
        if from == Status::Created {
            // Cancelled before it became eligible, the predecessor still runs.
            self.state.lock().pending.retain(|t| !Arc::ptr_eq(t, task));
            return;
        }

        if let Some(next) = self.advance() {
            trace!(task = %next.id, "queue successor released");
            handle.push_ready(&next);
        }
    }

    /// Makes the next live member eligible, or marks the queue idle.
    fn advance(&self) -> Option<Arc<TaskInner>> {
        let mut state = self.state.lock();
        while let Some(next) = state.pending.pop_front() {
            if next.state.transition(Status::Created, Status::Queued) {
                return Some(next);
            }
        }
        state.busy = false;
        None
    }
}

/// Submits tasks for one job that run one after the other, in submission
/// order, whatever their affinity.
pub struct Queue {
    job: Job,
    descriptor: Descriptor,
    shared: Arc<QueueShared>,
    handle: Handle,
    _slot: Slot,
}

impl Queue {
    pub(crate) fn new(handle: Handle, job: Job, descriptor: Descriptor, slot: Slot) -> Self {
        Self {
            job,
            descriptor,
            shared: Arc::new(QueueShared::default()),
            handle,
            _slot: slot,
        }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn descriptor(&self) -> Descriptor {
        self.descriptor
    }

    /// Starts a task that becomes eligible once the previous one is terminal.
    pub fn enqueue(&self, args: &[u8], result_size: usize) -> Result<Task> {
        self.launch(args, result_size, None)
    }

    /// Like [`enqueue`](Queue::enqueue), the task also joins `group`.
    pub fn enqueue_grouped(&self, group: &Group, args: &[u8], result_size: usize) -> Result<Task> {
        self.launch(args, result_size, Some(group))
    }

    fn launch(&self, args: &[u8], result_size: usize, group: Option<&Group>) -> Result<Task> {
        self.handle.launch(Launch {
            target: Target::Job(&self.job),
            args,
            result_size,
            opts: StartOptions::new().descriptor(self.descriptor),
            group: group.map(Group::shared),
            queue: Some(&self.shared),
        })
    }

    /// Members submitted but not yet eligible.
    pub fn backlog(&self) -> usize {
        self.shared.state.lock().pending.len()
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("job", &self.job)
            .field("descriptor", &self.descriptor)
            .field("backlog", &self.backlog())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use crate::{ActionBuilder, Affinity, Error, Timeout};
    use anyhow::Result;
    use std::sync::atomic::{AtomicBool, Ordering};

    const ORDERED_JOB: u32 = 11;

    #[test]
    fn test_members_run_in_order_without_overlap() -> Result<()> {
        let rt = init_runtime(4)?;
        let order = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicBool::new(false));

        let (log, busy) = (Arc::clone(&order), Arc::clone(&running));
        rt.register(
            ActionBuilder::new(ORDERED_JOB, move |_ctx, args, _result| {
                assert!(!busy.swap(true, Ordering::SeqCst), "queue members overlapped");
                std::thread::sleep(std::time::Duration::from_micros(200));
                log.lock().push(args[0]);
                busy.store(false, Ordering::SeqCst);
            })
            .arg_size(1),
        )?;

        let queue = rt.queue(&rt.job(ORDERED_JOB), Descriptor::new())?;
        let tasks = (0..32u8)
            .map(|i| queue.enqueue(&[i], 0))
            .collect::<crate::Result<Vec<_>>>()?;

        for task in &tasks {
            task.wait(Timeout::Infinite)?;
            assert_eq!(task.status(), Status::Completed);
        }

        assert_eq!(*order.lock(), (0..32).collect::<Vec<_>>());
        assert_eq!(queue.backlog(), 0);
        Ok(())
    }

    #[test]
    fn test_cancelled_successor_is_skipped() -> Result<()> {
        let rt = init_runtime(2)?;
        register_echo(&rt, 1)?;
        let (gate, _blocker) = block_worker(&rt, 0)?;

        let queue = rt.queue(
            &rt.job(ECHO_JOB),
            Descriptor::new().affinity(Affinity::worker(0)),
        )?;
        let first = queue.enqueue(&[1], 1)?;
        let second = queue.enqueue(&[2], 1)?;
        let third = queue.enqueue(&[3], 1)?;

        assert_eq!(first.status(), Status::Queued);
        assert_eq!(second.status(), Status::Created);
        assert_eq!(queue.backlog(), 2);

        assert!(second.cancel());
        assert_eq!(queue.backlog(), 1);
        assert_eq!(second.wait(Timeout::NONE), Err(Error::Cancelled));

        gate.open();
        assert_eq!(third.join()?, vec![3]);
        assert_eq!(first.join()?, vec![1]);
        assert_eq!(queue.backlog(), 0);
        Ok(())
    }

    #[test]
    fn test_cancelled_head_releases_next() -> Result<()> {
        let rt = init_runtime(1)?;
        register_echo(&rt, 1)?;
        let (gate, _blocker) = block_worker(&rt, 0)?;

        let queue = rt.queue(&rt.job(ECHO_JOB), Descriptor::new())?;
        let head = queue.enqueue(&[1], 1)?;
        let next = queue.enqueue(&[2], 1)?;

        assert!(head.cancel());
        assert_eq!(next.status(), Status::Queued);

        gate.open();
        assert_eq!(next.join()?, vec![2]);
        Ok(())
    }

    #[test]
    fn test_grouped_members() -> Result<()> {
        let rt = init_runtime(2)?;
        register_echo(&rt, 1)?;

        let queue = rt.queue(&rt.job(ECHO_JOB), Descriptor::new())?;
        let group = rt.group()?;
        for i in 0..4 {
            queue.enqueue_grouped(&group, &[i], 1)?;
        }

        let mut results = Vec::new();
        while let Ok(done) = group.wait_any(Timeout::Infinite) {
            results.extend(done.take_result().unwrap_or_default());
        }

        // Queue members finish in submission order.
        assert_eq!(results, vec![0, 1, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_invalid_queue_descriptor() -> Result<()> {
        let rt = init_runtime(2)?;
        assert_eq!(
            rt.queue(&rt.job(ECHO_JOB), Descriptor::new().priority(9)).err(),
            Some(Error::InvalidPriority { priority: 9, max: 4 })
        );
        Ok(())
    }
}
