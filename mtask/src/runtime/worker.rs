use crate::runtime::scheduler::Handle;
use crate::task::{Status, TaskId, TaskInner};
use crate::utils::{Signal, Wake};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace};

/// Ready tasks of one worker: one FIFO lane per priority level.
///
/// The same task sits in the ready queue of every worker its affinity allows.
/// Entries already claimed or cancelled elsewhere are discarded when popped.
#[derive(Debug)]
pub(crate) struct ReadyQueue {
    lanes: Box<[VecDeque<Arc<TaskInner>>]>,
    len: usize,
}

impl ReadyQueue {
    pub(crate) fn new(priorities: u8) -> Self {
        Self {
            lanes: (0..priorities.max(1)).map(|_| VecDeque::new()).collect(),
            len: 0,
        }
    }

    pub(crate) fn push(&mut self, task: Arc<TaskInner>) {
        let lane = (task.descriptor.priority.get() as usize).min(self.lanes.len() - 1);
        self.lanes[lane].push_back(task);
        self.len += 1;
    }

    /// Highest priority first, FIFO within a priority.
    pub(crate) fn pop(&mut self) -> Option<Arc<TaskInner>> {
        let task = self
            .lanes
            .iter_mut()
            .rev()
            .find_map(|lane| lane.pop_front())?;
        self.len -= 1;
        Some(task)
    }

    pub(crate) fn remove(&mut self, id: TaskId) -> bool {
        let lane = self
            .lanes
            .iter_mut()
            .find_map(|lane| lane.iter().position(|t| t.id == id).map(|pos| (lane, pos)));

        match lane {
            Some((lane, pos)) => {
                lane.remove(pos);
                self.len -= 1;
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

#[derive(Debug)]
pub(crate) struct Worker {
    pub(crate) index: usize,

    ready: Mutex<ReadyQueue>,

    /// Wakes the worker for new tasks, for completions it waits on from inside
    /// a task body, and for shutdown.
    pub(crate) signal: Arc<Signal>,
}

impl Worker {
    pub(crate) fn new(index: usize, priorities: u8) -> Self {
        Self {
            index,
            ready: Mutex::new(ReadyQueue::new(priorities)),
            signal: Arc::new(Signal::new()),
        }
    }

    pub(crate) fn push(&self, task: Arc<TaskInner>) {
        self.ready.lock().push(task);
        self.signal.notify(Wake::TASK_READY);
    }

    pub(crate) fn remove(&self, id: TaskId) -> bool {
        self.ready.lock().remove(id)
    }

    pub(crate) fn backlog(&self) -> usize {
        self.ready.lock().len()
    }

    /// Pops entries until one can be claimed (QUEUED -> RUNNING). Stale
    /// entries are dropped on the way.
    pub(crate) fn claim(&self) -> Option<Arc<TaskInner>> {
        loop {
            let task = self.ready.lock().pop()?;
            if task.state.transition(Status::Queued, Status::Running) {
                return Some(task);
            }
        }
    }

    pub(crate) fn event_loop(&self, handle: &Handle) {
        debug!(worker = self.index, "worker started");

        loop {
            if handle.is_shutdown() {
                break;
            }

            if handle.run_next(self.index) {
                continue;
            }

            let woken = self.signal.wait(None);
            trace!(worker = self.index, ?woken, "worker woke up");
        }

        debug!(worker = self.index, "worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Descriptor;
    use crate::task::Body;
    use parking_lot::Mutex;

    fn task(priority: u8) -> Arc<TaskInner> {
        Arc::new(TaskInner::new(
            Body::Closure(Mutex::new(None)),
            &[],
            0,
            Descriptor::new().priority(priority),
            None,
        ))
    }

    #[test]
    fn test_ready_queue_priority_then_fifo() {
        let mut ready = ReadyQueue::new(3);
        let tasks = [task(0), task(2), task(1), task(2), task(0)];
        for t in &tasks {
            ready.push(Arc::clone(t));
        }
        assert_eq!(ready.len(), 5);

        let order = std::iter::from_fn(|| ready.pop())
            .map(|t| t.id)
            .collect::<Vec<_>>();
        let expected = [1, 3, 2, 0, 4].map(|i| tasks[i].id);
        assert_eq!(order, expected);
        assert_eq!(ready.len(), 0);
    }

    #[test]
    fn test_ready_queue_remove() {
        let mut ready = ReadyQueue::new(2);
        let (a, b) = (task(1), task(1));
        ready.push(Arc::clone(&a));
        ready.push(Arc::clone(&b));

        assert!(ready.remove(a.id));
        assert!(!ready.remove(a.id));
        assert_eq!(ready.pop().map(|t| t.id), Some(b.id));
    }

    #[test]
    fn test_claim_skips_stale_entries() {
        let worker = Worker::new(0, 1);
        let (a, b) = (task(0), task(0));
        for t in [&a, &b] {
            assert!(t.state.transition(Status::Created, Status::Queued));
            worker.push(Arc::clone(t));
        }

        // Claimed by another worker.
        assert!(a.state.transition(Status::Queued, Status::Running));

        let claimed = worker.claim().map(|t| t.id);
        assert_eq!(claimed, Some(b.id));
        assert!(worker.claim().is_none());
        assert_eq!(worker.backlog(), 0);
    }
}
