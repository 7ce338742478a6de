use crate::action::{ActionBuilder, ActionInner};
use crate::error::{Error, Result};
use crate::job::JobId;
use crate::runtime::runtime::JobBinding;
use crate::task::{TaskId, TaskInner};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use smallvec::SmallVec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

/// Bounded counter for a kind of runtime resource (groups, queues...).
#[derive(Debug)]
pub(crate) struct Slots {
    kind: &'static str,
    used: AtomicUsize,
    max: usize,
}

impl Slots {
    pub(crate) fn new(kind: &'static str, max: usize) -> Arc<Self> {
        Arc::new(Self {
            kind,
            used: AtomicUsize::new(0),
            max,
        })
    }

    pub(crate) fn try_take(&self) -> Result<()> {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.max).then_some(used + 1)
            })
            .map(|_| ())
            .map_err(|_| Error::ResourceExhausted(self.kind))
    }

    pub(crate) fn give_back(&self) {
        let prev = self.used.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "{} slot count underflow", self.kind);
    }

    /// Like `try_take`, the slot is given back when the guard drops.
    pub(crate) fn try_acquire(self: &Arc<Self>) -> Result<Slot> {
        self.try_take()?;
        Ok(Slot(Arc::clone(self)))
    }

    pub(crate) fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }
}

/// Gives its slot back on drop.
#[derive(Debug)]
pub(crate) struct Slot(Arc<Slots>);

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.give_back();
    }
}

#[derive(Debug)]
struct JobSlot {
    actions: SmallVec<[Arc<ActionInner>; 1]>,

    /// Round-robin position.
    cursor: AtomicUsize,
}

impl JobSlot {
    fn new(action: Arc<ActionInner>) -> Self {
        Self {
            actions: smallvec::smallvec![action],
            cursor: AtomicUsize::new(0),
        }
    }

    /// Next action in round-robin order, skipping disabled ones.
    fn pick(&self, job: JobId) -> Result<&Arc<ActionInner>> {
        let len = self.actions.len();
        if len == 0 {
            return Err(Error::UnknownJob(job));
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);

        (0..len)
            .map(|i| &self.actions[(start + i) % len])
            .find(|action| action.is_enabled())
            .ok_or(Error::ActionDisabled(job))
    }
}

/// Actions of a runtime, keyed by job id.
//
// `acquire` bumps the action's live count while holding the shard read lock and
// `unregister` checks it under the write lock, so an action can never be
// removed between being resolved and being referenced by a new task.
#[derive(Debug)]
pub(crate) struct ActionRegistry {
    binding: JobBinding,
    jobs: DashMap<JobId, JobSlot>,
    slots: Arc<Slots>,
}

impl ActionRegistry {
    pub(crate) fn new(binding: JobBinding, max_actions: usize) -> Self {
        Self {
            binding,
            jobs: DashMap::new(),
            slots: Slots::new("action", max_actions),
        }
    }

    pub(crate) fn register(&self, builder: ActionBuilder) -> Result<Arc<ActionInner>> {
        let job = builder.job();
        self.slots.try_take()?;

        let action = Arc::new(builder.build());

        match self.jobs.entry(job) {
            // A slot is never left empty, but treat one as unbound if it is.
            Entry::Occupied(mut entry) if entry.get().actions.is_empty() => {
                entry.get_mut().actions.push(Arc::clone(&action));
            }
            Entry::Occupied(mut entry) => match self.binding {
                JobBinding::Exclusive => {
                    self.slots.give_back();
                    return Err(Error::DuplicateJob(job));
                }
                JobBinding::RoundRobin => entry.get_mut().actions.push(Arc::clone(&action)),
            },
            Entry::Vacant(entry) => {
                entry.insert(JobSlot::new(Arc::clone(&action)));
            }
        }

        debug!(%job, descriptor = ?action.descriptor, "action registered");
        Ok(action)
    }

    /// Action a start on `job` would pick, without referencing it.
    pub(crate) fn resolve(&self, job: JobId) -> Result<Arc<ActionInner>> {
        let slot = self.jobs.get(&job).ok_or(Error::UnknownJob(job))?;
        slot.pick(job).map(Arc::clone)
    }

    /// Resolves `job` and counts a new live task against the action. Pair
    /// with `ActionInner::release`.
    pub(crate) fn acquire(&self, job: JobId) -> Result<Arc<ActionInner>> {
        let slot = self.jobs.get(&job).ok_or(Error::UnknownJob(job))?;
        let action = slot.pick(job)?;
        action.retain();
        Ok(Arc::clone(action))
    }

    /// Removes an action with no live task. The job entry goes away with its
    /// last action while the shard write lock is still held, so concurrent
    /// lookups never observe an empty slot.
    pub(crate) fn unregister(&self, action: &Arc<ActionInner>) -> Result<()> {
        let job = action.job;

        let Entry::Occupied(mut entry) = self.jobs.entry(job) else {
            return Err(Error::UnknownJob(job));
        };

        let pos = entry
            .get()
            .actions
            .iter()
            .position(|a| Arc::ptr_eq(a, action))
            .ok_or(Error::UnknownJob(job))?;

        let live = action.live();
        if live > 0 {
            return Err(Error::ActionBusy { job, live });
        }

        entry.get_mut().actions.remove(pos);
        if entry.get().actions.is_empty() {
            entry.remove();
        }

        self.slots.give_back();
        debug!(%job, "action unregistered");
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.used()
    }
}

/// Every task of the runtime that is not terminal yet.
#[derive(Debug)]
pub(crate) struct OwnedTasks {
    tasks: DashMap<TaskId, Arc<TaskInner>>,

    // DashMap::len locks every shard, keep our own count.
    slots: Arc<Slots>,

    closed: AtomicBool,
}

impl OwnedTasks {
    pub(crate) fn new(max_tasks: usize) -> Self {
        Self {
            tasks: DashMap::with_capacity(max_tasks.min(1024)),
            slots: Slots::new("task", max_tasks),
            closed: AtomicBool::new(false),
        }
    }

    /// Reserves room for one task, consumed by `insert` or handed back with
    /// `unreserve`.
    pub(crate) fn reserve(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::NotInitialized);
        }
        self.slots.try_take()
    }

    pub(crate) fn unreserve(&self) {
        self.slots.give_back();
    }

    /// Returns `false` if the registry was closed concurrently. The task is
    /// tracked either way and must be cancelled by the caller.
    #[must_use]
    pub(crate) fn insert(&self, task: &Arc<TaskInner>) -> bool {
        self.tasks.insert(task.id, Arc::clone(task));

        // Pairs with the swap in `close`, a task inserted after it is either
        // seen by `close` or sees the flag here.
        !self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn remove(&self, id: &TaskId) -> Option<Arc<TaskInner>> {
        self.tasks.remove(id).map(|(_id, task)| {
            self.slots.give_back();
            task
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.used()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the registry and returns the tasks still alive. Returns `None`
    /// if it was already closed.
    pub(crate) fn close(&self) -> Option<Vec<Arc<TaskInner>>> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return None;
        }

        // Clone out, cancelling removes from the map.
        Some(self.tasks.iter().map(|e| Arc::clone(e.value())).collect())
    }
}
