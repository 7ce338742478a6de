//! Placement of a task: which workers may run it, and how urgently.
//!
//! A [`Descriptor`] is a plain `Copy` value. Actions carry a default one, and
//! every start call may override it. The descriptor is copied into the task, so
//! changing it afterwards has no effect on tasks already started.
use std::fmt;

/// Maximum number of workers an [`Affinity`] can address.
pub const MAX_WORKERS: usize = u64::BITS as usize;

/// Set of worker indices eligible to run a task.
///
/// Worker indices outside of the runtime's pool are ignored when the task is
/// dispatched. An affinity that leaves no eligible worker is rejected at start.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Affinity(u64);

impl Affinity {
    /// Every worker is eligible.
    pub const fn all() -> Self {
        Affinity(u64::MAX)
    }

    /// No worker is eligible. Useful as a starting point for [`Affinity::with`].
    pub const fn none() -> Self {
        Affinity(0)
    }

    /// Only the given worker is eligible.
    #[track_caller]
    pub const fn worker(index: usize) -> Self {
        Affinity::none().with(index)
    }

    pub const fn from_bits(bits: u64) -> Self {
        Affinity(bits)
    }

    pub const fn bits(&self) -> u64 {
        self.0
    }

    #[track_caller]
    pub const fn with(self, index: usize) -> Self {
        assert!(index < MAX_WORKERS, "worker index out of range");
        Affinity(self.0 | (1 << index))
    }

    #[track_caller]
    pub const fn without(self, index: usize) -> Self {
        assert!(index < MAX_WORKERS, "worker index out of range");
        Affinity(self.0 & !(1 << index))
    }

    pub const fn contains(&self, index: usize) -> bool {
        index < MAX_WORKERS && self.0 & (1 << index) != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Restricts the set to the first `num_workers` workers.
    pub(crate) fn clamp(self, num_workers: usize) -> Self {
        if num_workers >= MAX_WORKERS {
            self
        } else {
            Affinity(self.0 & ((1u64 << num_workers) - 1))
        }
    }

    /// Eligible worker indices, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + use<> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let index = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            Some(index)
        })
    }
}

impl Default for Affinity {
    fn default() -> Self {
        Affinity::all()
    }
}

impl fmt::Debug for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == u64::MAX {
            f.write_str("Affinity(all)")
        } else {
            f.debug_set().entries(self.iter()).finish()
        }
    }
}

impl FromIterator<usize> for Affinity {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        iter.into_iter().fold(Affinity::none(), Affinity::with)
    }
}

/// Scheduling priority. Higher values are picked first.
///
/// The runtime accepts priorities in `0..max_priorities`, see
/// [`Builder::max_priorities`](crate::runtime::Builder::max_priorities).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u8);

impl Priority {
    pub const LOWEST: Priority = Priority(0);

    pub const fn get(&self) -> u8 {
        self.0
    }
}

impl From<u8> for Priority {
    fn from(val: u8) -> Self {
        Priority(val)
    }
}

/// Affinity and priority attached to a task when it starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Descriptor {
    pub affinity: Affinity,
    pub priority: Priority,
}

impl Descriptor {
    /// Any worker, lowest priority.
    pub const fn new() -> Self {
        Descriptor {
            affinity: Affinity::all(),
            priority: Priority::LOWEST,
        }
    }

    pub const fn affinity(mut self, affinity: Affinity) -> Self {
        self.affinity = affinity;
        self
    }

    pub fn priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }
}
