use crate::descriptor::Descriptor;

// Public API
mod context;
pub use self::context::TaskContext;

mod handle;
pub use self::handle::Task;

pub mod id;
pub use self::id::TaskId;

mod state;
pub use self::state::Status;

// Exports
pub(crate) mod harness;

pub(crate) mod inner;
pub(crate) use self::inner::{Body, TaskInner};

/// Per-start overrides.
///
/// ```
/// use mtask::{Descriptor, StartOptions};
///
/// let opts = StartOptions::new()
///     .descriptor(Descriptor::new().priority(2))
///     .correlation(17);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StartOptions {
    pub(crate) descriptor: Option<Descriptor>,
    pub(crate) correlation: Option<u64>,
}

impl StartOptions {
    pub const fn new() -> Self {
        Self {
            descriptor: None,
            correlation: None,
        }
    }

    /// Replaces the action's default descriptor for this task.
    pub const fn descriptor(mut self, descriptor: Descriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    /// Caller-chosen id reported back by group completions.
    pub const fn correlation(mut self, id: u64) -> Self {
        self.correlation = Some(id);
        self
    }
}

impl From<Descriptor> for StartOptions {
    fn from(descriptor: Descriptor) -> Self {
        StartOptions::new().descriptor(descriptor)
    }
}
