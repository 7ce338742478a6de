// Public API
pub mod runtime;
pub use runtime::{Builder, JobBinding, Runtime};

pub(crate) mod scheduler;
pub use scheduler::Handle;

pub(crate) mod context;
pub use context::current_worker;

// Exports
pub(crate) use runtime::RuntimeConfig;

mod pool;

pub(crate) mod registry;

pub(crate) mod wait;

pub(crate) mod worker;
