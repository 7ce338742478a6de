pub(crate) mod scope_guard;
pub(crate) use scope_guard::ScopeGuard;

pub(crate) mod signal;
pub(crate) use signal::{Signal, Wake, Waiters};

pub(crate) mod thread;
