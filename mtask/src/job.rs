use std::fmt;

/// Identifier under which actions are registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u32);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u32> for JobId {
    fn from(val: u32) -> Self {
        JobId(val)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DomainId(pub u32);

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u32> for DomainId {
    fn from(val: u32) -> Self {
        DomainId(val)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl From<u32> for NodeId {
    fn from(val: u32) -> Self {
        NodeId(val)
    }
}

/// A lookup key for registered actions.
///
/// A `Job` holds no reference to any action. It is resolved every time a task
/// is started, so it stays valid while actions are registered, unregistered or
/// re-bound under the same id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Job {
    id: JobId,
    domain: DomainId,
}

impl Job {
    pub fn new(id: impl Into<JobId>, domain: DomainId) -> Self {
        Job {
            id: id.into(),
            domain,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn domain(&self) -> DomainId {
        self.domain
    }
}
