use std::time::{Duration, Instant};

/// Upper bound on how long a wait may block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Block until the condition holds.
    Infinite,

    /// Give up after the duration. `Duration::ZERO` only checks, never blocks.
    After(Duration),
}

impl Timeout {
    /// Check once without blocking.
    pub const NONE: Timeout = Timeout::After(Duration::ZERO);

    pub const fn from_millis(millis: u64) -> Self {
        Timeout::After(Duration::from_millis(millis))
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        match self {
            Timeout::Infinite => None,
            // Saturate far-future deadlines instead of overflowing `Instant`.
            Timeout::After(d) => Some(
                Instant::now()
                    .checked_add(*d)
                    .unwrap_or_else(|| Instant::now() + Duration::from_secs(u32::MAX as u64)),
            ),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(val: Duration) -> Self {
        Timeout::After(val)
    }
}
