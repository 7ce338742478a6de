/// Runs a closure when dropped, on every exit path including unwinding.
///
/// Used to undo partial work (a reserved slot, a registered waiter) when an
/// operation bails out early. Call [`ScopeGuard::disarm`] once the operation
/// has committed.
pub(crate) struct ScopeGuard<F: FnOnce()> {
    // Taken on drop or disarm, so the closure runs at most once.
    closure: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
    pub(crate) fn new(closure: F) -> Self {
        ScopeGuard {
            closure: Some(closure),
        }
    }

    pub(crate) fn disarm(mut self) {
        self.closure.take();
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(closure) = self.closure.take() {
            closure();
        }
    }
}
