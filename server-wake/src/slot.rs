use std::sync::Arc;

use crate::tracker::Inner;

/// One pending request held against a [`RequestActivity`](crate::RequestActivity).
///
/// The request counts as in flight from acquisition until the slot is
/// dropped, whether the work finished, failed, panicked or was abandoned.
#[derive(Debug)]
pub struct PendingSlot(Option<Arc<Inner>>);

impl PendingSlot {
    pub(crate) fn acquire(inner: &Arc<Inner>) -> Self {
        inner.begin();
        Self(Some(Arc::clone(inner)))
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        if let Some(inner) = self.0.take() {
            inner.end();
        }
    }
}
