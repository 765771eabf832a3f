use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub(crate) type Listener = Arc<dyn Fn(bool) + Send + Sync>;

/// Identifies one registered listener.
///
/// Ids are handed out in increasing order, so ordering by id is ordering by
/// registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct ListenerId(u64);

/// Observer registry delivering wake transitions in registration order.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<BTreeMap<ListenerId, Listener>>,
}

impl Listeners {
    pub(crate) fn insert(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries().insert(id, listener);
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        self.entries().remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }

    /// Call every listener with `waking`.
    ///
    /// Iterates over a snapshot so a listener may subscribe or unsubscribe
    /// without deadlocking on the registry.
    pub(crate) fn notify(&self, waking: bool) {
        let snapshot: Vec<Listener> = self.entries().values().cloned().collect();
        for listener in snapshot {
            listener(waking);
        }
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<ListenerId, Listener>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.len())
            .finish()
    }
}

/// Handle returned by [`RequestActivity::subscribe`](crate::RequestActivity::subscribe).
///
/// Dropping the handle leaves the listener registered; call
/// [`unsubscribe`](Self::unsubscribe) to stop delivery.
#[derive(Debug)]
pub struct Subscription {
    id: ListenerId,
    registry: Arc<Listeners>,
}

impl Subscription {
    pub(crate) fn new(id: ListenerId, registry: Arc<Listeners>) -> Self {
        Self { id, registry }
    }

    /// Remove the listener. Calls after the first are no-ops.
    pub fn unsubscribe(&self) {
        self.registry.remove(self.id);
    }
}
