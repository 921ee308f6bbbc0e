//! Subscriber registries and disposable subscription handles.
//!
//! Entry and exit callbacks are keyed by state; transition and progress
//! callbacks use the unit key. Notification clones the matching callbacks
//! out of the registry first, so a callback may subscribe or cancel without
//! deadlocking.

use ralph_domain::{StateTransition, SupervisorState, TransitionContext};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Called with the new state and the transition context.
pub type EnterCallback = dyn Fn(SupervisorState, &TransitionContext) + Send + Sync;
/// Called with the old and the new state.
pub type ExitCallback = dyn Fn(SupervisorState, SupervisorState) + Send + Sync;
/// Called with the full transition record.
pub type TransitionCallback = dyn Fn(&StateTransition) + Send + Sync;

/// A registry that can drop one of its entries.
pub trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, id: u64);
}

/// Handle returned by every registration.
///
/// Dropping the handle keeps the callback registered; call [`cancel`](Self::cancel)
/// to remove it. Cancelling after the registry is gone is a no-op.
#[must_use = "dropping a Subscription keeps the callback registered; call cancel() to remove it"]
pub struct Subscription {
    slot: Weak<dyn Unsubscribe>,
    id: u64,
}

impl Subscription {
    pub(crate) fn new(slot: Weak<dyn Unsubscribe>, id: u64) -> Self {
        Self { slot, id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(self) {
        if let Some(slot) = self.slot.upgrade() {
            slot.unsubscribe(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

struct Entry<K, F: ?Sized> {
    id: u64,
    key: K,
    callback: Arc<F>,
}

/// Ordered list of callbacks, each tagged with a key.
pub(crate) struct SubscriberList<K, F: ?Sized> {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry<K, F>>>,
}

impl<K, F> SubscriberList<K, F>
where
    K: PartialEq + Send + Sync + 'static,
    F: ?Sized + Send + Sync + 'static,
{
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        })
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Vec<Entry<K, F>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn add(self: &Arc<Self>, key: K, callback: Arc<F>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries().push(Entry { id, key, callback });
        let slot: Weak<dyn Unsubscribe> = Arc::downgrade(self) as Weak<dyn Unsubscribe>;
        Subscription::new(slot, id)
    }

    /// Callbacks registered under `key`, in registration order.
    pub(crate) fn matching(&self, key: &K) -> Vec<Arc<F>> {
        self.entries()
            .iter()
            .filter(|e| &e.key == key)
            .map(|e| e.callback.clone())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }
}

impl<K, F> Unsubscribe for SubscriberList<K, F>
where
    K: PartialEq + Send + Sync + 'static,
    F: ?Sized + Send + Sync + 'static,
{
    fn unsubscribe(&self, id: u64) {
        self.entries().retain(|e| e.id != id);
    }
}

/// The three registries a state machine notifies on each transition.
pub(crate) struct Observers {
    pub(crate) enter: Arc<SubscriberList<SupervisorState, EnterCallback>>,
    pub(crate) exit: Arc<SubscriberList<SupervisorState, ExitCallback>>,
    pub(crate) transition: Arc<SubscriberList<(), TransitionCallback>>,
}

impl Observers {
    pub(crate) fn new() -> Self {
        Self {
            enter: SubscriberList::new(),
            exit: SubscriberList::new(),
            transition: SubscriberList::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    type Counter = dyn Fn() + Send + Sync;

    #[test]
    fn test_matching_filters_by_key_in_order() {
        let list = SubscriberList::<u8, Counter>::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for (key, label) in [(1u8, "a"), (2, "b"), (1, "c")] {
            let calls = calls.clone();
            let _ = list.add(key, Arc::new(move || calls.lock().unwrap().push(label)));
        }

        for callback in list.matching(&1) {
            callback();
        }
        assert_eq!(*calls.lock().unwrap(), vec!["a", "c"]);
    }

    #[test]
    fn test_cancel_removes_only_that_entry() {
        let list = SubscriberList::<(), Counter>::new();
        let count = Arc::new(AtomicUsize::new(0));

        let first = {
            let count = count.clone();
            list.add((), Arc::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }))
        };
        let _second = list.add((), Arc::new(|| {}));
        assert_eq!(list.len(), 2);

        first.cancel();
        assert_eq!(list.len(), 1);
        for callback in list.matching(&()) {
            callback();
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_after_registry_dropped_is_noop() {
        let list = SubscriberList::<(), Counter>::new();
        let subscription = list.add((), Arc::new(|| {}));
        drop(list);
        subscription.cancel();
    }
}
