//! Snapshot container
//!
//! Holds the last committed snapshot, its version and the change
//! subscribers. A `set_state` issued while subscribers are being notified
//! is queued and delivered after the current notification pass ends, and
//! each pass notifies the subscribers registered when it started.

use arbor_types::Value;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

/// An immutable published snapshot
pub type Snapshot = Arc<Value>;

type Callback = Arc<dyn Fn() + Send + Sync>;

struct Committed {
    version: u64,
    snapshot: Snapshot,
}

#[derive(Default)]
struct Delivery {
    queue: VecDeque<Snapshot>,
    delivering: bool,
}

/// Resets the delivery flag if a subscriber panics mid-pass
struct DeliveryGuard<'a> {
    delivery: &'a Mutex<Delivery>,
    armed: bool,
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.delivery.lock().delivering = false;
        }
    }
}

/// Versioned holder of the current snapshot
pub struct Container {
    state: RwLock<Committed>,
    subscribers: Mutex<Vec<(u64, Callback)>>,
    next_subscriber: AtomicU64,
    delivery: Mutex<Delivery>,
}

impl Container {
    /// An empty container: `Null` snapshot at version 0
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Committed {
                version: 0,
                snapshot: Arc::new(Value::Null),
            }),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber: AtomicU64::new(0),
            delivery: Mutex::new(Delivery::default()),
        }
    }

    /// Current snapshot
    pub fn get_state(&self) -> Snapshot {
        Arc::clone(&self.state.read().snapshot)
    }

    /// Number of commits so far; 0 before the first
    pub fn version(&self) -> u64 {
        self.state.read().version
    }

    /// Version and snapshot read together
    pub fn current(&self) -> (u64, Snapshot) {
        let state = self.state.read();
        (state.version, Arc::clone(&state.snapshot))
    }

    /// Publish `snapshot` as the next version and notify subscribers
    pub fn set_state(&self, snapshot: Snapshot) {
        {
            let mut delivery = self.delivery.lock();
            delivery.queue.push_back(snapshot);
            if delivery.delivering {
                trace!(queued = delivery.queue.len(), "set_state during notification; queued");
                return;
            }
            delivery.delivering = true;
        }
        let mut guard = DeliveryGuard {
            delivery: &self.delivery,
            armed: true,
        };

        loop {
            let next = {
                let mut delivery = self.delivery.lock();
                let next = delivery.queue.pop_front();
                if next.is_none() {
                    delivery.delivering = false;
                }
                next
            };
            let Some(snapshot) = next else {
                break;
            };

            let version = {
                let mut state = self.state.write();
                state.version += 1;
                state.snapshot = snapshot;
                state.version
            };

            let subscribers: Vec<Callback> = self
                .subscribers
                .lock()
                .iter()
                .map(|(_, callback)| Arc::clone(callback))
                .collect();
            trace!(version, subscribers = subscribers.len(), "notifying subscribers");
            for callback in subscribers {
                callback();
            }
        }
        guard.armed = false;
    }

    /// Register `callback` to run after every commit
    pub fn subscribe(self: &Arc<Self>, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push((id, Arc::new(callback)));
        Subscription {
            id,
            container: Arc::downgrade(self),
        }
    }

    fn remove_subscriber(&self, id: u64) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Drop every subscriber
    pub fn clear_subscribers(&self) {
        self.subscribers.lock().clear();
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("version", &self.version())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Handle returned by [`Container::subscribe`]
///
/// Dropping it keeps the subscription; call [`unsubscribe`](Self::unsubscribe).
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    container: Weak<Container>,
}

impl Subscription {
    /// Remove the callback; true only on the call that removed it
    pub fn unsubscribe(&self) -> bool {
        self.container
            .upgrade()
            .is_some_and(|container| container.remove_subscriber(self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(n: i64) -> Snapshot {
        Arc::new(Value::from(n))
    }

    #[test]
    fn test_versions_increase_by_one() {
        let container = Container::new();
        assert_eq!(container.version(), 0);
        assert!(container.get_state().is_null());

        for n in 1..=3 {
            let next = snapshot(n * 10);
            container.set_state(Arc::clone(&next));
            assert_eq!(container.version(), n as u64);
            assert!(Arc::ptr_eq(&container.get_state(), &next));
        }
    }

    #[test]
    fn test_subscribers_run_in_registration_order() {
        let container = Arc::new(Container::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second"] {
            let log = Arc::clone(&log);
            container.subscribe(move || log.lock().push(name));
        }

        container.set_state(snapshot(1));
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_reentrant_set_state_is_queued() {
        let container = Arc::new(Container::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        {
            let weak = Arc::downgrade(&container);
            let seen = Arc::clone(&seen);
            container.subscribe(move || {
                let Some(container) = weak.upgrade() else { return };
                let (version, state) = container.current();
                seen.lock().push((version, state.as_i64()));
                if version == 1 {
                    container.set_state(snapshot(2));
                    assert_eq!(container.version(), 1);
                }
            });
        }
        {
            let weak = Arc::downgrade(&container);
            let seen = Arc::clone(&seen);
            container.subscribe(move || {
                let Some(container) = weak.upgrade() else { return };
                seen.lock().push((container.version(), container.get_state().as_i64()));
            });
        }

        container.set_state(snapshot(1));
        assert_eq!(
            *seen.lock(),
            vec![(1, Some(1)), (1, Some(1)), (2, Some(2)), (2, Some(2))]
        );
        assert_eq!(container.version(), 2);
    }

    #[test]
    fn test_registration_during_delivery_waits_for_next_pass() {
        let container = Arc::new(Container::new());
        let late_calls = Arc::new(AtomicU64::new(0));

        {
            let weak = Arc::downgrade(&container);
            let late_calls = Arc::clone(&late_calls);
            container.subscribe(move || {
                let Some(container) = weak.upgrade() else { return };
                if container.version() == 1 {
                    let late_calls = Arc::clone(&late_calls);
                    container.subscribe(move || {
                        late_calls.fetch_add(1, Ordering::SeqCst);
                    });
                }
            });
        }

        container.set_state(snapshot(1));
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        container.set_state(snapshot(2));
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_removal_during_delivery_takes_effect_next_pass() {
        let container = Arc::new(Container::new());
        let later: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let later_calls = Arc::new(AtomicU64::new(0));

        {
            let later = Arc::clone(&later);
            container.subscribe(move || {
                if let Some(subscription) = later.lock().as_ref() {
                    subscription.unsubscribe();
                }
            });
        }
        let subscription = {
            let later_calls = Arc::clone(&later_calls);
            container.subscribe(move || {
                later_calls.fetch_add(1, Ordering::SeqCst);
            })
        };
        *later.lock() = Some(subscription);

        container.set_state(snapshot(1));
        assert_eq!(later_calls.load(Ordering::SeqCst), 1);
        assert_eq!(container.subscriber_count(), 1);

        container.set_state(snapshot(2));
        assert_eq!(later_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let container = Arc::new(Container::new());
        let calls = Arc::new(AtomicU64::new(0));
        let subscription = {
            let calls = Arc::clone(&calls);
            container.subscribe(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };

        container.set_state(snapshot(1));
        assert!(subscription.unsubscribe());
        assert!(!subscription.unsubscribe());
        container.set_state(snapshot(2));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(container.subscriber_count(), 0);
    }
}
