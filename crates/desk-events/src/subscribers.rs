//! Subscriber bookkeeping shared by the dispatcher, the queue and the bus.
//!
//! Fan-out works on a snapshot of the list taken under the lock; the lock is
//! released before any callback runs. Callbacks may therefore subscribe,
//! unsubscribe, dispatch or emit re-entrantly. A subscriber removed during a
//! fan-out still receives the value being delivered; it is gone for the next
//! one.
//!
//! Each callback runs inside `catch_unwind`: a panicking subscriber is logged
//! and skipped, the rest still receive the value.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Subscriber callback.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    id: u64,
    /// Topic filter (None = every value)
    topic: Option<String>,
    callback: Callback<T>,
}

struct ListState<T> {
    next_id: u64,
    entries: Vec<Entry<T>>,
}

/// Ordered subscriber list with panic isolation.
pub(crate) struct SubscriberList<T> {
    state: Arc<Mutex<ListState<T>>>,
    /// Component tag used in log lines
    label: &'static str,
}

impl<T> Clone for SubscriberList<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            label: self.label,
        }
    }
}

fn lock<T>(state: &Mutex<ListState<T>>) -> MutexGuard<'_, ListState<T>> {
    // Callbacks never run under this lock, so a poisoned guard can only come
    // from a panic inside Vec bookkeeping; the list is still consistent.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: 'static> SubscriberList<T> {
    pub(crate) fn new(label: &'static str) -> Self {
        Self {
            state: Arc::new(Mutex::new(ListState {
                next_id: 0,
                entries: Vec::new(),
            })),
            label,
        }
    }

    /// Register a callback for every value.
    pub(crate) fn add(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.add_entry(None, Arc::new(callback))
    }

    /// Register a callback for values published under `topic` only.
    pub(crate) fn add_topic(
        &self,
        topic: impl Into<String>,
        callback: impl Fn(&T) + Send + Sync + 'static,
    ) -> Subscription {
        self.add_entry(Some(topic.into()), Arc::new(callback))
    }

    fn add_entry(&self, topic: Option<String>, callback: Callback<T>) -> Subscription {
        let id = {
            let mut state = lock(&self.state);
            let id = state.next_id;
            state.next_id += 1;
            state.entries.push(Entry {
                id,
                topic,
                callback,
            });
            id
        };

        let weak: Weak<Mutex<ListState<T>>> = Arc::downgrade(&self.state);
        Subscription {
            id,
            label: self.label,
            remove: Some(Box::new(move || match weak.upgrade() {
                Some(state) => {
                    let mut state = lock(&state);
                    let before = state.entries.len();
                    state.entries.retain(|e| e.id != id);
                    state.entries.len() != before
                }
                None => false,
            })),
        }
    }

    /// Number of subscribers that would receive a value under `topic`.
    pub(crate) fn count(&self, topic: Option<&str>) -> usize {
        lock(&self.state)
            .entries
            .iter()
            .filter(|e| matches_topic(e.topic.as_deref(), topic))
            .count()
    }

    /// Total number of registered subscribers.
    pub(crate) fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    /// Deliver `value` to every subscriber.
    ///
    /// Returns the number of callbacks that completed without panicking.
    pub(crate) fn notify(&self, value: &T) -> usize {
        self.notify_topic(value, None)
    }

    /// Deliver `value` to subscribers registered for `topic` and to
    /// unfiltered subscribers, in registration order.
    pub(crate) fn notify_topic(&self, value: &T, topic: Option<&str>) -> usize {
        let targets: Vec<(u64, Callback<T>)> = lock(&self.state)
            .entries
            .iter()
            .filter(|e| matches_topic(e.topic.as_deref(), topic))
            .map(|e| (e.id, Arc::clone(&e.callback)))
            .collect();

        let mut delivered = 0;
        for (id, callback) in targets {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(value))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    tracing::warn!(
                        subscriber = id,
                        panic = %panic_message(payload.as_ref()),
                        "[{}] subscriber panicked; continuing with the rest",
                        self.label
                    );
                }
            }
        }
        delivered
    }
}

/// A subscriber with no topic receives everything; a topic subscriber only
/// its own topic.
fn matches_topic(filter: Option<&str>, topic: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(f) => topic == Some(f),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("<non-string panic payload>")
    }
}

/// Handle returned by every `subscribe`/`on`/`on_any` call.
///
/// Dropping the handle keeps the subscription alive; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
pub struct Subscription {
    id: u64,
    label: &'static str,
    remove: Option<Box<dyn FnOnce() -> bool + Send + Sync>>,
}

impl Subscription {
    /// Remove the subscriber.
    ///
    /// Returns `false` if it was already gone (or its component dropped).
    /// Other subscribers are unaffected.
    pub fn unsubscribe(mut self) -> bool {
        match self.remove.take() {
            Some(remove) => remove(),
            None => false,
        }
    }

    /// Identifier of the subscription within its component.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("component", &self.label)
            .finish()
    }
}
