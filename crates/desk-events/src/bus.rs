//! System Bus
//!
//! Ephemeral publish/subscribe inside one context. Nothing is persisted: an
//! event reaches the subscribers registered when it is emitted, in
//! registration order, and is gone afterwards.

use desk_store::wallclock_ms;
use serde::Serialize;
use serde_json::Value;

use crate::action::{ActionKind, NewAction};
use crate::dispatcher::ActionDispatcher;
use crate::subscribers::{SubscriberList, Subscription};

// =============================================================================
// Well-known event names
// =============================================================================

/// A window was opened.
pub const WINDOW_OPEN: &str = "window:open";
/// A window was closed.
pub const WINDOW_CLOSE: &str = "window:close";
/// A window gained focus.
pub const WINDOW_FOCUS: &str = "window:focus";
/// The desktop theme changed.
pub const THEME_CHANGE: &str = "theme:change";
/// The desktop finished booting.
pub const DESKTOP_READY: &str = "desktop:ready";

/// An in-process notification.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Colon-separated event name, e.g. `window:open`
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
    pub emitted_at: u64,
}

/// Same-context publish/subscribe. Clones share subscribers.
#[derive(Clone)]
pub struct SystemBus {
    subscribers: SubscriberList<Event>,
}

impl Default for SystemBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemBus {
    pub fn new() -> Self {
        Self {
            subscribers: SubscriberList::new("bus"),
        }
    }

    /// Deliver an event to its subscribers and to every `on_any` subscriber.
    ///
    /// Returns the number of subscribers that received it.
    pub fn emit(&self, kind: impl Into<String>, payload: Value) -> usize {
        let event = Event {
            kind: kind.into(),
            payload,
            emitted_at: wallclock_ms(),
        };
        let delivered = self.subscribers.notify_topic(&event, Some(&event.kind));
        if delivered == 0 {
            tracing::trace!(kind = %event.kind, "[bus] event had no listeners");
        }
        delivered
    }

    /// Subscribe to one event name.
    pub fn on(
        &self,
        kind: impl Into<String>,
        callback: impl Fn(&Event) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribers.add_topic(kind, callback)
    }

    /// Subscribe to every event.
    pub fn on_any(&self, callback: impl Fn(&Event) + Send + Sync + 'static) -> Subscription {
        self.subscribers.add(callback)
    }

    /// Number of subscribers an event named `kind` would reach.
    pub fn subscriber_count(&self, kind: &str) -> usize {
        self.subscribers.count(Some(kind))
    }

    /// Record every event as a SYSTEM action on `dispatcher`.
    ///
    /// The action verb is the event name and the details are its payload.
    pub fn bridge_to(&self, dispatcher: &ActionDispatcher) -> Subscription {
        let dispatcher = dispatcher.clone();
        self.on_any(move |event| {
            dispatcher.dispatch(
                NewAction::new(ActionKind::System, event.kind.clone()).with_details(event.payload.clone()),
            );
        })
    }
}

impl std::fmt::Debug for SystemBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
