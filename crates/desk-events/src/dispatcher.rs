//! Action Dispatcher
//!
//! Bounded audit log with synchronous fan-out. Every dispatched action is
//! appended to an in-memory ring (oldest evicted past capacity) and, while
//! persistence is enabled, the whole ring is rewritten to the store.
//!
//! # Failure Handling
//!
//! - Store failures never reach the caller of `dispatch`. They are logged and
//!   handed to fault listeners; the dispatcher never dispatches on its own
//!   behalf, so a broken store cannot cause a loop.
//! - A quota failure turns persistence off until `set_persistence(true)`.
//! - A run of consecutive failures is reported once.
//! - Corrupt stored history is discarded wholesale on load.
//! - Subscribers run outside the dispatcher lock and are panic-isolated.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use desk_store::{wallclock_ms, SharedStore};
use serde_json::Value;

use crate::action::{Action, ActionKind, NewAction};
use crate::config::EventingConfig;
use crate::error::EventsError;
use crate::slot::JsonSlot;
use crate::subscribers::{SubscriberList, Subscription};

/// Handle to the action log. Cheap to clone; clones share one log.
#[derive(Clone)]
pub struct ActionDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    state: Mutex<DispatcherState>,
    slot: JsonSlot<VecDeque<Action>>,
    subscribers: SubscriberList<Action>,
    faults: SubscriberList<EventsError>,
    capacity: usize,
}

struct DispatcherState {
    /// Action entries, oldest first
    ring: VecDeque<Action>,
    /// Next action ID to assign
    next_id: u64,
    /// Whether dispatches are written to the store
    persist: bool,
    /// A persistence failure was already reported for the current failure run
    fault_reported: bool,
}

impl DispatcherInner {
    fn lock(&self) -> MutexGuard<'_, DispatcherState> {
        // No callback ever runs under this lock.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rewrite the persisted log from the ring.
    ///
    /// Returns the error to report, if this failure starts a new run.
    fn persist(&self, state: &mut DispatcherState) -> Result<(), Option<EventsError>> {
        match self.slot.write(&state.ring) {
            Ok(()) => {
                state.fault_reported = false;
                Ok(())
            }
            Err(err) => {
                if err.is_capacity() {
                    state.persist = false;
                    tracing::warn!(
                        key = self.slot.key(),
                        "[dispatcher] store full; action persistence disabled"
                    );
                }
                if state.fault_reported {
                    tracing::debug!(error = %err, "[dispatcher] persistence still failing");
                    Err(None)
                } else {
                    state.fault_reported = true;
                    Err(Some(err))
                }
            }
        }
    }

    /// Fallback channel: log and notify fault listeners. Never dispatches.
    fn report_fault(&self, err: EventsError) {
        tracing::error!(error = %err, "[dispatcher] action log fault");
        self.faults.notify(&err);
    }
}

impl ActionDispatcher {
    /// Create a dispatcher over `store` using `config` for capacity, the
    /// initial persistence flag and the log key.
    ///
    /// The ring starts empty; call [`load_from_storage`](Self::load_from_storage)
    /// to pick up history.
    pub fn new(store: SharedStore, config: &EventingConfig) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                state: Mutex::new(DispatcherState {
                    ring: VecDeque::new(),
                    next_id: 0,
                    persist: config.persist_actions,
                    fault_reported: false,
                }),
                slot: JsonSlot::new(store, config.action_log_key.clone()),
                subscribers: SubscriberList::new("dispatcher"),
                faults: SubscriberList::new("dispatcher-faults"),
                capacity: config.action_capacity(),
            }),
        }
    }

    /// Append an action and notify subscribers.
    ///
    /// Assigns `id` and `created_at`, evicts the oldest entry past capacity,
    /// persists the ring if enabled, then invokes every subscriber in
    /// subscription order. Never fails: storage problems go to the fault
    /// channel.
    pub fn dispatch(&self, new: NewAction) -> Action {
        let (action, fault) = {
            let mut state = self.inner.lock();
            let id = state.next_id;
            state.next_id += 1;

            let mut action = Action {
                id,
                kind: new.kind,
                action: new.action,
                details: new.details,
                created_at: wallclock_ms(),
                persisted: state.persist,
            };
            state.ring.push_back(action.clone());
            while state.ring.len() > self.inner.capacity {
                state.ring.pop_front();
            }

            let mut fault = None;
            if state.persist {
                if let Err(report) = self.inner.persist(&mut state) {
                    action.persisted = false;
                    if let Some(last) = state.ring.back_mut() {
                        last.persisted = false;
                    }
                    fault = report;
                }
            }
            (action, fault)
        };

        if let Some(err) = fault {
            self.inner.report_fault(err);
        }

        tracing::debug!(
            id = action.id,
            kind = %action.kind,
            action = %action.action,
            "[dispatcher] dispatched"
        );
        self.inner.subscribers.notify(&action);
        action
    }

    /// Register a listener for every future action.
    pub fn subscribe(&self, callback: impl Fn(&Action) + Send + Sync + 'static) -> Subscription {
        self.inner.subscribers.add(callback)
    }

    /// Register a listener on the fallback fault channel.
    ///
    /// Fault listeners must not rely on `dispatch` succeeding; the store may
    /// be the thing that is failing.
    pub fn on_fault(&self, callback: impl Fn(&EventsError) + Send + Sync + 'static) -> Subscription {
        self.inner.faults.add(callback)
    }

    /// Toggle persistence for future dispatches.
    ///
    /// Existing entries are neither written nor purged.
    pub fn set_persistence(&self, enabled: bool) {
        let mut state = self.inner.lock();
        state.persist = enabled;
        if enabled {
            state.fault_reported = false;
        }
        tracing::info!(enabled, "[dispatcher] persistence toggled");
    }

    /// Whether dispatches are currently written to the store.
    pub fn is_persistent(&self) -> bool {
        self.inner.lock().persist
    }

    /// Replace the ring with the persisted log.
    ///
    /// Missing history leaves an empty ring. Corrupt history is discarded
    /// (ring emptied, stored key removed) and reported on the fault channel.
    /// Returns the number of actions loaded.
    pub fn load_from_storage(&self) -> usize {
        let loaded = self.inner.slot.read();
        let mut state = self.inner.lock();
        match loaded {
            Ok(Some(mut log)) => {
                while log.len() > self.inner.capacity {
                    log.pop_front();
                }
                let next = log.iter().map(|a| a.id + 1).max().unwrap_or(0);
                state.next_id = state.next_id.max(next);
                state.ring = log;
                let count = state.ring.len();
                drop(state);
                tracing::info!(count, "[dispatcher] history loaded");
                count
            }
            Ok(None) => {
                state.ring.clear();
                0
            }
            Err(err) if err.is_serialization() => {
                state.ring.clear();
                drop(state);
                if let Err(clear_err) = self.inner.slot.clear() {
                    tracing::warn!(error = %clear_err, "[dispatcher] could not discard corrupt log");
                }
                self.inner.report_fault(err);
                0
            }
            Err(err) => {
                // Backend unreachable: keep what is in memory
                drop(state);
                self.inner.report_fault(err);
                0
            }
        }
    }

    /// Empty both the persisted log and the ring.
    pub fn clear_storage(&self) -> Result<(), EventsError> {
        self.inner.lock().ring.clear();
        self.inner.slot.clear()
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Snapshot of the ring in log order (oldest first).
    pub fn actions(&self) -> Vec<Action> {
        self.inner.lock().ring.iter().cloned().collect()
    }

    /// The most recent `count` actions, newest first.
    pub fn recent(&self, count: usize) -> Vec<Action> {
        self.inner.lock().ring.iter().rev().take(count).cloned().collect()
    }

    /// Actions of one category, in log order.
    pub fn by_kind(&self, kind: ActionKind) -> Vec<Action> {
        self.inner
            .lock()
            .ring
            .iter()
            .filter(|a| a.kind == kind)
            .cloned()
            .collect()
    }

    /// Number of actions in the ring.
    pub fn len(&self) -> usize {
        self.inner.lock().ring.len()
    }

    /// Check if the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().ring.is_empty()
    }

    /// Ring capacity.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    // =========================================================================
    // Category helpers
    // =========================================================================

    /// Dispatch a SYSTEM action.
    pub fn system(&self, action: impl Into<String>, details: Value) -> Action {
        self.dispatch(NewAction::new(ActionKind::System, action).with_details(details))
    }

    /// Dispatch a USER action.
    pub fn user(&self, action: impl Into<String>, details: Value) -> Action {
        self.dispatch(NewAction::new(ActionKind::User, action).with_details(details))
    }

    /// Dispatch an APP action.
    pub fn app(&self, action: impl Into<String>, details: Value) -> Action {
        self.dispatch(NewAction::new(ActionKind::App, action).with_details(details))
    }

    /// Dispatch a FILE action.
    pub fn file(&self, action: impl Into<String>, details: Value) -> Action {
        self.dispatch(NewAction::new(ActionKind::File, action).with_details(details))
    }

    /// Dispatch an ERROR action.
    pub fn error(&self, action: impl Into<String>, details: Value) -> Action {
        self.dispatch(NewAction::new(ActionKind::Error, action).with_details(details))
    }

    /// Dispatch a SECURITY action.
    pub fn security(&self, action: impl Into<String>, details: Value) -> Action {
        self.dispatch(NewAction::new(ActionKind::Security, action).with_details(details))
    }
}
