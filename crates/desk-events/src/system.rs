//! Event System
//!
//! Single wiring point for one context. Builds the dispatcher, the queue and
//! the bus over one store and hands out cheap handles to each:
//!
//! 1. The dispatcher owns the action log key
//! 2. The queue owns the command queue key and reports corruption to the
//!    dispatcher
//! 3. The bus is purely in-memory
//!
//! Nothing here is global; every context builds its own `EventSystem` and
//! passes handles to whoever needs them.

use desk_store::SharedStore;
use serde_json::json;

use crate::action::Action;
use crate::bus::SystemBus;
use crate::config::EventingConfig;
use crate::dispatcher::ActionDispatcher;
use crate::queue::CommandQueue;

/// The three eventing tiers of one context.
#[derive(Clone)]
pub struct EventSystem {
    store: SharedStore,
    config: EventingConfig,
    dispatcher: ActionDispatcher,
    queue: CommandQueue,
    bus: SystemBus,
}

impl EventSystem {
    /// Wire the components over `store`.
    pub fn new(store: SharedStore, config: EventingConfig) -> Self {
        let dispatcher = ActionDispatcher::new(store.clone(), &config);
        let queue = CommandQueue::with_reporter(store.clone(), &config, dispatcher.clone());
        Self {
            store,
            config,
            dispatcher,
            queue,
            bus: SystemBus::new(),
        }
    }

    /// Optionally reload action history, then record `boot_complete`.
    pub fn boot(&self, load_history: bool) -> Action {
        let restored = if load_history {
            self.dispatcher.load_from_storage()
        } else {
            0
        };
        tracing::info!(restored, "[dispatcher] event system booted");
        self.dispatcher.system(
            "boot_complete",
            json!({ "restoredActions": restored, "persistence": self.dispatcher.is_persistent() }),
        )
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn bus(&self) -> &SystemBus {
        &self.bus
    }

    /// The shared store, for collaborators that keep their own keys.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Whether `key` belongs to an eventing core and must not be written by
    /// other code.
    ///
    /// Covers the queue key and every key under the action log key, so the
    /// logs of other contexts (`desk.actions.desktop`) are protected too.
    pub fn is_reserved_key(&self, key: &str) -> bool {
        key == self.config.command_queue_key || key.starts_with(self.config.action_log_key.as_str())
    }
}
