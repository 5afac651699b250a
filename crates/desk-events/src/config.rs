//! Eventing configuration
//!
//! Defaults come from [`constants`](crate::constants). A config can be
//! deserialized (every field optional) or built from `DESK_*` environment
//! variables layered over the defaults.
//!
//! # Environment Variables
//!
//! - `DESK_ACTION_CAPACITY`: action ring size
//! - `DESK_PERSIST_ACTIONS`: persist the action log (`true`/`false`)
//! - `DESK_POLL_INTERVAL_MS`: command poll interval
//! - `DESK_BACKLOG_WARN`: queue length that triggers a backlog warning
//! - `DESK_ACTION_LOG_KEY`: store key of the action log
//! - `DESK_COMMAND_QUEUE_KEY`: store key of the command queue

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::constants::{
    ACTION_LOG_KEY, COMMAND_QUEUE_KEY, DEFAULT_ACTION_CAPACITY, DEFAULT_BACKLOG_WARN_THRESHOLD,
    DEFAULT_POLL_INTERVAL_MS, MIN_POLL_INTERVAL_MS,
};

/// Configuration shared by the three eventing components.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EventingConfig {
    /// Maximum number of actions kept in memory
    pub action_capacity: usize,
    /// Whether dispatched actions are written to the store
    pub persist_actions: bool,
    /// Command queue poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Queue length at which enqueue warns about a missing consumer
    pub backlog_warn_threshold: usize,
    /// Store key of the action log
    pub action_log_key: String,
    /// Store key of the command queue
    pub command_queue_key: String,
}

impl Default for EventingConfig {
    fn default() -> Self {
        Self {
            action_capacity: DEFAULT_ACTION_CAPACITY,
            persist_actions: true,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            backlog_warn_threshold: DEFAULT_BACKLOG_WARN_THRESHOLD,
            action_log_key: ACTION_LOG_KEY.to_string(),
            command_queue_key: COMMAND_QUEUE_KEY.to_string(),
        }
    }
}

impl EventingConfig {
    /// Defaults overridden by `DESK_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `DESK_*` name.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        override_parsed(&lookup, "DESK_ACTION_CAPACITY", &mut config.action_capacity);
        override_parsed(&lookup, "DESK_PERSIST_ACTIONS", &mut config.persist_actions);
        override_parsed(&lookup, "DESK_POLL_INTERVAL_MS", &mut config.poll_interval_ms);
        override_parsed(&lookup, "DESK_BACKLOG_WARN", &mut config.backlog_warn_threshold);
        if let Some(key) = lookup("DESK_ACTION_LOG_KEY").filter(|k| !k.is_empty()) {
            config.action_log_key = key;
        }
        if let Some(key) = lookup("DESK_COMMAND_QUEUE_KEY").filter(|k| !k.is_empty()) {
            config.command_queue_key = key;
        }
        config
    }

    /// Poll interval, clamped to the minimum the poller accepts.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    /// Ring capacity, never below one entry.
    pub fn action_capacity(&self) -> usize {
        self.action_capacity.max(1)
    }
}

fn override_parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, slot: &mut T) {
    if let Some(raw) = lookup(name) {
        match raw.trim().parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!(variable = name, value = %raw, "[config] ignoring unparsable value"),
        }
    }
}
