//! Centralized defaults for the eventing core
//!
//! Capacities, intervals and store keys live here so they can be audited in
//! one place. Every value can be overridden through
//! [`EventingConfig`](crate::EventingConfig).

// =============================================================================
// Action Log
// =============================================================================

/// Number of actions kept in the in-memory ring (oldest evicted first).
pub const DEFAULT_ACTION_CAPACITY: usize = 500;

/// Store key holding the persisted action log.
pub const ACTION_LOG_KEY: &str = "desk.actions";

// =============================================================================
// Command Queue
// =============================================================================

/// Store key holding the persisted command queue snapshot.
pub const COMMAND_QUEUE_KEY: &str = "desk.command_queue";

/// Poll cadence for the consumer context: 4 drains per second.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Shortest accepted poll interval.
pub const MIN_POLL_INTERVAL_MS: u64 = 1;

/// Queue length at which an enqueue logs a backlog warning.
pub const DEFAULT_BACKLOG_WARN_THRESHOLD: usize = 1000;

/// Current queue snapshot layout version.
///
/// Version 0 is a bare JSON array of commands.
pub const QUEUE_SNAPSHOT_VERSION: u32 = 1;
