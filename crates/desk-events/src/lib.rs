//! Desktop eventing core
//!
//! Three tiers bridge the diagnostic console (producer context) and the main
//! desktop (consumer context), which share nothing but a persistent store:
//!
//! - **ActionDispatcher**: bounded, persisted audit log with synchronous fan-out
//! - **CommandQueue**: durable cross-context FIFO, drained by a fixed-interval poller
//! - **SystemBus**: ephemeral same-context publish/subscribe
//!
//! [`EventSystem`] wires the three over one store.
//!
//! # Callbacks
//!
//! Every subscription returns a [`Subscription`] handle. Callbacks run
//! synchronously, in registration order, with no component lock held, and
//! each one is panic-isolated from the others.

pub mod action;
pub mod bus;
pub mod command;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod queue;
pub mod system;

mod poller;
mod slot;
mod subscribers;

pub use action::{Action, ActionKind, NewAction};
pub use bus::{Event, SystemBus};
pub use command::{Command, CommandKind, NewCommand, QueueSnapshot};
pub use config::EventingConfig;
pub use dispatcher::ActionDispatcher;
pub use error::EventsError;
pub use queue::CommandQueue;
pub use subscribers::{Callback, Subscription};
pub use system::EventSystem;
