//! Diagnostic console for the desktop eventing core
//!
//! Terminal-style commands for the operator context. Commands for the desktop
//! go through the shared queue; the store and the action log can be read and
//! edited from here.

pub mod command;
pub mod exec;

pub use command::{ConsoleCommand, ParseError};
pub use exec::{format_action, format_command, Console, ConsoleError, Reply, CONSOLE_SOURCE};
