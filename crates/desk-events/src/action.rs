//! Action records for the audit log.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Action category. Closed set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    /// Boot, shutdown, polling lifecycle
    System,
    /// Something an operator or desktop user did
    User,
    /// Application lifecycle
    App,
    /// File explorer / storage activity
    File,
    /// Failures reported by any component
    Error,
    /// Lockdowns, permission changes, wipes
    Security,
}

impl ActionKind {
    /// All categories, in catalogue order.
    pub const ALL: [ActionKind; 6] = [
        ActionKind::System,
        ActionKind::User,
        ActionKind::App,
        ActionKind::File,
        ActionKind::Error,
        ActionKind::Security,
    ];

    /// Upper-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::System => "SYSTEM",
            ActionKind::User => "USER",
            ActionKind::App => "APP",
            ActionKind::File => "FILE",
            ActionKind::Error => "ERROR",
            ActionKind::Security => "SECURITY",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown action category: {}", s))
    }
}

/// An immutable audit-log record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Unique, monotonic within the process lifetime
    pub id: u64,
    /// Category
    #[serde(rename = "type")]
    pub kind: ActionKind,
    /// Free-text verb, e.g. `boot_complete`
    pub action: String,
    /// Opaque payload
    #[serde(default)]
    pub details: Value,
    /// Wall-clock milliseconds at append
    pub created_at: u64,
    /// Whether the action reached the store when it was appended
    #[serde(default)]
    pub persisted: bool,
}

/// An action before the dispatcher assigns `id` and `created_at`.
#[derive(Clone, Debug, PartialEq)]
pub struct NewAction {
    /// Category
    pub kind: ActionKind,
    /// Free-text verb
    pub action: String,
    /// Opaque payload
    pub details: Value,
}

impl NewAction {
    /// Create an action with `null` details.
    pub fn new(kind: ActionKind, action: impl Into<String>) -> Self {
        Self {
            kind,
            action: action.into(),
            details: Value::Null,
        }
    }

    /// Attach a payload.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}
