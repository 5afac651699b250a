//! Command records and the persisted queue snapshot.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::QUEUE_SNAPSHOT_VERSION;

/// Command catalogue. Closed set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    Reboot,
    Shutdown,
    Crash,
    Bugcheck,
    Lockdown,
    Recovery,
    WriteStorage,
    DeleteStorage,
    Toast,
    Wipe,
}

impl CommandKind {
    /// All commands, in catalogue order.
    pub const ALL: [CommandKind; 10] = [
        CommandKind::Reboot,
        CommandKind::Shutdown,
        CommandKind::Crash,
        CommandKind::Bugcheck,
        CommandKind::Lockdown,
        CommandKind::Recovery,
        CommandKind::WriteStorage,
        CommandKind::DeleteStorage,
        CommandKind::Toast,
        CommandKind::Wipe,
    ];

    /// Upper-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Reboot => "REBOOT",
            CommandKind::Shutdown => "SHUTDOWN",
            CommandKind::Crash => "CRASH",
            CommandKind::Bugcheck => "BUGCHECK",
            CommandKind::Lockdown => "LOCKDOWN",
            CommandKind::Recovery => "RECOVERY",
            CommandKind::WriteStorage => "WRITE_STORAGE",
            CommandKind::DeleteStorage => "DELETE_STORAGE",
            CommandKind::Toast => "TOAST",
            CommandKind::Wipe => "WIPE",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = String;

    /// Case-insensitive; `-` is accepted in place of `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_");
        CommandKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| format!("unknown command type: {}", s))
    }
}

/// A durable instruction addressed to the consumer context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// Unique and monotonic across every producer sharing the store
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: CommandKind,
    #[serde(default)]
    pub payload: Value,
    /// Free-text producer tag, e.g. `console`
    #[serde(default)]
    pub source: String,
    /// Wall-clock milliseconds at enqueue
    pub enqueued_at: u64,
}

/// A command before the queue assigns `id` and `enqueued_at`.
#[derive(Clone, Debug, PartialEq)]
pub struct NewCommand {
    pub kind: CommandKind,
    pub payload: Value,
    pub source: String,
}

impl NewCommand {
    /// Command with `null` payload.
    pub fn new(kind: CommandKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            payload: Value::Null,
            source: source.into(),
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Persisted layout of the command queue.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    /// Version for migration support
    pub version: u32,
    /// Next command ID to assign
    #[serde(default)]
    pub next_id: u64,
    /// Pending commands, head first
    #[serde(default)]
    pub commands: VecDeque<Command>,
}

/// Either layout the queue key may hold.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredQueue {
    Snapshot(QueueSnapshot),
    /// Version 0: bare array of commands
    Legacy(VecDeque<Command>),
}

impl QueueSnapshot {
    /// Current snapshot version
    pub const CURRENT_VERSION: u32 = QUEUE_SNAPSHOT_VERSION;

    /// Empty snapshot whose first command gets `next_id`.
    pub fn new(next_id: u64) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            next_id,
            commands: VecDeque::new(),
        }
    }

    /// Parse stored queue text, migrating older layouts.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        let mut snapshot = match serde_json::from_str::<StoredQueue>(raw)? {
            StoredQueue::Snapshot(snapshot) => snapshot,
            StoredQueue::Legacy(commands) => Self {
                version: 0,
                next_id: 0,
                commands,
            },
        };
        if snapshot.needs_migration() {
            snapshot.migrate();
        }
        Ok(snapshot)
    }

    /// Check if snapshot needs migration
    pub fn needs_migration(&self) -> bool {
        self.version < Self::CURRENT_VERSION
    }

    /// Migrate snapshot to current version
    pub fn migrate(&mut self) {
        tracing::info!(
            from = self.version,
            to = Self::CURRENT_VERSION,
            pending = self.commands.len(),
            "[queue] migrating stored queue layout"
        );
        // v0 -> v1: the id counter was implicit in the commands
        self.next_id = self.next_id.max(self.max_id().map_or(0, |id| id + 1));
        self.version = Self::CURRENT_VERSION;
    }

    fn max_id(&self) -> Option<u64> {
        self.commands.iter().map(|c| c.id).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&CommandKind::WriteStorage).unwrap(),
            "\"WRITE_STORAGE\""
        );
        let kind: CommandKind = serde_json::from_str("\"BUGCHECK\"").unwrap();
        assert_eq!(kind, CommandKind::Bugcheck);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("reboot".parse::<CommandKind>(), Ok(CommandKind::Reboot));
        assert_eq!("delete-storage".parse::<CommandKind>(), Ok(CommandKind::DeleteStorage));
        assert!("explode".parse::<CommandKind>().is_err());
    }

    #[test]
    fn test_command_field_names() {
        let command = Command {
            id: 9,
            kind: CommandKind::Toast,
            payload: json!({"text": "hi"}),
            source: "console".to_string(),
            enqueued_at: 42,
        };
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["type"], "TOAST");
        assert_eq!(value["enqueuedAt"], 42);
        assert_eq!(value["source"], "console");
    }

    #[test]
    fn test_snapshot_creation() {
        let snapshot = QueueSnapshot::new(5);
        assert_eq!(snapshot.version, QueueSnapshot::CURRENT_VERSION);
        assert_eq!(snapshot.next_id, 5);
        assert!(snapshot.commands.is_empty());
        assert!(!snapshot.needs_migration());
    }

    #[test]
    fn test_decode_current_layout() {
        let raw = r#"{"version":1,"nextId":8,"commands":[
            {"id":7,"type":"CRASH","payload":null,"source":"console","enqueuedAt":1}
        ]}"#;
        let snapshot = QueueSnapshot::decode(raw).unwrap();
        assert_eq!(snapshot.next_id, 8);
        assert_eq!(snapshot.commands[0].kind, CommandKind::Crash);
    }

    #[test]
    fn test_decode_legacy_array_migrates() {
        let raw = r#"[
            {"id":3,"type":"REBOOT","enqueuedAt":10},
            {"id":4,"type":"WIPE","payload":{"confirm":true},"source":"console","enqueuedAt":11}
        ]"#;
        let snapshot = QueueSnapshot::decode(raw).unwrap();
        assert_eq!(snapshot.version, QueueSnapshot::CURRENT_VERSION);
        assert_eq!(snapshot.next_id, 5);
        assert_eq!(snapshot.commands.len(), 2);
        assert_eq!(snapshot.commands[0].source, "");
    }

    #[test]
    fn test_decode_rejects_other_shapes() {
        assert!(QueueSnapshot::decode("{not json").is_err());
        assert!(QueueSnapshot::decode("42").is_err());
        assert!(QueueSnapshot::decode(r#"[{"id":1,"type":"DANCE","enqueuedAt":0}]"#).is_err());
    }

    #[test]
    fn test_migrate_keeps_larger_counter() {
        let mut snapshot = QueueSnapshot {
            version: 0,
            next_id: 100,
            commands: VecDeque::new(),
        };
        snapshot.migrate();
        assert_eq!(snapshot.next_id, 100);
    }
}
