//! Console command execution against an [`EventSystem`].
//!
//! The console is the producer context. Every command it runs is recorded as
//! a USER action, whether or not it succeeded.

use desk_events::{Action, ActionKind, Command, CommandKind, EventSystem, EventsError, NewCommand};
use desk_store::{keys_with_prefix, PersistentStore, StoreError};
use serde_json::{json, Value};

use crate::command::{ConsoleCommand, ParseError};

/// Source tag stamped on commands the console enqueues.
pub const CONSOLE_SOURCE: &str = "console";

/// Errors from running a console line.
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Events(#[from] EventsError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The key belongs to the eventing core.
    #[error("`{key}` is owned by the eventing core; use queue/log commands instead")]
    ReservedKey { key: String },

    #[error("unknown command `{cmd}` (try `help`)")]
    UnknownCommand { cmd: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the caller should do after a command ran.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// Print this text (may be empty)
    Text(String),
    /// Leave the console
    Exit,
}

/// Console bound to one context's event system.
pub struct Console {
    system: EventSystem,
}

impl Console {
    pub fn new(system: EventSystem) -> Self {
        Self { system }
    }

    pub fn system(&self) -> &EventSystem {
        &self.system
    }

    /// Parse and run one input line, recording it as a USER action.
    ///
    /// Blank lines do nothing and are not recorded.
    pub fn run_line(&self, line: &str) -> Result<Reply, ConsoleError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Reply::Text(String::new()));
        }

        let command = ConsoleCommand::parse(line)?;
        let result = self.execute(&command);
        self.system.dispatcher().user(
            command.name(),
            json!({ "line": line, "ok": result.is_ok() }),
        );
        result
    }

    /// Run an already parsed command.
    pub fn execute(&self, command: &ConsoleCommand) -> Result<Reply, ConsoleError> {
        let text = match command {
            ConsoleCommand::Help => help_text(),

            ConsoleCommand::Queue { kind, payload } => {
                let sent = self.system.queue().enqueue(
                    NewCommand::new(*kind, CONSOLE_SOURCE).with_payload(payload.clone()),
                )?;
                format!("queued {} as #{}", sent.kind, sent.id)
            }

            ConsoleCommand::Pending => {
                let pending = self.system.queue().pending()?;
                if pending.is_empty() {
                    "no pending commands".to_string()
                } else {
                    pending.iter().map(format_command).collect::<Vec<_>>().join("\n")
                }
            }

            ConsoleCommand::Get { key } => {
                self.check_key(key)?;
                match self.system.store().get(key)? {
                    Some(value) => value,
                    None => format!("{}: not set", key),
                }
            }

            ConsoleCommand::Set { key, value } => {
                self.check_key(key)?;
                self.system.store().set(key, value)?;
                self.system
                    .dispatcher()
                    .file("store_write", json!({ "key": key, "bytes": value.len() }));
                format!("{} = {}", key, value)
            }

            ConsoleCommand::Del { key } => {
                self.check_key(key)?;
                self.system.store().remove(key)?;
                self.system.dispatcher().file("store_delete", json!({ "key": key }));
                format!("{} removed", key)
            }

            ConsoleCommand::Ls { prefix } => {
                let keys = keys_with_prefix(self.system.store().as_ref(), prefix.as_deref().unwrap_or(""))?;
                if keys.is_empty() {
                    "no keys".to_string()
                } else {
                    keys.join("\n")
                }
            }

            ConsoleCommand::Wipe => {
                let sent = self
                    .system
                    .queue()
                    .enqueue(NewCommand::new(CommandKind::Wipe, CONSOLE_SOURCE))?;
                self.system
                    .dispatcher()
                    .security("wipe_requested", json!({ "command": sent.id }));
                format!("wipe requested as #{}", sent.id)
            }

            ConsoleCommand::Log { count } => {
                let actions = self.system.dispatcher().recent(*count);
                if actions.is_empty() {
                    "log is empty".to_string()
                } else {
                    actions.iter().map(format_action).collect::<Vec<_>>().join("\n")
                }
            }

            ConsoleCommand::ClearLog => {
                self.system.dispatcher().clear_storage()?;
                "action log cleared".to_string()
            }

            ConsoleCommand::Exit => return Ok(Reply::Exit),

            ConsoleCommand::Unknown { cmd } => {
                return Err(ConsoleError::UnknownCommand { cmd: cmd.clone() })
            }
        };
        Ok(Reply::Text(text))
    }

    fn check_key(&self, key: &str) -> Result<(), ConsoleError> {
        if self.system.is_reserved_key(key) {
            tracing::warn!(key, "[console] refused access to reserved key");
            self.system
                .dispatcher()
                .security("reserved_key_refused", json!({ "key": key }));
            return Err(ConsoleError::ReservedKey { key: key.to_string() });
        }
        Ok(())
    }
}

fn help_text() -> String {
    let mut text = String::from("Commands:");
    for command in ConsoleCommand::catalogue() {
        text.push_str("\n  ");
        text.push_str(command.usage());
    }
    text
}

fn format_payload(payload: &Value) -> String {
    match payload {
        Value::Null => String::new(),
        other => format!(" {}", other),
    }
}

/// One line per command: `#id TYPE payload (source)`.
pub fn format_command(command: &Command) -> String {
    format!(
        "#{} {}{} ({})",
        command.id,
        command.kind,
        format_payload(&command.payload),
        command.source
    )
}

/// One line per action: `#id TYPE action details`.
pub fn format_action(action: &Action) -> String {
    let marker = if action.kind == ActionKind::Error { "!" } else { " " };
    format!(
        "{}#{} {} {}{}",
        marker,
        action.id,
        action.kind,
        action.action,
        format_payload(&action.details)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use desk_events::EventingConfig;
    use desk_store::MemoryStore;
    use std::sync::Arc;

    fn setup() -> (Arc<MemoryStore>, Console) {
        let store = Arc::new(MemoryStore::new());
        let system = EventSystem::new(store.clone(), EventingConfig::default());
        (store, Console::new(system))
    }

    fn text(reply: Reply) -> String {
        match reply {
            Reply::Text(text) => text,
            Reply::Exit => panic!("unexpected exit"),
        }
    }

    #[test]
    fn test_queue_enqueues_with_console_source() {
        let (_store, console) = setup();
        let out = text(console.run_line(r#"queue toast {"text":"hi"}"#).unwrap());
        assert_eq!(out, "queued TOAST as #0");

        let pending = console.system().queue().pending().unwrap();
        assert_eq!(pending[0].source, CONSOLE_SOURCE);
        assert_eq!(pending[0].payload["text"], "hi");
    }

    #[test]
    fn test_pending_does_not_consume() {
        let (_store, console) = setup();
        console.run_line("queue reboot").unwrap();
        let out = text(console.run_line("pending").unwrap());
        assert_eq!(out, "#0 REBOOT (console)");
        assert_eq!(console.system().queue().len().unwrap(), 1);
    }

    #[test]
    fn test_store_commands() {
        let (store, console) = setup();
        console.run_line("set user.theme dark").unwrap();
        assert_eq!(store.get("user.theme").unwrap().as_deref(), Some("dark"));
        assert_eq!(text(console.run_line("get user.theme").unwrap()), "dark");

        let listing = text(console.run_line("ls user.").unwrap());
        assert_eq!(listing, "user.theme");

        console.run_line("del user.theme").unwrap();
        assert_eq!(text(console.run_line("get user.theme").unwrap()), "user.theme: not set");
    }

    #[test]
    fn test_reserved_keys_are_refused() {
        let (store, console) = setup();
        console.run_line("queue crash").unwrap();
        let before = store.get("desk.command_queue").unwrap();

        for line in [
            "get desk.command_queue",
            "set desk.command_queue []",
            "del desk.actions",
            "set desk.actions.desktop []",
        ] {
            let err = console.run_line(line).unwrap_err();
            assert!(matches!(err, ConsoleError::ReservedKey { .. }), "{}", line);
        }
        assert_eq!(store.get("desk.command_queue").unwrap(), before);
        assert_eq!(
            console.system().dispatcher().by_kind(ActionKind::Security).len(),
            4
        );
    }

    #[test]
    fn test_every_command_is_recorded_as_user_action() {
        let (_store, console) = setup();
        console.run_line("help").unwrap();
        console.run_line("queue shutdown").unwrap();
        let _ = console.run_line("bogus");

        let users = console.system().dispatcher().by_kind(ActionKind::User);
        let names: Vec<&str> = users.iter().map(|a| a.action.as_str()).collect();
        assert_eq!(names, vec!["help", "queue", "unknown"]);
        assert_eq!(users[2].details["ok"], false);
    }

    #[test]
    fn test_parse_errors_are_returned() {
        let (_store, console) = setup();
        let err = console.run_line("queue").unwrap_err();
        assert!(matches!(err, ConsoleError::Parse(_)));
        assert!(console.system().dispatcher().is_empty());
    }

    #[test]
    fn test_wipe_enqueues_and_records_security_action() {
        let (_store, console) = setup();
        let out = text(console.run_line("wipe").unwrap());
        assert_eq!(out, "wipe requested as #0");

        assert_eq!(
            console.system().queue().peek().unwrap().unwrap().kind,
            CommandKind::Wipe
        );
        let security = console.system().dispatcher().by_kind(ActionKind::Security);
        assert_eq!(security[0].action, "wipe_requested");
    }

    #[test]
    fn test_log_and_clear_log() {
        let (_store, console) = setup();
        console.system().dispatcher().system("boot_complete", Value::Null);
        console.system().dispatcher().error("crash", json!({"code": 7}));

        let out = text(console.run_line("log 2").unwrap());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines, vec![r#"!#1 ERROR crash {"code":7}"#, " #0 SYSTEM boot_complete"]);

        console.run_line("clear-log").unwrap();
        let remaining = console.system().dispatcher().actions();
        assert_eq!(remaining.len(), 1, "only the clear-log record itself");
        assert_eq!(remaining[0].action, "clear-log");
    }

    #[test]
    fn test_exit_and_blank_lines() {
        let (_store, console) = setup();
        assert_eq!(console.run_line("exit").unwrap(), Reply::Exit);
        assert_eq!(console.run_line("   ").unwrap(), Reply::Text(String::new()));
    }

    #[test]
    fn test_help_lists_commands() {
        let (_store, console) = setup();
        let out = text(console.run_line("help").unwrap());
        assert!(out.starts_with("Commands:"));
        assert!(out.contains("queue <TYPE> [json]"));
        assert!(out.contains("clear-log"));
    }
}
