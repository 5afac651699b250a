//! Console Command Parsing
//!
//! Type-safe representation of a console input line.

use desk_events::CommandKind;
use serde_json::Value;

/// Number of actions `log` shows when no count is given.
pub const DEFAULT_LOG_COUNT: usize = 10;

/// Parsed console command.
#[derive(Clone, Debug, PartialEq)]
pub enum ConsoleCommand {
    /// Display help information
    Help,

    /// Send a command to the desktop
    Queue { kind: CommandKind, payload: Value },

    /// List commands the desktop has not drained yet
    Pending,

    /// Read a store key
    Get { key: String },

    /// Write a store key
    Set { key: String, value: String },

    /// Remove a store key
    Del { key: String },

    /// List store keys
    Ls { prefix: Option<String> },

    /// Ask the desktop to wipe itself
    Wipe,

    /// Show the newest actions
    Log { count: usize },

    /// Clear the action log
    ClearLog,

    /// Leave the console
    Exit,

    /// Unrecognized command
    Unknown { cmd: String },
}

/// Error returned when parsing a command fails.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Command requires an argument that was not provided
    #[error("{command}: missing argument <{argument}>")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    /// Argument could not be parsed as expected type
    #[error("invalid {argument}: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: &'static str,
    },
}

/// Split off the first whitespace-delimited word; the rest keeps its inner
/// spacing.
fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(end) => (&input[..end], input[end..].trim()),
        None => (input, ""),
    }
}

fn required<'a>(word: &'a str, command: &'static str, argument: &'static str) -> Result<&'a str, ParseError> {
    if word.is_empty() {
        Err(ParseError::MissingArgument { command, argument })
    } else {
        Ok(word)
    }
}

impl ConsoleCommand {
    /// Parse a console line into a ConsoleCommand.
    ///
    /// `queue` and `set` take the remainder of the line verbatim, so JSON
    /// payloads and values may contain spaces.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let (cmd, rest) = split_word(line);

        match cmd {
            "" => Ok(ConsoleCommand::Unknown { cmd: String::new() }),
            "help" | "?" => Ok(ConsoleCommand::Help),

            "queue" | "send" => {
                let (kind, payload) = split_word(rest);
                let kind = required(kind, "queue", "TYPE")?
                    .parse::<CommandKind>()
                    .map_err(|_| ParseError::InvalidArgument {
                        argument: "TYPE",
                        reason: "not a known command type",
                    })?;
                let payload = if payload.is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(payload).map_err(|_| ParseError::InvalidArgument {
                        argument: "payload",
                        reason: "must be valid JSON",
                    })?
                };
                Ok(ConsoleCommand::Queue { kind, payload })
            }

            "pending" => Ok(ConsoleCommand::Pending),

            "get" => {
                let (key, _) = split_word(rest);
                Ok(ConsoleCommand::Get {
                    key: required(key, "get", "key")?.to_string(),
                })
            }

            "set" => {
                let (key, value) = split_word(rest);
                let key = required(key, "set", "key")?.to_string();
                let value = required(value, "set", "value")?.to_string();
                Ok(ConsoleCommand::Set { key, value })
            }

            "del" | "rm" => {
                let (key, _) = split_word(rest);
                Ok(ConsoleCommand::Del {
                    key: required(key, "del", "key")?.to_string(),
                })
            }

            "ls" => {
                let (prefix, _) = split_word(rest);
                Ok(ConsoleCommand::Ls {
                    prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
                })
            }

            "wipe" => Ok(ConsoleCommand::Wipe),

            "log" => {
                let (count, _) = split_word(rest);
                if count.is_empty() {
                    Ok(ConsoleCommand::Log {
                        count: DEFAULT_LOG_COUNT,
                    })
                } else {
                    count
                        .parse::<usize>()
                        .map(|count| ConsoleCommand::Log { count })
                        .map_err(|_| ParseError::InvalidArgument {
                            argument: "n",
                            reason: "must be a number",
                        })
                }
            }

            "clear-log" => Ok(ConsoleCommand::ClearLog),
            "exit" | "quit" => Ok(ConsoleCommand::Exit),

            _ => Ok(ConsoleCommand::Unknown {
                cmd: cmd.to_string(),
            }),
        }
    }

    /// Verb recorded in the action log for this command.
    pub fn name(&self) -> &'static str {
        match self {
            ConsoleCommand::Help => "help",
            ConsoleCommand::Queue { .. } => "queue",
            ConsoleCommand::Pending => "pending",
            ConsoleCommand::Get { .. } => "get",
            ConsoleCommand::Set { .. } => "set",
            ConsoleCommand::Del { .. } => "del",
            ConsoleCommand::Ls { .. } => "ls",
            ConsoleCommand::Wipe => "wipe",
            ConsoleCommand::Log { .. } => "log",
            ConsoleCommand::ClearLog => "clear-log",
            ConsoleCommand::Exit => "exit",
            ConsoleCommand::Unknown { .. } => "unknown",
        }
    }

    /// Get a user-friendly usage message for this command.
    pub fn usage(&self) -> &'static str {
        match self {
            ConsoleCommand::Help => "help - Display available commands",
            ConsoleCommand::Queue { .. } => "queue <TYPE> [json] - Send a command to the desktop",
            ConsoleCommand::Pending => "pending - List commands not yet drained",
            ConsoleCommand::Get { .. } => "get <key> - Read a store key",
            ConsoleCommand::Set { .. } => "set <key> <value> - Write a store key",
            ConsoleCommand::Del { .. } => "del <key> - Remove a store key",
            ConsoleCommand::Ls { .. } => "ls [prefix] - List store keys",
            ConsoleCommand::Wipe => "wipe - Ask the desktop to wipe itself",
            ConsoleCommand::Log { .. } => "log [n] - Show the newest n actions",
            ConsoleCommand::ClearLog => "clear-log - Clear the action log",
            ConsoleCommand::Exit => "exit - Leave the console",
            ConsoleCommand::Unknown { .. } => "Unknown command",
        }
    }

    /// One instance of every command, in help order.
    pub fn catalogue() -> Vec<ConsoleCommand> {
        vec![
            ConsoleCommand::Help,
            ConsoleCommand::Queue {
                kind: CommandKind::Toast,
                payload: Value::Null,
            },
            ConsoleCommand::Pending,
            ConsoleCommand::Get { key: String::new() },
            ConsoleCommand::Set {
                key: String::new(),
                value: String::new(),
            },
            ConsoleCommand::Del { key: String::new() },
            ConsoleCommand::Ls { prefix: None },
            ConsoleCommand::Wipe,
            ConsoleCommand::Log {
                count: DEFAULT_LOG_COUNT,
            },
            ConsoleCommand::ClearLog,
            ConsoleCommand::Exit,
        ]
    }
}
