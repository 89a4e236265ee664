//! Administrator console
//!
//! Lines are read from stdin on a dedicated thread and handed to the
//! simulation loop through a channel; the loop parses and executes them
//! between steps.

use std::io::{self, BufRead};
use std::str::FromStr;
use std::thread;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::game::entity::{EntityId, TemplateId};
use crate::game::map::MapId;

/// Text printed by `help`
pub const HELP_TEXT: &str = "\
Commands:
  help                               Show this list
  quit                               Save and shut down
  info                               World summary
  pause | resume                     Stop or restart world updates
  stats                              Message statistics
  save                               Save every map now
  spawn <template> <map> <x> <y>     Spawn an entity from a template
  despawn <map> <entity>             Remove an entity
  snapshot <map>                     Dump a map's entities as JSON
  saved <map>                        Dump a map's stored entities as JSON";

/// A parsed console command
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Help,
    Quit,
    Info,
    Pause,
    Resume,
    Stats,
    Save,
    Spawn {
        template: TemplateId,
        map: MapId,
        x: f32,
        y: f32,
    },
    Despawn {
        map: MapId,
        entity: EntityId,
    },
    Snapshot {
        map: MapId,
    },
    Saved {
        map: MapId,
    },
}

/// Why a console line could not be parsed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command '{0}', try 'help'")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid {name}: '{value}'")]
    InvalidArgument { name: &'static str, value: String },
}

fn arg<T: FromStr>(
    parts: &[&str],
    index: usize,
    name: &'static str,
    usage: &'static str,
) -> Result<T, CommandParseError> {
    let value = parts.get(index).ok_or(CommandParseError::Usage(usage))?;
    value.parse().map_err(|_| CommandParseError::InvalidArgument {
        name,
        value: value.to_string(),
    })
}

impl FromStr for ConsoleCommand {
    type Err = CommandParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(name) = parts.first() else {
            return Err(CommandParseError::Empty);
        };

        let expect_args = |count: usize, usage: &'static str| {
            if parts.len() == count + 1 {
                Ok(())
            } else {
                Err(CommandParseError::Usage(usage))
            }
        };

        match name.to_lowercase().as_str() {
            "help" | "?" => Ok(ConsoleCommand::Help),
            "quit" | "exit" | "q" => Ok(ConsoleCommand::Quit),
            "info" => Ok(ConsoleCommand::Info),
            "pause" => Ok(ConsoleCommand::Pause),
            "resume" => Ok(ConsoleCommand::Resume),
            "stats" => Ok(ConsoleCommand::Stats),
            "save" => Ok(ConsoleCommand::Save),
            "spawn" => {
                const USAGE: &str = "spawn <template> <map> <x> <y>";
                expect_args(4, USAGE)?;
                Ok(ConsoleCommand::Spawn {
                    template: arg(&parts, 1, "template", USAGE)?,
                    map: arg(&parts, 2, "map", USAGE)?,
                    x: arg(&parts, 3, "x", USAGE)?,
                    y: arg(&parts, 4, "y", USAGE)?,
                })
            }
            "despawn" => {
                const USAGE: &str = "despawn <map> <entity>";
                expect_args(2, USAGE)?;
                Ok(ConsoleCommand::Despawn {
                    map: arg(&parts, 1, "map", USAGE)?,
                    entity: EntityId(arg(&parts, 2, "entity", USAGE)?),
                })
            }
            "snapshot" => {
                const USAGE: &str = "snapshot <map>";
                expect_args(1, USAGE)?;
                Ok(ConsoleCommand::Snapshot {
                    map: arg(&parts, 1, "map", USAGE)?,
                })
            }
            "saved" => {
                const USAGE: &str = "saved <map>";
                expect_args(1, USAGE)?;
                Ok(ConsoleCommand::Saved {
                    map: arg(&parts, 1, "map", USAGE)?,
                })
            }
            other => Err(CommandParseError::Unknown(other.to_string())),
        }
    }
}

/// Start the stdin reader thread. Non-empty lines are sent to `tx`; the
/// thread ends on EOF, a read error, or when the receiver is dropped.
pub fn spawn_console_reader(tx: mpsc::UnboundedSender<String>) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("console".into())
        .spawn(move || read_lines(io::stdin().lock(), tx))
}

/// Forward lines from any reader
pub fn read_lines<R: BufRead>(mut reader: R, tx: mpsc::UnboundedSender<String>) {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => {
                debug!("Console input closed");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Failed to read console input");
                break;
            }
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if tx.send(input.to_string()).is_err() {
            break;
        }
    }
}
