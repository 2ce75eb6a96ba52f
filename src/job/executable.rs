// src/job/executable.rs

use std::collections::BTreeMap;
use std::fmt;

/// What a task runs on its node. The executing collaborator interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Executable {
    Script { engine: String, script: String },
    Native { command: Vec<String> },
    Java { class: String, arguments: BTreeMap<String, String> },
}

impl Executable {
    pub fn kind(&self) -> &'static str {
        match self {
            Executable::Script { .. } => "script",
            Executable::Native { .. } => "native",
            Executable::Java { .. } => "java",
        }
    }

    /// Single-line rendering of a native command, each argument quoted.
    pub fn command_line(&self) -> Option<String> {
        match self {
            Executable::Native { command } => Some(
                command
                    .iter()
                    .map(|arg| format!("\"{}\"", arg.replace('"', "\\\"")))
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            _ => None,
        }
    }
}

impl fmt::Display for Executable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Executable::Script { engine, script } => {
                let first = script.lines().next().unwrap_or_default();
                write!(f, "{engine}: {first}")
            }
            Executable::Native { .. } => {
                write!(f, "native: {}", self.command_line().unwrap_or_default())
            }
            Executable::Java { class, .. } => write!(f, "java: {class}"),
        }
    }
}
