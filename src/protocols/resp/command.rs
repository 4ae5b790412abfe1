//! Inline command parsing.
//!
//! A request is a single line of whitespace-separated arguments, e.g.
//! `SET greeting hello world\r\n`. Each socket read is treated as exactly
//! one line: commands split across reads are not reassembled, and several
//! commands arriving in one read are parsed as a single command.

use bytes::Bytes;
use std::fmt;

/// Parsed commands
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping,
    Set { key: Bytes, value: Bytes },
    Get { key: Bytes },
    Del { keys: Vec<Bytes> },
}

/// Protocol errors, reported to the client as `-ERR ...` replies
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    /// The line held no arguments
    Empty,
    /// Command name not recognized (upper-cased)
    UnknownCommand(String),
    /// Wrong argument count for a known command
    WrongArity(&'static str),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Empty => write!(f, "ERR empty command"),
            CommandError::UnknownCommand(name) => write!(f, "ERR unknown command '{}'", name),
            CommandError::WrongArity(cmd) => {
                write!(f, "ERR wrong number of arguments for '{}' command", cmd)
            }
        }
    }
}

impl std::error::Error for CommandError {}

/// Strip trailing carriage returns and newlines
pub fn trim_line_end(buf: &[u8]) -> &[u8] {
    let end = buf
        .iter()
        .rposition(|&b| b != b'\r' && b != b'\n')
        .map_or(0, |pos| pos + 1);
    &buf[..end]
}

/// Split a line on ASCII whitespace without copying
pub fn tokenize(line: &Bytes) -> Vec<Bytes> {
    let mut tokens = Vec::new();
    let mut start = None;

    for (i, b) in line.iter().enumerate() {
        match (b.is_ascii_whitespace(), start) {
            (true, Some(s)) => {
                tokens.push(line.slice(s..i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }

    if let Some(s) = start {
        tokens.push(line.slice(s..));
    }

    tokens
}

impl Command {
    /// Parse a command from a line with the terminator already removed
    pub fn parse(line: Bytes) -> Result<Command, CommandError> {
        let args = tokenize(&line);

        let Some(first) = args.first() else {
            return Err(CommandError::Empty);
        };
        let name = String::from_utf8_lossy(first).to_ascii_uppercase();

        match name.as_str() {
            "PING" => Ok(Command::Ping),

            "SET" => {
                if args.len() < 3 {
                    return Err(CommandError::WrongArity("set"));
                }
                // Values may contain spaces; rejoin everything after the key
                let value = if args.len() == 3 {
                    args[2].clone()
                } else {
                    Bytes::from(args[2..].join(&b' '))
                };
                Ok(Command::Set {
                    key: args[1].clone(),
                    value,
                })
            }

            "GET" => {
                if args.len() != 2 {
                    return Err(CommandError::WrongArity("get"));
                }
                Ok(Command::Get {
                    key: args[1].clone(),
                })
            }

            "DEL" => {
                if args.len() < 2 {
                    return Err(CommandError::WrongArity("del"));
                }
                Ok(Command::Del {
                    keys: args[1..].to_vec(),
                })
            }

            _ => Err(CommandError::UnknownCommand(name)),
        }
    }
}
