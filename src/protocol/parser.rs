//! Line Protocol Parser
//!
//! The parser works on the raw connection buffer and returns either:
//! - `None` - no complete line yet, wait for more data
//! - `Some((result, consumed))` - a full line was found; `consumed` bytes
//!   (line plus terminator) should be removed from the buffer, and `result`
//!   holds the parsed command or the reason it was rejected
//!
//! A rejected line is not fatal: the connection answers with an error and
//! carries on with the next line.

use crate::protocol::types::Command;
use thiserror::Error;

/// Reasons a request line is rejected before reaching the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    #[error("value is not an integer or out of range: {0}")]
    InvalidInteger(String),

    #[error("invalid UTF-8 in command")]
    InvalidUtf8,
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Extracts the next complete line from `buf` and parses it.
///
/// Lines end in `\n`; a preceding `\r` is stripped.
pub fn parse_message(buf: &[u8]) -> Option<(ParseResult<Command>, usize)> {
    let end = buf.iter().position(|&b| b == b'\n')?;
    let consumed = end + 1;

    let result = match std::str::from_utf8(&buf[..end]) {
        Ok(line) => parse_command(line),
        Err(_) => Err(ParseError::InvalidUtf8),
    };
    Some((result, consumed))
}

/// Parses a single request line into a [`Command`].
///
/// # Example
///
/// ```
/// use lapsekv::protocol::{parse_command, Command};
///
/// let cmd = parse_command("expire session 60").unwrap();
/// assert_eq!(cmd, Command::Expire { key: "session".to_string(), seconds: 60 });
/// ```
pub fn parse_command(line: &str) -> ParseResult<Command> {
    let mut tokens = line.split_whitespace();
    let name = tokens.next().ok_or(ParseError::Empty)?;
    let args: Vec<&str> = tokens.collect();

    let command = match name.to_ascii_uppercase().as_str() {
        "SET" => {
            let [key, value] = arity::<2>(&args, "set")?;
            Command::Set {
                key: key.to_string(),
                value: value.to_string(),
            }
        }
        "GET" => Command::Get {
            key: single(&args, "get")?,
        },
        "DEL" => Command::Del {
            key: single(&args, "del")?,
        },
        "EXPIRE" => {
            let [key, seconds] = arity::<2>(&args, "expire")?;
            Command::Expire {
                key: key.to_string(),
                seconds: seconds
                    .parse()
                    .map_err(|_| ParseError::InvalidInteger(seconds.to_string()))?,
            }
        }
        "TTL" => Command::Ttl {
            key: single(&args, "ttl")?,
        },
        "PERSIST" => Command::Persist {
            key: single(&args, "persist")?,
        },
        "KEYS" => Command::Keys {
            pattern: single(&args, "keys")?,
        },
        "EXISTS" => Command::Exists {
            key: single(&args, "exists")?,
        },
        "DBSIZE" => {
            arity::<0>(&args, "dbsize")?;
            Command::DbSize
        }
        "PING" => match args.as_slice() {
            [] => Command::Ping { message: None },
            [message] => Command::Ping {
                message: Some(message.to_string()),
            },
            _ => return Err(ParseError::WrongArity("ping")),
        },
        "QUIT" => {
            arity::<0>(&args, "quit")?;
            Command::Quit
        }
        _ => return Err(ParseError::UnknownCommand(name.to_string())),
    };

    Ok(command)
}

fn arity<'a, const N: usize>(
    args: &[&'a str],
    command: &'static str,
) -> ParseResult<[&'a str; N]> {
    <[&'a str; N]>::try_from(args).map_err(|_| ParseError::WrongArity(command))
}

fn single(args: &[&str], command: &'static str) -> ParseResult<String> {
    let [arg] = arity::<1>(args, command)?;
    Ok(arg.to_string())
}
