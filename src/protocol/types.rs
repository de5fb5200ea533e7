//! Line Protocol Data Types
//!
//! A request is one line of whitespace-separated tokens. The first token
//! names the command (case-insensitive), the rest are positional arguments.
//!
//! A response is one line, in one of these shapes:
//!
//! | Response | Wire form |
//! |----------|-----------|
//! | Success | `OK` |
//! | Integer | `42` |
//! | Missing value | `nil` |
//! | Value | the raw value |
//! | Key list | keys separated by single spaces (empty line if none) |
//! | Error | `ERR: <message>` |
//! | Failed boolean operation | `ERR operation failed` |
//!
//! Every line is terminated with CRLF on the wire.

use std::fmt;

/// The CRLF terminator appended to every response line
pub const CRLF: &[u8] = b"\r\n";

/// A parsed client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set { key: String, value: String },
    Get { key: String },
    Del { key: String },
    Expire { key: String, seconds: i64 },
    Ttl { key: String },
    Persist { key: String },
    Keys { pattern: String },
    Exists { key: String },
    DbSize,
    Ping { message: Option<String> },
    Quit,
}

impl Command {
    /// The canonical upper-case command name.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Set { .. } => "SET",
            Command::Get { .. } => "GET",
            Command::Del { .. } => "DEL",
            Command::Expire { .. } => "EXPIRE",
            Command::Ttl { .. } => "TTL",
            Command::Persist { .. } => "PERSIST",
            Command::Keys { .. } => "KEYS",
            Command::Exists { .. } => "EXISTS",
            Command::DbSize => "DBSIZE",
            Command::Ping { .. } => "PING",
            Command::Quit => "QUIT",
        }
    }
}

/// A response sent back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok,
    Integer(i64),
    Nil,
    Value(String),
    Keys(Vec<String>),
    Error(String),
    /// A boolean operation returned false
    Failed,
}

impl Response {
    /// Creates a new error response.
    ///
    /// # Example
    /// ```
    /// use lapsekv::protocol::Response;
    /// let err = Response::error("unknown command: FOO");
    /// assert_eq!(err.to_string(), "ERR: unknown command: FOO");
    /// ```
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error(message.into())
    }

    pub fn value(value: impl Into<String>) -> Self {
        Response::Value(value.into())
    }

    /// Serializes the response to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the response into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.to_string().as_bytes());
        buf.extend_from_slice(CRLF);
    }

    /// Returns true if this response reports a failure.
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_) | Response::Failed)
    }
}

impl From<bool> for Response {
    fn from(ok: bool) -> Self {
        if ok {
            Response::Ok
        } else {
            Response::Failed
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok => write!(f, "OK"),
            Response::Integer(n) => write!(f, "{}", n),
            Response::Nil => write!(f, "nil"),
            Response::Value(v) => write!(f, "{}", v),
            Response::Keys(keys) => write!(f, "{}", keys.join(" ")),
            Response::Error(msg) => write!(f, "ERR: {}", msg),
            Response::Failed => write!(f, "ERR operation failed"),
        }
    }
}
