//! Line Protocol Implementation
//!
//! This module implements the text protocol LapseKV speaks over TCP.
//!
//! ## Overview
//!
//! Each request is a single line of whitespace-separated tokens. The first
//! token selects the command, case-insensitively. Each response is a single
//! line as well: `OK`, an integer, `nil`, a raw value, or an error.
//!
//! ## Modules
//!
//! - `types`: Defines the `Command` and `Response` enums and serialization
//! - `parser`: Line framing and command parsing
//!
//! ## Example
//!
//! ```
//! use lapsekv::protocol::{parse_message, Command, Response};
//!
//! // Parsing incoming data
//! let data = b"SET name Ariz\r\n";
//! let (command, consumed) = parse_message(data).unwrap();
//! assert_eq!(consumed, data.len());
//! assert_eq!(command.unwrap().name(), "SET");
//!
//! // Creating responses
//! assert_eq!(Response::Ok.serialize(), b"OK\r\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_command, parse_message, ParseError, ParseResult};
pub use types::{Command, Response};
