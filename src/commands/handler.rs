//! Command Handler
//!
//! Executes parsed commands against the key-value store and turns the
//! results into protocol responses.
//!
//! ## Result mapping
//!
//! | Command | Store call | Response |
//! |---------|------------|----------|
//! | `SET key value` | `set` | `OK` |
//! | `GET key` | `get` | value or `nil` |
//! | `DEL key` | `del` | `1` / `0` |
//! | `EXPIRE key seconds` | `expire` | `OK` / `ERR operation failed` |
//! | `TTL key` | `ttl` | seconds or `-1` |
//! | `PERSIST key` | `persist` | `OK` / `ERR operation failed` |
//! | `KEYS pattern` | `keys` | space-separated keys |
//! | `EXISTS key` | `exists` | `1` / `0` |
//! | `DBSIZE` | `size` | entry count |
//! | `PING [message]` | - | `PONG` or the message |
//! | `QUIT` | - | `OK`, then the connection closes |

use crate::protocol::{Command, Response};
use crate::storage::{Context, KeyValueStore};
use std::sync::Arc;

/// Dispatches commands to the store.
#[derive(Clone, Debug)]
pub struct CommandHandler {
    store: Arc<KeyValueStore>,
}

impl CommandHandler {
    /// Creates a new command handler with the given store.
    pub fn new(store: Arc<KeyValueStore>) -> Self {
        Self { store }
    }

    /// The store commands are executed against.
    pub fn store(&self) -> &Arc<KeyValueStore> {
        &self.store
    }

    /// Executes a command and returns the response.
    ///
    /// `ctx` is checked by each store operation on entry; a cancelled context
    /// produces the same answer as a missing key.
    pub fn execute(&self, ctx: &Context, command: Command) -> Response {
        match command {
            Command::Set { key, value } => self.cmd_set(ctx, key, value),
            Command::Get { key } => self.cmd_get(ctx, &key),
            Command::Del { key } => Response::Integer(self.store.del(ctx, &key) as i64),
            Command::Expire { key, seconds } => self.store.expire(ctx, &key, seconds).into(),
            Command::Ttl { key } => Response::Integer(self.store.ttl(ctx, &key)),
            Command::Persist { key } => self.store.persist(ctx, &key).into(),
            Command::Keys { pattern } => Response::Keys(self.store.keys(ctx, &pattern)),
            Command::Exists { key } => Response::Integer(self.store.exists(ctx, &key) as i64),
            Command::DbSize => Response::Integer(self.store.size(ctx) as i64),
            Command::Ping { message } => match message {
                Some(message) => Response::Value(message),
                None => Response::value("PONG"),
            },
            Command::Quit => Response::Ok,
        }
    }

    fn cmd_set(&self, ctx: &Context, key: String, value: String) -> Response {
        self.store.set(ctx, key, value);
        Response::Ok
    }

    fn cmd_get(&self, ctx: &Context, key: &str) -> Response {
        match self.store.get(ctx, key) {
            Some(value) => Response::Value(value),
            None => Response::Nil,
        }
    }
}
