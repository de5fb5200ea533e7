//! Client connections.
//!
//! `main.rs` accepts sockets and spawns [`handle_connection`] for each one.
//! Every connection owns its buffers and shares the store, through a
//! [`CommandHandler`](crate::commands::CommandHandler), and the
//! [`ConnectionStats`] counters with all the others.
//!
//! ```text
//! socket ──read──> BytesMut ──parse_message──> Command
//!                                                 │ CommandHandler::execute
//! socket <──write── replies <──serialize_into── Response
//! ```

pub mod handler;

pub use handler::{
    handle_connection, ConnectionError, ConnectionHandler, ConnectionStats, StatsSnapshot,
};
