//! Command dispatch.
//!
//! Sits between the line protocol and the store: a parsed [`Command`]
//! goes in, a [`Response`] comes out. Nothing here touches the network,
//! so the mapping can be tested without a socket.
//!
//! [`Command`]: crate::protocol::Command
//! [`Response`]: crate::protocol::Response

pub mod handler;

pub use handler::CommandHandler;
