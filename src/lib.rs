//! # LapseKV - An In-Memory Key-Value Store with Expiring Keys
//!
//! LapseKV keeps string keys and string values in memory. Any key may be
//! given a time-to-live; once it elapses the key reads as absent, and a
//! background sweeper reclaims its memory later.
//!
//! ## Features
//!
//! - **TTL Support**: `expire`, `ttl` and `persist` on any key
//! - **Lazy + Active Expiry**: reads hide expired keys immediately, a
//!   cancellable background task deletes them
//! - **Glob Key Listing**: `keys("user:*")` with `*`, `?` and `[...]`
//! - **Cancellation**: every operation takes a [`Context`]; once it is
//!   cancelled or past its deadline the operation does nothing
//! - **Append-Only File**: optional, non-blocking mutation log that is
//!   replayed on startup
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              LapseKV                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐    │
//! │  │   Line      │    │              KeyValueStore                   │    │
//! │  │   Parser    │    │     RwLock<HashMap<String, Item>>            │    │
//! │  └─────────────┘    └───────┬──────────────────────────────▲───────┘    │
//! │                             │ Mutation                     │ Weak       │
//! │                             ▼                              │            │
//! │                     ┌───────────────┐          ┌───────────┴─────────┐  │
//! │                     │   AofWriter   │          │   ExpirySweeper     │  │
//! │                     │ (Tokio task)  │          │   (Tokio task)      │  │
//! │                     └───────────────┘          └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use lapsekv::commands::CommandHandler;
//! use lapsekv::connection::{handle_connection, ConnectionStats};
//! use lapsekv::storage::{Context, KeyValueStore, DEFAULT_SWEEP_INTERVAL};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(KeyValueStore::new());
//!     store.start_cleanup(DEFAULT_SWEEP_INTERVAL)?;
//!
//!     let stats = Arc::new(ConnectionStats::new());
//!     let root = Context::background();
//!     let listener = TcpListener::bind("127.0.0.1:6379").await?;
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await?;
//!         let handler = CommandHandler::new(Arc::clone(&store));
//!         tokio::spawn(handle_connection(
//!             stream,
//!             addr,
//!             handler,
//!             root.child(),
//!             Arc::clone(&stats),
//!         ));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `SET key value`
//! - `GET key`
//! - `DEL key`
//! - `EXPIRE key seconds`
//! - `TTL key`
//! - `PERSIST key`
//! - `KEYS pattern`
//! - `EXISTS key`
//! - `DBSIZE`
//! - `PING [message]`
//! - `QUIT`
//!
//! ## Module Overview
//!
//! - [`storage`]: The store, its clock, cancellation context and sweeper
//! - [`persistence`]: Mutation records and the append-only file
//! - [`protocol`]: Line parser and response formatting
//! - [`commands`]: Maps commands onto store calls
//! - [`connection`]: Client connection management
//! - [`config`]: Command-line configuration for the server binary
//!
//! ## Expiry
//!
//! Keys with TTL are expired in two ways:
//! 1. **Lazy**: every read checks the deadline and reports an expired key
//!    as absent, without removing it
//! 2. **Active**: the sweeper periodically deletes every expired key
//!
//! `size()` counts raw entries, so it includes expired keys the sweeper has
//! not reached yet.

pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod persistence;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats};
pub use error::{Error, Result};
pub use persistence::{AofWriter, Mutation, Persistence, PersistenceConfig};
pub use protocol::{Command, ParseError, Response};
pub use storage::{Context, ExpirySweeper, KeyValueStore};

/// The default port LapseKV listens on
pub const DEFAULT_PORT: u16 = 6379;

/// The default host LapseKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of LapseKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
