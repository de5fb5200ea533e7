//! Storage Module
//!
//! This module provides the core storage functionality for LapseKV:
//! a thread-safe key-value store with TTL support and a background
//! expiry sweeper.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     KeyValueStore                           │
//! │           RwLock<HashMap<String, Item>>                     │
//! │                                                  ──────────────> Persistence
//! └─────────────────────────────────────────────────────────────┘   (optional)
//!                            ▲
//!                            │ write lock
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **RwLock**: Multiple concurrent readers, exclusive writers
//! - **TTL Support**: Keys can carry an absolute expiry in epoch seconds
//! - **Lazy Expiry**: Reads skip expired entries without removing them
//! - **Active Expiry**: Background sweeper reclaims expired entries
//! - **Cancellation**: Every operation checks a [`Context`] on entry
//!
//! ## Example
//!
//! ```
//! use lapsekv::storage::{Context, KeyValueStore};
//!
//! let store = KeyValueStore::new();
//! let ctx = Context::background();
//!
//! store.set(&ctx, "session", "token123");
//! store.expire(&ctx, "session", 3600);
//!
//! assert_eq!(store.keys(&ctx, "sess*"), vec!["session".to_string()]);
//! ```

pub mod clock;
pub mod context;
pub mod engine;
pub mod expiry;
pub mod glob;
pub mod item;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::Context;
pub use engine::KeyValueStore;
pub use expiry::{ExpirySweeper, DEFAULT_SWEEP_INTERVAL};
pub use glob::{GlobPattern, KeyMatcher};
pub use item::Item;
