//! Persistence Module
//!
//! The store can mirror its mutations to a durable log so that state
//! survives a restart. The store only decides *that* a mutation happened and
//! hands a [`Mutation`] to a [`Persistence`] implementation; how the record
//! is stored and replayed is entirely up to the implementation.
//!
//! ## Contract
//!
//! - `record` is called while the store's write lock is held, so records
//!   arrive in the same order the mutations were applied.
//! - `record` must not block. The in-memory state is authoritative and is
//!   never rolled back because a record could not be written.
//! - Reads never consult the collaborator.
//!
//! The bundled implementation is an append-only file, see [`aof`].

pub mod aof;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use aof::{replay, AofWriter, DEFAULT_QUEUE_CAPACITY};

/// A state change worth replaying after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Mutation {
    Set { key: String, value: String },
    Del { key: String },
    /// The deadline is absolute, so replaying late never extends a TTL.
    Expire { key: String, expires_at: i64 },
    Persist { key: String },
}

impl Mutation {
    pub fn key(&self) -> &str {
        match self {
            Mutation::Set { key, .. }
            | Mutation::Del { key }
            | Mutation::Expire { key, .. }
            | Mutation::Persist { key } => key,
        }
    }
}

/// Receives every mutation the store applies.
pub trait Persistence: Send + Sync {
    fn record(&self, mutation: &Mutation);
}

/// Options for building the persistence collaborator.
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub filepath: PathBuf,
    /// Records buffered between the store and the file writer
    pub queue_capacity: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            filepath: PathBuf::from("appendonly.aof"),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Builds the append-only file writer described by `config`.
///
/// Returns `Ok(None)` when persistence is disabled. The file is created if
/// missing and appended to otherwise; call [`replay`] on it first to
/// restore earlier state.
pub async fn open(config: &PersistenceConfig) -> Result<Option<AofWriter>> {
    if !config.enabled {
        return Ok(None);
    }
    let writer = AofWriter::open(&config.filepath, config.queue_capacity).await?;
    Ok(Some(writer))
}
