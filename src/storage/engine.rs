//! Thread-Safe Key-Value Store with Expiry Support
//!
//! This module implements the core store of LapseKV: a map of string keys
//! to string values, each optionally carrying an absolute expiry.
//!
//! ## Design Decisions
//!
//! 1. **One RwLock per store**: reads share the lock, every mutation (including
//!    the sweeper's reclamation pass) takes it exclusively. Each operation is
//!    atomic with respect to all others, and `keys`/`size` see a consistent
//!    snapshot.
//! 2. **Lazy expiry without side effects**: an expired item is invisible to
//!    reads, but reads never remove it. Reclamation is the sweeper's job, so
//!    `size()` reports physical entries and makes deferred cleanup visible.
//! 3. **Entry-time cancellation**: every operation takes a [`Context`]; a
//!    done context turns the operation into a no-op returning its sentinel.
//! 4. **Fire-and-forget persistence**: mutations are handed to the optional
//!    [`Persistence`] collaborator under the write lock, which must not block.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      KeyValueStore                          │
//! │                                                             │
//! │   get / ttl / exists / keys / size ──> read lock (shared)   │
//! │   set / del / expire / persist     ──> write lock           │
//! │   ExpirySweeper pass               ──> write lock           │
//! │                                                             │
//! │             RwLock<HashMap<String, Item>>                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{Error, Result};
use crate::persistence::{Mutation, Persistence};
use crate::storage::clock::{Clock, SystemClock};
use crate::storage::context::Context;
use crate::storage::expiry::ExpirySweeper;
use crate::storage::glob::KeyMatcher;
use crate::storage::item::Item;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, trace};

/// The concurrent, expiring key-value store.
///
/// Wrap it in an `Arc` to share it across connection tasks and the sweeper.
///
/// # Example
///
/// ```
/// use lapsekv::storage::{Context, KeyValueStore};
///
/// let store = KeyValueStore::new();
/// let ctx = Context::background();
///
/// store.set(&ctx, "name", "Ariz");
/// assert_eq!(store.get(&ctx, "name"), Some("Ariz".to_string()));
///
/// assert!(store.expire(&ctx, "name", 60));
/// assert!(store.ttl(&ctx, "name") > 0);
/// ```
pub struct KeyValueStore {
    entries: RwLock<HashMap<String, Item>>,

    clock: Arc<dyn Clock>,

    persistence: Option<Arc<dyn Persistence>>,

    /// Handle of the running sweeper, if any
    sweeper: Mutex<Option<ExpirySweeper>>,

    /// Statistics: expired entries reclaimed by sweeps
    expired_count: AtomicU64,
}

impl std::fmt::Debug for KeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValueStore")
            .field("entries", &self.read().len())
            .field("persistent", &self.persistence.is_some())
            .field("expired_count", &self.expired_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for KeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore {
    /// Creates an empty store using wall-clock time and no persistence.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            persistence: None,
            sweeper: Mutex::new(None),
            expired_count: AtomicU64::new(0),
        }
    }

    /// Attaches a persistence collaborator notified of every mutation.
    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    // No operation leaves the map half-updated, so a panic while holding
    // the lock cannot corrupt it.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Item>> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Item>> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[inline]
    fn notify(&self, mutation: Mutation) {
        if let Some(persistence) = &self.persistence {
            persistence.record(&mutation);
        }
    }

    /// Sets a key to a value, discarding any previous value and TTL.
    pub fn set(&self, ctx: &Context, key: impl Into<String>, value: impl Into<String>) {
        if ctx.is_done() {
            return;
        }
        let key = key.into();
        let value = value.into();

        let mut entries = self.write();
        // Inlined rather than going through `notify` so the key and value
        // are cloned only when a collaborator is attached.
        match &self.persistence {
            Some(persistence) => {
                entries.insert(key.clone(), Item::new(value.clone()));
                persistence.record(&Mutation::Set { key, value });
            }
            None => {
                entries.insert(key, Item::new(value));
            }
        }
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. An expired
    /// entry is left in place for the sweeper.
    pub fn get(&self, ctx: &Context, key: &str) -> Option<String> {
        if ctx.is_done() {
            return None;
        }
        let now = self.clock.now();
        let entries = self.read();
        entries
            .get(key)
            .filter(|item| !item.is_expired(now))
            .map(|item| item.value.clone())
    }

    /// Deletes a key, expired or not.
    ///
    /// # Returns
    ///
    /// `1` if an entry was removed, `0` otherwise.
    pub fn del(&self, ctx: &Context, key: &str) -> u64 {
        if ctx.is_done() {
            return 0;
        }
        let mut entries = self.write();
        if entries.remove(key).is_none() {
            return 0;
        }
        self.notify(Mutation::Del {
            key: key.to_string(),
        });
        1
    }

    /// Sets the key to expire `seconds` from now.
    ///
    /// An entry that has already expired but was not reclaimed yet counts as
    /// missing: it is not revived.
    ///
    /// # Returns
    ///
    /// `true` if the expiry was set, `false` if the key doesn't exist.
    pub fn expire(&self, ctx: &Context, key: &str, seconds: i64) -> bool {
        if ctx.is_done() {
            return false;
        }
        let now = self.clock.now();
        let mut entries = self.write();
        let Some(item) = entries.get_mut(key).filter(|item| !item.is_expired(now)) else {
            return false;
        };

        let expires_at = now.saturating_add(seconds);
        item.expires_at = Some(expires_at);
        self.notify(Mutation::Expire {
            key: key.to_string(),
            expires_at,
        });
        true
    }

    /// Gets the remaining TTL for a key in seconds.
    ///
    /// # Returns
    ///
    /// - the remaining seconds if the key exists and has a pending expiry
    /// - `-1` if the key doesn't exist, has no expiry, or has none left
    pub fn ttl(&self, ctx: &Context, key: &str) -> i64 {
        if ctx.is_done() {
            return -1;
        }
        let now = self.clock.now();
        let entries = self.read();
        match entries.get(key).and_then(|item| item.remaining(now)) {
            Some(remaining) if remaining > 0 => remaining,
            _ => -1,
        }
    }

    /// Removes the expiry from a key (makes it persistent).
    ///
    /// Like [`expire`](Self::expire), an expired but unreclaimed entry
    /// counts as missing.
    ///
    /// # Returns
    ///
    /// `true` if the key exists, `false` otherwise.
    pub fn persist(&self, ctx: &Context, key: &str) -> bool {
        if ctx.is_done() {
            return false;
        }
        let now = self.clock.now();
        let mut entries = self.write();
        let Some(item) = entries.get_mut(key).filter(|item| !item.is_expired(now)) else {
            return false;
        };

        item.expires_at = None;
        self.notify(Mutation::Persist {
            key: key.to_string(),
        });
        true
    }

    /// Returns all live keys matching a glob pattern, in no particular order.
    ///
    /// - `*` matches everything
    /// - `h*llo` matches hello, hallo, hxllo
    /// - `h?llo` matches hello, hallo, but not hllo
    /// - `h[ae]llo` matches hello and hallo, but not hillo
    ///
    /// A malformed pattern such as `key[` only matches the key spelled
    /// exactly like it.
    ///
    /// **Warning**: This operation scans all keys and holds the read lock
    /// while doing so.
    pub fn keys(&self, ctx: &Context, pattern: &str) -> Vec<String> {
        if ctx.is_done() {
            return Vec::new();
        }
        let matcher = KeyMatcher::new(pattern);
        let now = self.clock.now();
        let entries = self.read();

        entries
            .iter()
            .filter(|(key, item)| !item.is_expired(now) && matcher.matches(key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Checks if a key exists and has not expired.
    pub fn exists(&self, ctx: &Context, key: &str) -> bool {
        if ctx.is_done() {
            return false;
        }
        let now = self.clock.now();
        self.read()
            .get(key)
            .map(|item| !item.is_expired(now))
            .unwrap_or(false)
    }

    /// Returns the number of stored entries, including expired entries the
    /// sweeper has not reclaimed yet.
    pub fn size(&self, ctx: &Context) -> u64 {
        if ctx.is_done() {
            return 0;
        }
        self.read().len() as u64
    }

    /// Removes every entry expired as of now.
    ///
    /// This is called by the background expiry sweeper.
    ///
    /// # Returns
    ///
    /// Returns the number of entries that were removed.
    pub fn sweep_expired(&self) -> u64 {
        let now = self.clock.now();
        let mut entries = self.write();
        let before = entries.len();

        entries.retain(|_, item| !item.is_expired(now));

        let removed = (before - entries.len()) as u64;
        if removed > 0 {
            self.expired_count.fetch_add(removed, Ordering::Relaxed);
        }
        removed
    }

    /// Total number of entries reclaimed by sweeps since creation.
    pub fn expired_count(&self) -> u64 {
        self.expired_count.load(Ordering::Relaxed)
    }

    /// Applies a replayed mutation without recording it again.
    ///
    /// Replayed deadlines are absolute, so an entry whose TTL ran out while
    /// the server was down comes back already expired.
    pub fn restore(&self, mutation: Mutation) {
        let mut entries = self.write();
        match mutation {
            Mutation::Set { key, value } => {
                entries.insert(key, Item::new(value));
            }
            Mutation::Del { key } => {
                entries.remove(&key);
            }
            Mutation::Expire { key, expires_at } => {
                if let Some(item) = entries.get_mut(&key) {
                    item.expires_at = Some(expires_at);
                }
            }
            Mutation::Persist { key } => {
                if let Some(item) = entries.get_mut(&key) {
                    item.expires_at = None;
                }
            }
        }
    }

    /// Starts the background sweeper, reclaiming expired entries every
    /// `interval`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::CleanupAlreadyRunning`] if a sweeper was started and not stopped
    /// - [`Error::InvalidInterval`] if `interval` is zero
    /// - [`Error::NoRuntime`] outside a Tokio runtime
    pub fn start_cleanup(self: &Arc<Self>, interval: Duration) -> Result<()> {
        let mut slot = self
            .sweeper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            return Err(Error::CleanupAlreadyRunning);
        }
        *slot = Some(ExpirySweeper::start(Arc::downgrade(self), interval)?);
        debug!(interval_ms = interval.as_millis() as u64, "Cleanup started");
        Ok(())
    }

    /// Stops the background sweeper.
    ///
    /// # Errors
    ///
    /// [`Error::CleanupNotRunning`] if no sweeper is running, including a
    /// second call after a successful stop.
    pub fn stop_cleanup(&self) -> Result<()> {
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or(Error::CleanupNotRunning)?;
        sweeper.stop();
        trace!("Cleanup stopped");
        Ok(())
    }
}
