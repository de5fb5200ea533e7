//! Background Expiry Sweeper
//!
//! This module implements a background task that periodically scans the store
//! for expired entries and removes them. This is called "active expiry" as
//! opposed to "lazy expiry", where reads simply skip expired entries.
//!
//! ## Why Do We Need This?
//!
//! Reads never delete anything. If a key expires and nobody overwrites or
//! deletes it, it would stay in memory forever. The sweeper bounds that
//! growth by reclaiming expired entries on a fixed period.
//!
//! ## Design
//!
//! The sweeper runs as a Tokio task and:
//! 1. Waits for the next tick (the period is fixed at start)
//! 2. Takes the store's write lock and removes every expired entry
//! 3. Logs how many entries were reclaimed
//!
//! It stops as soon as its cancellation token fires, even mid-wait, and
//! exits on its own once the store it sweeps has been dropped.

use crate::error::{Error, Result};
use crate::storage::{Context, KeyValueStore};
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Default period between two sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(1000);

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    /// Starts the expiry sweeper as a background task.
    ///
    /// # Arguments
    ///
    /// * `store` - The store to sweep; the task ends once it is dropped
    /// * `interval` - Time between two sweeps
    ///
    /// # Example
    ///
    /// ```ignore
    /// use lapsekv::storage::{ExpirySweeper, KeyValueStore};
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// let store = Arc::new(KeyValueStore::new());
    /// let sweeper = ExpirySweeper::start(Arc::downgrade(&store), Duration::from_secs(1))?;
    ///
    /// // Sweeper runs in the background...
    ///
    /// sweeper.stop();
    /// ```
    pub fn start(store: Weak<KeyValueStore>, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::InvalidInterval);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let token = CancellationToken::new();

        let task = runtime.spawn(sweeper_loop(store, interval, token.clone()));

        info!(
            interval_ms = interval.as_millis() as u64,
            "Background expiry sweeper started"
        );

        Ok(Self {
            token,
            task: Some(task),
        })
    }

    /// Stops the expiry sweeper.
    ///
    /// Consumes the handle, so a sweeper cannot be stopped twice.
    pub fn stop(self) {
        drop(self);
    }

    /// Stops the sweeper and waits for its task to finish.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// True once the sweeper task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        if !self.token.is_cancelled() {
            self.token.cancel();
            info!("Background expiry sweeper stopped");
        }
    }
}

/// The main sweeper loop.
async fn sweeper_loop(store: Weak<KeyValueStore>, interval: Duration, token: CancellationToken) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Expiry sweeper received shutdown signal");
                return;
            }
            _ = ticker.tick() => {}
        }

        let Some(store) = store.upgrade() else {
            debug!("Store dropped, expiry sweeper exiting");
            return;
        };

        let expired = store.sweep_expired();
        if expired > 0 {
            debug!(
                expired,
                keys_remaining = store.size(&Context::background()),
                "Expired keys cleaned up"
            );
        } else {
            trace!("Sweep found no expired keys");
        }
    }
}
