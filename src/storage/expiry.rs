//! Background Expiry Sweeper
//!
//! This module implements a background task that periodically scans the
//! store for expired keys and removes them. This is "active expiry", as
//! opposed to the "lazy expiry" that happens on access.
//!
//! ## Why Do We Need This?
//!
//! Lazy expiry only fires when a key is read. A key that expires and is
//! never read again would stay in memory, and in every snapshot, forever.
//!
//! ## Design
//!
//! The sweeper runs as a Tokio task and:
//! 1. Waits for the next tick of a fixed interval (default: 1s)
//! 2. Takes the write lock and removes every expired key
//! 3. Releases the lock and, if anything was removed, persists on the
//!    blocking pool
//!
//! The shutdown signal is checked before every tick. Once it fires no
//! further sweep starts, and [`ExpirySweeper::stop`] waits for a sweep
//! already in progress to finish, so the store's final persist always
//! comes after the sweeper's last one.

use crate::storage::engine::Keyspace;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, trace, warn};

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task is told to stop.
#[derive(Debug)]
pub(crate) struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    /// Starts the sweeper on the current tokio runtime.
    pub(crate) fn start(keyspace: Arc<Keyspace>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(sweeper_loop(keyspace, interval, shutdown_rx));

        debug!(
            interval_ms = interval.as_millis() as u64,
            "Background expiry sweeper started"
        );

        Self {
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Signals the sweeper and waits for its task to exit.
    pub(crate) async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Expiry sweeper task ended abnormally");
            }
        }

        debug!("Background expiry sweeper stopped");
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// The main sweeper loop.
async fn sweeper_loop(
    keyspace: Arc<Keyspace>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // Shutdown wins over a tick that is ready at the same time
        tokio::select! {
            biased;
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
            _ = ticker.tick() => {}
        }

        sweep(&keyspace).await;
    }
}

/// One pass: evict under the lock, persist after releasing it.
async fn sweep(keyspace: &Arc<Keyspace>) {
    let (evicted, snapshot) = keyspace.evict_expired();
    if evicted == 0 {
        trace!("Sweep found nothing to evict");
        return;
    }

    debug!(
        evicted = evicted,
        keys_remaining = keyspace.len(),
        "Expired keys cleaned up"
    );

    let keyspace = Arc::clone(keyspace);
    match tokio::task::spawn_blocking(move || keyspace.persist(snapshot)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Failed to persist after eviction"),
        Err(e) => error!(error = %e, "Eviction persist task failed"),
    }
}
