//! Thread-Safe Store with Expiry and Snapshot Persistence
//!
//! This module implements the core of kayvee: a key-value map guarded by a
//! single reader/writer lock, with TTL support and a durability hook.
//!
//! ## Design Decisions
//!
//! 1. **One RwLock**: Reads share the lock, mutations and eviction take it exclusively.
//! 2. **Lazy + Active Expiry**: Reads drop expired keys they find; a background
//!    sweeper removes the rest.
//! 3. **Persist Outside the Lock**: Mutations copy the records while holding the
//!    lock, release it, then hand the copy to the [`Persister`].
//! 4. **Generations**: Every mutation bumps a counter. Snapshots carry it, and a
//!    snapshot older than the last one written is never saved.
//!
//! ## Mutation Flow
//!
//! ```text
//!   set/delete ──> write lock ──> mutate map ──> generation += 1
//!                                                     │
//!                                                     ▼
//!                              downgrade to read lock, copy records
//!                                                     │
//!                                                     ▼
//!                                 unlock ──> Persister::save(records)
//! ```
//!
//! Reads never persist. A key removed by lazy expiry reaches disk with the
//! next mutation, sweep, or shutdown.

use crate::persistence::{PersistError, Persister, Record, Records};
use crate::storage::clock::{Clock, SystemClock};
use crate::storage::expiry::ExpirySweeper;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, trace};

/// Sweep interval used when none (or zero) is configured.
pub const DEFAULT_EVICTION_INTERVAL: Duration = Duration::from_secs(1);

/// Errors returned by the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The snapshot could not be loaded at construction
    #[error("failed to load snapshot: {0}")]
    Load(#[source] PersistError),

    /// The snapshot could not be saved; the in-memory change was kept
    #[error("failed to persist snapshot: {0}")]
    Persist(#[source] PersistError),

    /// The shutdown sequence failed; every caller of shutdown gets this
    #[error("shutdown failed: {0}")]
    Shutdown(#[source] Arc<StoreError>),

    /// A blocking persistence task panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The actual value stored
    pub value: String,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    /// Creates an entry that lives `ttl_secs` seconds from `now`.
    ///
    /// A non-positive TTL means no expiry, as does a TTL too large to
    /// represent as a timestamp.
    pub fn with_ttl_secs(value: impl Into<String>, ttl_secs: i64, now: DateTime<Utc>) -> Self {
        let expires_at = if ttl_secs > 0 {
            TimeDelta::try_seconds(ttl_secs).and_then(|ttl| now.checked_add_signed(ttl))
        } else {
            None
        };

        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Checks if this entry has expired at `now`.
    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// Remaining time to live at `now`, truncated to milliseconds.
    ///
    /// Returns None if the entry never expires, zero if it already has.
    pub fn ttl_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at.map(|exp| {
            let remaining = (exp - now).to_std().unwrap_or(Duration::ZERO);
            Duration::from_millis(remaining.as_millis() as u64)
        })
    }

    fn to_record(&self) -> Record {
        Record {
            value: self.value.clone(),
            exp: self.expires_at,
        }
    }
}

impl From<Record> for Entry {
    fn from(record: Record) -> Self {
        Self {
            value: record.value,
            expires_at: record.exp,
        }
    }
}

/// One live entry as reported by [`Store::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub key: String,
    pub value: String,
    /// Remaining TTL, None if the entry never expires
    pub ttl: Option<Duration>,
}

impl fmt::Display for SnapshotEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.value)?;
        if let Some(ttl) = self.ttl {
            let ms = ttl.as_millis();
            write!(f, " (ttl {}.{:03}s)", ms / 1000, ms % 1000)?;
        }
        Ok(())
    }
}

/// Configuration for [`Store::open`].
#[derive(Clone)]
pub struct StoreConfig {
    /// Interval between background sweeps (zero = default of 1s)
    pub eviction_interval: Duration,

    /// Where snapshots go (None = purely in-memory)
    pub persister: Option<Arc<dyn Persister>>,

    /// Time source for expiry
    pub clock: Arc<dyn Clock>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            eviction_interval: DEFAULT_EVICTION_INTERVAL,
            persister: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl StoreConfig {
    pub fn with_eviction_interval(mut self, interval: Duration) -> Self {
        self.eviction_interval = interval;
        self
    }

    pub fn with_persister(mut self, persister: Arc<dyn Persister>) -> Self {
        self.persister = Some(persister);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("eviction_interval", &self.eviction_interval)
            .field("persistent", &self.persister.is_some())
            .finish()
    }
}

/// The map plus its mutation counter, always locked together.
#[derive(Debug, Default)]
struct Table {
    entries: HashMap<String, Entry>,
    generation: u64,
}

impl Table {
    fn records(&self) -> Records {
        self.entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.to_record()))
            .collect()
    }
}

/// A copy of the records taken at a given generation.
#[derive(Debug)]
pub(crate) struct Snapshot {
    generation: u64,
    records: Records,
}

/// State shared between the [`Store`] handle and the background sweeper.
pub(crate) struct Keyspace {
    table: RwLock<Table>,
    persister: Option<Arc<dyn Persister>>,
    clock: Arc<dyn Clock>,
    /// Generation of the last snapshot written; also serializes saves
    saved_generation: Mutex<Option<u64>>,
}

impl Keyspace {
    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn len(&self) -> usize {
        self.table.read().entries.len()
    }

    /// Removes `key` if it is still expired at `now`, under the write lock.
    ///
    /// Another caller may have deleted or replaced the key since it was seen
    /// expired; a replacement is returned instead of removed.
    fn remove_if_expired(&self, key: &str, now: DateTime<Utc>) -> Option<String> {
        let mut table = self.table.write();
        let entry = table.entries.get(key)?;
        if !entry.is_expired_at(now) {
            return Some(entry.value.clone());
        }

        table.entries.remove(key);
        table.generation += 1;
        trace!(key = %key, "Lazily expired key");
        None
    }

    /// Copies the records if there is anywhere to save them.
    fn capture(&self, table: &Table) -> Option<Snapshot> {
        self.persister.as_ref()?;
        Some(Snapshot {
            generation: table.generation,
            records: table.records(),
        })
    }

    /// Captures the current state under a read lock.
    pub(crate) fn current_snapshot(&self) -> Option<Snapshot> {
        let table = self.table.read();
        self.capture(&table)
    }

    /// Writes `snapshot` unless a newer one has already been written.
    ///
    /// Must not be called with the table lock held.
    pub(crate) fn persist(&self, snapshot: Option<Snapshot>) -> Result<(), StoreError> {
        let (Some(persister), Some(snapshot)) = (self.persister.as_ref(), snapshot) else {
            return Ok(());
        };

        let mut saved = self.saved_generation.lock();
        if saved.is_some_and(|g| snapshot.generation < g) {
            trace!(
                generation = snapshot.generation,
                "Skipping snapshot older than the one on disk"
            );
            return Ok(());
        }

        persister
            .save(&snapshot.records)
            .map_err(StoreError::Persist)?;
        *saved = Some(snapshot.generation);
        Ok(())
    }

    /// Removes every expired entry.
    ///
    /// Returns how many were removed, and a snapshot to persist if any were.
    pub(crate) fn evict_expired(&self) -> (usize, Option<Snapshot>) {
        let now = self.now();
        let mut table = self.table.write();

        let before = table.entries.len();
        table.entries.retain(|_, entry| !entry.is_expired_at(now));
        let evicted = before - table.entries.len();

        if evicted == 0 {
            return (0, None);
        }

        table.generation += 1;
        let table = RwLockWriteGuard::downgrade(table);
        (evicted, self.capture(&table))
    }
}

/// The key-value store.
///
/// Construct it with [`Store::open`] inside a tokio runtime; it starts its
/// own background sweeper. Share it across threads or tasks with an `Arc`.
///
/// # Example
///
/// ```
/// use kayvee::storage::{Store, StoreConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), kayvee::storage::StoreError> {
/// let store = Store::open(StoreConfig::default())?;
///
/// store.set("name", "Ariz", 0)?;
/// assert_eq!(store.get("name"), Some("Ariz".to_string()));
///
/// // Expires in 60 seconds
/// store.set("session", "abc123", 60)?;
///
/// store.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct Store {
    keyspace: Arc<Keyspace>,
    sweeper: Mutex<Option<ExpirySweeper>>,
    /// Outcome of the one shutdown run, handed to every caller
    shut_down: OnceCell<Result<(), Arc<StoreError>>>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("keys", &self.keyspace.len())
            .field("persistent", &self.keyspace.persister.is_some())
            .field("shut_down", &self.shut_down.initialized())
            .finish()
    }
}

impl Store {
    /// Opens a store, loading the persisted snapshot if a persister is set.
    ///
    /// Records that have already expired are not loaded. The background
    /// sweeper starts once loading is done.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Load`] if the snapshot cannot be loaded.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let interval = if config.eviction_interval.is_zero() {
            DEFAULT_EVICTION_INTERVAL
        } else {
            config.eviction_interval
        };

        let mut entries = HashMap::new();
        if let Some(persister) = &config.persister {
            let records = persister.load().map_err(StoreError::Load)?;
            let now = config.clock.now();
            let total = records.len();

            entries.extend(
                records
                    .into_iter()
                    .map(|(key, record)| (key, Entry::from(record)))
                    .filter(|(_, entry)| !entry.is_expired_at(now)),
            );

            info!(
                loaded = entries.len(),
                skipped_expired = total - entries.len(),
                "Snapshot loaded"
            );
        }

        let keyspace = Arc::new(Keyspace {
            table: RwLock::new(Table {
                entries,
                generation: 0,
            }),
            persister: config.persister,
            clock: config.clock,
            saved_generation: Mutex::new(None),
        });

        let sweeper = ExpirySweeper::start(Arc::clone(&keyspace), interval);

        Ok(Self {
            keyspace,
            sweeper: Mutex::new(Some(sweeper)),
            shut_down: OnceCell::new(),
        })
    }

    /// Sets a key, replacing whatever was there.
    ///
    /// `ttl_secs <= 0` means the key never expires. Keys are taken as
    /// given: the store does not normalize them or reject empty ones, so
    /// callers that need non-empty keys must check before calling.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persist`] if the snapshot could not be saved.
    /// The new value is stored either way.
    pub fn set(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl_secs: i64,
    ) -> Result<(), StoreError> {
        let key = key.into();
        let entry = Entry::with_ttl_secs(value, ttl_secs, self.keyspace.now());
        trace!(key = %key, ttl_secs, "SET");

        let snapshot = {
            let mut table = self.keyspace.table.write();
            table.entries.insert(key, entry);
            table.generation += 1;

            let table = RwLockWriteGuard::downgrade(table);
            self.keyspace.capture(&table)
        };

        self.keyspace.persist(snapshot)
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    /// An expired key is removed on the spot, but not persisted.
    pub fn get(&self, key: &str) -> Option<String> {
        let now = self.keyspace.now();

        // First, try a read lock (fast path for existing, non-expired keys)
        {
            let table = self.keyspace.table.read();
            match table.entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired_at(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        // Key exists but is expired - need write lock to remove it.
        // Two readers may both get here; the second finds nothing to remove.
        self.keyspace.remove_if_expired(key, now)
    }

    /// Deletes a key.
    ///
    /// Returns `Ok(true)` if the key was deleted, `Ok(false)` if it didn't
    /// exist. Only a successful removal is persisted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persist`] if the snapshot could not be saved.
    /// The key stays deleted either way.
    pub fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let snapshot = {
            let mut table = self.keyspace.table.write();
            if table.entries.remove(key).is_none() {
                return Ok(false);
            }
            table.generation += 1;

            let table = RwLockWriteGuard::downgrade(table);
            self.keyspace.capture(&table)
        };

        trace!(key = %key, "DEL");
        self.keyspace.persist(snapshot)?;
        Ok(true)
    }

    /// Runs one eviction sweep now, on the caller's thread.
    ///
    /// Returns the number of keys removed. Persists only if that is non-zero.
    pub fn evict_expired(&self) -> Result<usize, StoreError> {
        let (evicted, snapshot) = self.keyspace.evict_expired();
        if evicted > 0 {
            debug!(evicted, "Expired keys cleaned up");
            self.keyspace.persist(snapshot)?;
        }
        Ok(evicted)
    }

    /// Lists live entries sorted by key, with their remaining TTL.
    ///
    /// Expired entries that have not been swept yet are left out.
    pub fn snapshot(&self) -> Vec<SnapshotEntry> {
        let now = self.keyspace.now();
        let table = self.keyspace.table.read();

        let mut out: Vec<SnapshotEntry> = table
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, entry)| SnapshotEntry {
                key: key.clone(),
                value: entry.value.clone(),
                ttl: entry.ttl_at(now),
            })
            .collect();
        drop(table);

        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.keyspace.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops the background sweeper and writes one final snapshot.
    ///
    /// Safe to call any number of times from any number of tasks: the
    /// sequence runs once, and every caller waits for it and sees its
    /// outcome. A failure is reported as [`StoreError::Shutdown`].
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        self.shut_down
            .get_or_init(|| async move { self.run_shutdown().await.map_err(Arc::new) })
            .await
            .clone()
            .map_err(StoreError::Shutdown)
    }

    async fn run_shutdown(&self) -> Result<(), StoreError> {
        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.stop().await;
        }

        let keyspace = Arc::clone(&self.keyspace);
        let result = tokio::task::spawn_blocking(move || {
            let snapshot = keyspace.current_snapshot();
            keyspace.persist(snapshot)
        })
        .await?;

        match &result {
            Ok(()) => info!(keys = self.len(), "Store shut down"),
            Err(e) => error!(error = %e, "Final persist failed"),
        }
        result
    }
}
