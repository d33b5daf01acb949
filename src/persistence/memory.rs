//! In-memory snapshot persistence.
//!
//! Keeps the most recent snapshot in memory and counts saves. Nothing
//! survives the process; useful for tests and for embedding the store
//! somewhere that snapshots are shipped elsewhere.

use super::{PersistError, Persister, Records};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Holds the last saved snapshot in memory.
#[derive(Debug, Default)]
pub struct MemoryPersister {
    records: Mutex<Option<Records>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryPersister {
    /// Creates an empty persister (loading yields an empty snapshot).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a persister whose next load returns `records`.
    pub fn with_records(records: Records) -> Self {
        Self {
            records: Mutex::new(Some(records)),
            ..Self::default()
        }
    }

    /// Number of successful saves so far.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// The most recently saved (or seeded) snapshot.
    pub fn last_snapshot(&self) -> Option<Records> {
        self.records.lock().clone()
    }

    /// Makes every subsequent save fail until turned off again.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl Persister for MemoryPersister {
    fn save(&self, records: &Records) -> Result<(), PersistError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(PersistError::Backend("saves are disabled".to_string()));
        }

        *self.records.lock() = Some(records.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self) -> Result<Records, PersistError> {
        Ok(self.records.lock().clone().unwrap_or_default())
    }
}
