//! Storage Module
//!
//! This module provides the core storage functionality for kayvee: a
//! thread-safe key-value store with TTL support, a background expiry
//! sweeper, and a hook into the persistence layer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │   ┌─────────────────────────────────────────────────────┐   │
//! │   │  RwLock<HashMap<String, Entry>>  +  generation      │   │
//! │   └─────────────────────────────────────────────────────┘   │
//! │             ▲                                │              │
//! │             │ evict                          │ copy, unlock │
//! │   ┌─────────┴─────────┐                      ▼              │
//! │   │   ExpirySweeper   │             ┌──────────────────┐    │
//! │   │  (Tokio task)     │────────────>│    Persister     │    │
//! │   └───────────────────┘             └──────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **RwLock**: Multiple concurrent readers, exclusive writers
//! - **TTL Support**: Keys can have a time-to-live in seconds
//! - **Lazy Expiry**: Expired keys are dropped when a read finds them
//! - **Active Expiry**: A background sweeper drops the rest
//! - **Snapshots**: Every mutation saves the full key set, outside the lock
//! - **One-Shot Shutdown**: Stops the sweeper and flushes exactly once
//!
//! ## Example
//!
//! ```
//! use kayvee::persistence::MemoryPersister;
//! use kayvee::storage::{Store, StoreConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), kayvee::storage::StoreError> {
//! let persister = Arc::new(MemoryPersister::new());
//! let store = Store::open(
//!     StoreConfig::default()
//!         .with_persister(persister.clone())
//!         .with_eviction_interval(Duration::from_millis(500)),
//! )?;
//!
//! store.set("name", "Ariz", 0)?;
//! assert_eq!(persister.saves(), 1);
//!
//! store.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod engine;
mod expiry;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    Entry, SnapshotEntry, Store, StoreConfig, StoreError, DEFAULT_EVICTION_INTERVAL,
};
