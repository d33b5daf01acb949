//! # kayvee - An In-Process Key-Value Store with TTL
//!
//! kayvee is a small key-value store that keeps everything in memory, lets
//! keys expire after a time-to-live, and can mirror its full contents to a
//! snapshot file after every change.
//!
//! ## Features
//!
//! - **Thread Safe**: One RwLock; any number of concurrent readers and writers
//! - **TTL Support**: Keys can expire, checked lazily on read and actively by a sweeper
//! - **Durable**: Full snapshots written atomically (temp file + rename)
//! - **Line Commands**: `SET`, `GET`, `DEL`, `OUT`, `STOP`
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               kayvee                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────────────┐     │
//! │  │  stdin      │───>│  Command    │───>│          Store           │     │
//! │  │  (lines)    │    │  Handler    │    │  RwLock<HashMap<..>>     │     │
//! │  └─────────────┘    └─────────────┘    └────────────┬─────────────┘     │
//! │                                               ▲     │                   │
//! │                                               │     ▼                   │
//! │                     ┌─────────────────────────┴┐  ┌──────────────────┐  │
//! │                     │      ExpirySweeper       │  │    Persister     │  │
//! │                     │  (Background Tokio Task) │─>│ (JSON snapshot)  │  │
//! │                     └──────────────────────────┘  └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use kayvee::persistence::FilePersister;
//! use kayvee::storage::{Store, StoreConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Load data.json if it exists, start the sweeper
//!     let store = Store::open(
//!         StoreConfig::default().with_persister(Arc::new(FilePersister::new("data.json"))),
//!     )?;
//!
//!     store.set("session", "abc123", 60)?;
//!     assert_eq!(store.get("session"), Some("abc123".to_string()));
//!
//!     // Stop the sweeper and write the final snapshot
//!     store.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: The store, its expiry sweeper, and the clock it reads
//! - [`persistence`]: The persister trait plus file and in-memory backends
//! - [`commands`]: Line-command parsing and execution
//!
//! ## Design Highlights
//!
//! ### Persistence Never Holds the Lock
//!
//! Mutations copy the records while holding the lock and save after
//! releasing it, so a slow disk never blocks readers.
//!
//! ### Lazy + Active Expiry
//!
//! Keys with TTL are expired in two ways:
//! 1. **Lazy**: When a key is read, we check if it's expired
//! 2. **Active**: A background task periodically scans for expired keys
//!
//! This ensures memory (and the snapshot) is reclaimed even for keys that
//! are never read again.

pub mod commands;
pub mod persistence;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{Command, CommandError, CommandHandler, Reply};
pub use persistence::{FilePersister, MemoryPersister, PersistError, Persister, Record, Records};
pub use storage::{Store, StoreConfig, StoreError};

/// The default snapshot file
pub const DEFAULT_DATA_FILE: &str = "data.json";

/// Version of kayvee
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
