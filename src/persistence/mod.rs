//! Persistence Module
//!
//! The store only knows about persistence through the [`Persister`] trait:
//! "save a full snapshot" and "load a full snapshot". It never sees a path,
//! a file handle, or the encoding.
//!
//! ## Backends
//!
//! - [`FilePersister`]: JSON snapshot on disk, replaced atomically on every save
//! - [`MemoryPersister`]: keeps the last snapshot in memory (tests, embedding)
//!
//! ## Snapshot Format
//!
//! ```text
//! {
//!   "counter": { "value": "42" },
//!   "session": { "value": "abc123", "exp": "2025-01-01T12:00:01Z" }
//! }
//! ```
//!
//! A missing `exp`, a `null` one, or the zero timestamp
//! `0001-01-01T00:00:00Z` all mean "never expires".

pub mod file;
pub mod memory;

pub use file::FilePersister;
pub use memory::MemoryPersister;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// A full snapshot, keyed and ordered by key.
pub type Records = BTreeMap<String, Record>;

/// The persisted form of a single entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// The stored value
    pub value: String,

    /// Absolute expiry time (None = never expires)
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_exp"
    )]
    pub exp: Option<DateTime<Utc>>,
}

impl Record {
    /// Creates a record that never expires.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            exp: None,
        }
    }

    /// Creates a record expiring at `exp`.
    pub fn expiring(value: impl Into<String>, exp: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            exp: Some(exp),
        }
    }
}

/// The zero timestamp (year 1) is a "no expiry" marker, not a date in the past.
fn deserialize_exp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let exp = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(exp.filter(|t| t.year() > 1))
}

/// Errors raised by a persistence backend.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Reading, writing, or renaming the snapshot failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The snapshot could not be encoded
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    /// The stored snapshot is not valid
    #[error("failed to decode snapshot {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Failure reported by a custom backend
    #[error("persistence backend error: {0}")]
    Backend(String),
}

/// The durability capability the store depends on.
///
/// Implementations must be safe to call from several threads at once; the
/// store may save from a caller's thread and from the sweeper concurrently.
pub trait Persister: Send + Sync + 'static {
    /// Replaces the stored snapshot with `records`.
    ///
    /// The replacement must be atomic: a crash mid-save must leave either
    /// the previous snapshot or the new one, never a partial write.
    fn save(&self, records: &Records) -> Result<(), PersistError>;

    /// Loads the stored snapshot.
    ///
    /// Returns an empty map when nothing has been saved yet.
    fn load(&self) -> Result<Records, PersistError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_without_expiry_omits_exp() {
        let json = serde_json::to_string(&Record::new("v")).unwrap();
        assert_eq!(json, r#"{"value":"v"}"#);
    }

    #[test]
    fn test_record_with_expiry() {
        let exp = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 1).unwrap();
        let json = serde_json::to_string(&Record::expiring("v", exp)).unwrap();
        assert_eq!(json, r#"{"value":"v","exp":"2025-01-01T12:00:01Z"}"#);

        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back.exp, Some(exp));
    }

    #[test]
    fn test_zero_and_null_exp_mean_no_expiry() {
        let zero: Record =
            serde_json::from_str(r#"{"value":"v","exp":"0001-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(zero.exp, None);

        let null: Record = serde_json::from_str(r#"{"value":"v","exp":null}"#).unwrap();
        assert_eq!(null.exp, None);

        let absent: Record = serde_json::from_str(r#"{"value":"v"}"#).unwrap();
        assert_eq!(absent, Record::new("v"));
    }

    #[test]
    fn test_bad_exp_is_rejected() {
        let result = serde_json::from_str::<Record>(r#"{"value":"v","exp":"tomorrow"}"#);
        assert!(result.is_err());
    }
}
