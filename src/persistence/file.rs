//! File-backed snapshot persistence.
//!
//! Every save writes the whole snapshot to a temporary file next to the
//! destination, syncs it, and renames it over the destination. Readers (and
//! the next process start) see either the old snapshot or the new one.

use super::{PersistError, Persister, Records};
use parking_lot::Mutex;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, trace};

/// Stores the snapshot as a JSON document at a fixed path.
#[derive(Debug)]
pub struct FilePersister {
    path: PathBuf,
    /// Serializes saves and loads against each other
    io_lock: Mutex<()>,
}

impl FilePersister {
    /// Creates a persister for the snapshot at `path`.
    ///
    /// Nothing is touched on disk until the first save or load.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io_lock: Mutex::new(()),
        }
    }

    /// Returns the snapshot path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The temp file must live on the same filesystem as the destination for
    /// the rename to be atomic.
    fn temp_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn io_error(&self, source: std::io::Error) -> PersistError {
        PersistError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl Persister for FilePersister {
    fn save(&self, records: &Records) -> Result<(), PersistError> {
        let encoded = serde_json::to_vec_pretty(records).map_err(PersistError::Encode)?;

        let _guard = self.io_lock.lock();

        let mut tmp = NamedTempFile::new_in(self.temp_dir()).map_err(|e| self.io_error(e))?;
        tmp.write_all(&encoded).map_err(|e| self.io_error(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_error(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_error(e.error))?;

        debug!(
            path = %self.path.display(),
            keys = records.len(),
            bytes = encoded.len(),
            "Snapshot saved"
        );
        Ok(())
    }

    fn load(&self) -> Result<Records, PersistError> {
        let _guard = self.io_lock.lock();

        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!(path = %self.path.display(), "No snapshot on disk, starting empty");
                return Ok(Records::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let records: Records =
            serde_json::from_slice(&raw).map_err(|source| PersistError::Decode {
                path: self.path.clone(),
                source,
            })?;

        debug!(path = %self.path.display(), keys = records.len(), "Snapshot loaded");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Record;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let persister = FilePersister::new(tmp.path().join("data.json"));

        let records = persister.load().unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let persister = FilePersister::new(tmp.path().join("data.json"));
        let exp = Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap();

        let mut records = Records::new();
        records.insert("a".to_string(), Record::new("1"));
        records.insert("b".to_string(), Record::expiring("2", exp));
        persister.save(&records).unwrap();

        assert_eq!(persister.load().unwrap(), records);
    }

    #[test]
    fn test_save_replaces_previous_snapshot() {
        let tmp = TempDir::new().unwrap();
        let persister = FilePersister::new(tmp.path().join("data.json"));

        let mut first = Records::new();
        first.insert("old".to_string(), Record::new("x"));
        persister.save(&first).unwrap();

        let mut second = Records::new();
        second.insert("new".to_string(), Record::new("y"));
        persister.save(&second).unwrap();

        let loaded = persister.load().unwrap();
        assert_eq!(loaded, second);
        assert!(!loaded.contains_key("old"));
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let persister = FilePersister::new(tmp.path().join("data.json"));

        for i in 0..5 {
            let mut records = Records::new();
            records.insert(format!("k{}", i), Record::new("v"));
            persister.save(&records).unwrap();
        }

        let names: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("data.json")]);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let err = FilePersister::new(&path).load().unwrap_err();
        assert!(matches!(err, PersistError::Decode { .. }));
    }

    #[test]
    fn test_loads_zero_timestamp_as_no_expiry() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data.json");
        std::fs::write(
            &path,
            br#"{"k":{"value":"v","exp":"0001-01-01T00:00:00Z"}}"#,
        )
        .unwrap();

        let records = FilePersister::new(&path).load().unwrap();
        assert_eq!(records.get("k"), Some(&Record::new("v")));
    }

    #[test]
    fn test_save_into_missing_directory_fails() {
        let tmp = TempDir::new().unwrap();
        let persister = FilePersister::new(tmp.path().join("nope").join("data.json"));

        let err = persister.save(&Records::new()).unwrap_err();
        assert!(matches!(err, PersistError::Io { .. }));
    }
}
