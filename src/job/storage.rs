// Backup artifact storage
//
// Plain files, one directory per device. The filename contract — device
// name plus local timestamp — is what other components key on; nothing
// else about the layout is load-bearing.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::Serialize;

use super::generate_job_id;
use crate::output::errors::PatrolError;

/// Record of one stored configuration backup
#[derive(Debug, Clone, Serialize)]
pub struct Backup {
    pub id: String,
    pub filename: String,
    pub path: PathBuf,
    pub timestamp: DateTime<Local>,
    /// Bytes written; equals the cleaned config text length
    pub size: u64,
}

/// Writes backup artifacts under one root directory
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        BackupStore { root: root.into() }
    }

    /// Store cleaned config text for a device and return its record.
    pub fn store(&self, device_name: &str, content: &str) -> Result<Backup, PatrolError> {
        let dir = self.root.join(device_name);
        fs::create_dir_all(&dir).map_err(|e| PatrolError::Io {
            message: format!("Failed to create backup directory: {}", e),
            path: Some(dir.clone()),
        })?;

        let timestamp = Local::now();
        let filename = format!("{}_{}.cfg", device_name, timestamp.format("%Y%m%d-%H%M%S"));
        let path = dir.join(&filename);

        fs::write(&path, content).map_err(|e| PatrolError::Io {
            message: format!("Failed to write backup file: {}", e),
            path: Some(path.clone()),
        })?;

        Ok(Backup {
            id: generate_job_id(),
            filename,
            path,
            timestamp,
            size: content.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_writes_one_file_per_device_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path());

        let backup = store.store("core-sw-01", "sysname core-sw-01\nreturn\n").unwrap();

        assert!(backup.path.exists());
        assert!(backup.path.starts_with(dir.path().join("core-sw-01")));
        assert!(backup.filename.starts_with("core-sw-01_"));
        assert!(backup.filename.ends_with(".cfg"));
        assert_eq!(backup.size, "sysname core-sw-01\nreturn\n".len() as u64);

        let on_disk = fs::read_to_string(&backup.path).unwrap();
        assert_eq!(on_disk, "sysname core-sw-01\nreturn\n");
    }

    #[test]
    fn test_store_accepts_empty_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path());

        let backup = store.store("edge-rt-02", "").unwrap();
        assert_eq!(backup.size, 0);
        assert!(backup.path.exists());
    }
}
