// quillbase-core/src/storage/file_storage.rs
//! Crash-safe file backend
//!
//! Two paths exist at any time: `<name>` (live) and `<name>~` (in-flight
//! temp). A full rewrite goes through the temp file and an atomic rename, so
//! readers of `<name>` never observe a zero-byte or truncated state.

use crate::error::Result;
use crate::storage::Storage;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Production storage backend.
#[derive(Debug, Default, Clone)]
pub struct FileStorage;

impl FileStorage {
    pub fn new() -> Self {
        FileStorage
    }

    fn temp_path(name: &str) -> PathBuf {
        PathBuf::from(format!("{}~", name))
    }

    /// Fsync the directory holding `path`. Failures are swallowed: not every
    /// platform lets a directory be opened for syncing.
    fn flush_directory(path: &Path) {
        if let Some(parent) = path.parent() {
            let dir = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            if let Ok(handle) = File::open(dir) {
                let _ = handle.sync_all();
            }
        }
    }

    /// Crash-recovery check run before every open:
    ///
    /// - neither file exists → create an empty live file
    /// - only the live file → use it
    /// - only the temp file → an initial write was interrupted, rename it
    /// - both → an interrupted compaction; the old live data is
    ///   authoritative, the temp file is dropped
    pub fn ensure_datafile_integrity(name: &str) -> Result<()> {
        let live = Path::new(name);
        let temp = Self::temp_path(name);

        match (live.exists(), temp.exists()) {
            (false, false) => {
                if let Some(parent) = live.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                let file = File::create(live)?;
                file.sync_all()?;
                Self::flush_directory(live);
                Ok(())
            }
            (true, false) => Ok(()),
            (false, true) => {
                std::fs::rename(&temp, live)?;
                Self::flush_directory(live);
                Ok(())
            }
            (true, true) => {
                std::fs::remove_file(&temp)?;
                Ok(())
            }
        }
    }
}

impl Storage for FileStorage {
    fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        Self::ensure_datafile_integrity(name)?;
        Ok(std::fs::read(name)?)
    }

    fn append(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(name)?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    }

    fn write(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let live = Path::new(name);
        let temp = Self::temp_path(name);

        Self::flush_directory(live);
        if live.exists() {
            File::open(live)?.sync_all()?;
        }

        let mut temp_file = File::create(&temp)?;
        temp_file.write_all(data)?;
        temp_file.sync_all()?;
        drop(temp_file);

        std::fs::rename(&temp, live)?;
        Self::flush_directory(live);
        Ok(())
    }
}
