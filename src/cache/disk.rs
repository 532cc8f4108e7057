//! Disk Tier - File-per-Entry Persistent Cache
//!
//! Each entry lives in `<cache_dir>/<sha256(key) hex>` as a bincode-encoded
//! [`DiskRecord`]. Writes land in a uniquely named temporary file in the same
//! directory and are renamed into place, so a reader never observes a
//! partially written record.
//!
//! # File Layout
//!
//! ```text
//! <cache_dir>/
//!   3a7bd3e2360a3d29eea436fcfb7e44c735d117c42d1c1835420b6b9942dd4f1b   <- record
//!   .3a7bd3e2...<uuid>.tmp                                            <- in-flight write
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::codec::content_hash;
use super::entry::CacheEntry;
use super::DISK_FORMAT_VERSION;
use crate::error::{Error, Result};

/// On-disk representation of an entry
#[derive(Debug, Serialize, Deserialize)]
struct DiskRecord {
    version: u16,
    entry: CacheEntry,
}

#[derive(Serialize)]
struct DiskRecordRef<'a> {
    version: u16,
    entry: &'a CacheEntry,
}

/// Disk usage totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
    pub bytes: u64,
    pub files: u64,
}

/// A file found while scanning the cache directory
#[derive(Debug)]
struct DiskFile {
    path: PathBuf,
    size: u64,
    born: SystemTime,
}

/// Disk tier
#[derive(Debug, Clone)]
pub struct DiskTier {
    dir: PathBuf,
}

impl DiskTier {
    /// Open (creating if needed) the tier rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(content_hash(key))
    }

    /// Atomically write an entry, replacing any previous record for its key
    pub async fn write(&self, entry: &CacheEntry) -> Result<()> {
        let record = DiskRecordRef {
            version: DISK_FORMAT_VERSION,
            entry,
        };
        let bytes = bincode::serialize(&record).map_err(|e| Error::Encode(e.to_string()))?;

        let name = content_hash(entry.key());
        let final_path = self.dir.join(&name);
        let tmp_path = self
            .dir
            .join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()));

        let result = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(&bytes).await?;
            file.sync_data().await?;
            drop(file);
            tokio::fs::rename(&tmp_path, &final_path).await
        }
        .await;

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Read the record for `key`.
    ///
    /// `Ok(None)` when no record exists. Undecodable records are deleted and
    /// reported as [`Error::Corruption`].
    pub async fn read(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let reason = match bincode::deserialize::<DiskRecord>(&bytes) {
            Ok(record) if record.version != DISK_FORMAT_VERSION => {
                format!("unsupported format version {}", record.version)
            }
            // Hash collision: the file belongs to another key
            Ok(record) if record.entry.key() != key => return Ok(None),
            Ok(record) => return Ok(Some(record.entry)),
            Err(e) => e.to_string(),
        };

        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!(path = %path.display(), "Failed to remove corrupt record: {}", e);
        }
        Err(Error::Corruption {
            key: key.to_string(),
            reason,
        })
    }

    /// Delete the record for `key`; `Ok(false)` if there was none
    pub async fn delete(&self, key: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every file in the cache directory; returns the number removed
    pub async fn delete_all(&self) -> Result<u64> {
        let mut removed = 0;
        for file in self.scan().await? {
            if remove_quietly(&file.path).await {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Total bytes and files held by the tier
    pub async fn usage(&self) -> Result<DiskUsage> {
        let files = self.scan().await?;
        Ok(DiskUsage {
            bytes: files.iter().map(|f| f.size).sum(),
            files: files.len() as u64,
        })
    }

    /// Delete files whose filesystem creation time is older than `max_age`
    pub async fn sweep(&self, max_age: Duration) -> Result<u64> {
        let now = SystemTime::now();
        let mut removed = 0;
        for file in self.scan().await? {
            let age = now.duration_since(file.born).unwrap_or(Duration::ZERO);
            if age > max_age && remove_quietly(&file.path).await {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Delete oldest files until usage is within `max_bytes`
    pub async fn enforce_budget(&self, max_bytes: u64) -> Result<u64> {
        let mut files = self.scan().await?;
        let mut usage: u64 = files.iter().map(|f| f.size).sum();
        if usage <= max_bytes {
            return Ok(0);
        }

        files.sort_by_key(|f| f.born);
        let mut removed = 0;
        for file in files {
            if usage <= max_bytes {
                break;
            }
            if remove_quietly(&file.path).await {
                usage = usage.saturating_sub(file.size);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn scan(&self) -> Result<Vec<DiskFile>> {
        let mut files = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let meta = match item.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                // Raced with a concurrent delete
                Err(_) => continue,
            };
            // Not every filesystem records a birth time
            let born = meta
                .created()
                .or_else(|_| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            files.push(DiskFile {
                path: item.path(),
                size: meta.len(),
                born,
            });
        }
        Ok(files)
    }
}

async fn remove_quietly(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), "Failed to remove cache file: {}", e);
            false
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
