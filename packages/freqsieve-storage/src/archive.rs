//! Job Log Archiver
//!
//! Bundles pending partition logs into one gzip-compressed JSON-lines file
//! and removes the raw logs.
//!
//! ```text
//! logs/partition_*.json ──rename──> logs/.staging-<claim>/   (claim)
//!                                          │ read + encode
//!                                          ▼
//!                     archives/logs_<UTC>_<claim>.jsonl.gz   (atomic write)
//!                                          │
//!                                 delete staged raw logs
//! ```
//!
//! The rename is the claim: two archivers racing over the same logs can each
//! move a given file only once, so no log lands in two archives. A log is
//! deleted only after the archive holding it is durably in place.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};
use tracing::{debug, info, warn};

use crate::domain::{ArchiveSummary, PartitionLog};
use crate::error::{Result, StorageError};
use crate::infrastructure::fs::atomic::{atomic_write, ReplacePolicy};
use crate::infrastructure::fs::layout::{JobLayout, ARCHIVE_SUFFIX};
use crate::infrastructure::fs::list_record_files;

/// Archiver for one job directory
#[derive(Debug, Clone)]
pub struct LogArchiver {
    layout: JobLayout,
    policy: ReplacePolicy,
}

impl LogArchiver {
    pub fn new(layout: JobLayout, policy: ReplacePolicy) -> Self {
        Self { layout, policy }
    }

    /// Raw logs currently waiting in the logs directory
    pub async fn pending_count(&self) -> Result<usize> {
        Ok(list_record_files(&self.layout.logs_dir()).await?.len())
    }

    /// Claim, bundle and remove every pending log.
    ///
    /// Returns `None` when there was nothing to claim (including when a
    /// concurrent archiver claimed everything first).
    pub async fn archive_pending(&self) -> Result<Option<ArchiveSummary>> {
        let logs_dir = self.layout.logs_dir();
        let names = list_record_files(&logs_dir).await?;
        if names.is_empty() {
            return Ok(None);
        }

        let claim = uuid::Uuid::new_v4().simple().to_string();
        let staging = self.layout.staging_dir(&claim);
        tokio::fs::create_dir_all(&staging).await?;

        let mut claimed = Vec::with_capacity(names.len());
        for name in &names {
            let from = logs_dir.join(name);
            let to = staging.join(name);
            match tokio::fs::rename(&from, &to).await {
                Ok(()) => claimed.push(to),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Log {} already claimed by another archiver", name);
                }
                Err(err) => {
                    self.release(&staging, &claimed).await;
                    return Err(err.into());
                }
            }
        }

        if claimed.is_empty() {
            let _ = tokio::fs::remove_dir(&staging).await;
            return Ok(None);
        }

        let bundle = match read_logs(&claimed).await.and_then(|logs| encode_archive(&logs)) {
            Ok(bundle) => bundle,
            Err(err) => {
                self.release(&staging, &claimed).await;
                return Err(err);
            }
        };

        let name = archive_name(Utc::now(), &claim);
        let path = self.layout.archives_dir().join(&name);
        if let Err(err) = atomic_write(&path, &bundle, self.policy).await {
            self.release(&staging, &claimed).await;
            return Err(err);
        }

        for staged in &claimed {
            if let Err(err) = tokio::fs::remove_file(staged).await {
                warn!("Failed to remove archived log {}: {}", staged.display(), err);
            }
        }
        let _ = tokio::fs::remove_dir(&staging).await;

        info!("Archived {} partition logs into {}", claimed.len(), name);
        Ok(Some(ArchiveSummary {
            archive: name,
            logs: claimed.len(),
        }))
    }

    /// Every log from every archive of this job, oldest archive first
    pub async fn archived_logs(&self) -> Result<Vec<PartitionLog>> {
        let mut logs = Vec::new();
        for path in self.archive_paths().await? {
            logs.extend(read_archive(&path).await?);
        }
        Ok(logs)
    }

    pub async fn archive_paths(&self) -> Result<Vec<PathBuf>> {
        let dir = self.layout.archives_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with('.') && name.ends_with(ARCHIVE_SUFFIX) {
                paths.push(entry.path());
            }
        }
        // Names start with a UTC timestamp
        paths.sort();
        Ok(paths)
    }

    /// Return claimed logs to the pending set after a failed pass
    async fn release(&self, staging: &Path, claimed: &[PathBuf]) {
        let logs_dir = self.layout.logs_dir();
        for staged in claimed {
            if let Some(name) = staged.file_name() {
                if let Err(err) = tokio::fs::rename(staged, logs_dir.join(name)).await {
                    warn!("Failed to release claimed log {}: {}", staged.display(), err);
                }
            }
        }
        let _ = tokio::fs::remove_dir(staging).await;
    }
}

async fn read_logs(paths: &[PathBuf]) -> Result<Vec<PartitionLog>> {
    let mut logs = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path).await?;
        let log: PartitionLog = serde_json::from_slice(&bytes).map_err(|e| {
            StorageError::archive(format!("Unreadable log {}: {}", path.display(), e))
                .with_source(e)
        })?;
        logs.push(log);
    }
    logs.sort_by_key(|log| log.partition_id);
    Ok(logs)
}

fn archive_name(now: DateTime<Utc>, claim: &str) -> String {
    format!(
        "logs_{}_{}{}",
        now.format("%Y%m%dT%H%M%S%.3fZ"),
        &claim[..8.min(claim.len())],
        ARCHIVE_SUFFIX
    )
}

/// Gzip-compressed JSON lines, one log per line
pub fn encode_archive(logs: &[PartitionLog]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut enc = GzBuilder::new()
        .filename("partition_logs.jsonl")
        .write(&mut out, Compression::default());
    for log in logs {
        serde_json::to_writer(&mut enc, log)?;
        enc.write_all(b"\n").map_err(|e| {
            StorageError::archive(format!("gzip write failed: {}", e)).with_source(e)
        })?;
    }
    enc.finish()
        .map_err(|e| StorageError::archive(format!("gzip finish failed: {}", e)).with_source(e))?;
    Ok(out)
}

pub fn decode_archive(bytes: &[u8]) -> Result<Vec<PartitionLog>> {
    let reader = BufReader::new(GzDecoder::new(bytes));
    let mut logs = Vec::new();
    for line in reader.lines() {
        let line = line
            .map_err(|e| StorageError::archive(format!("gzip read failed: {}", e)).with_source(e))?;
        if line.trim().is_empty() {
            continue;
        }
        logs.push(serde_json::from_str(&line)?);
    }
    Ok(logs)
}

/// Read one archive file
pub async fn read_archive(path: &Path) -> Result<Vec<PartitionLog>> {
    let bytes = tokio::fs::read(path).await?;
    decode_archive(&bytes)
}
