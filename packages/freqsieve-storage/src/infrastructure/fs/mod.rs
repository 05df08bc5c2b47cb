//! Filesystem adapter for `PartitionStore`
//!
//! Checkpoints are replaced atomically with retry; composite markers are
//! created write-once; partition logs are plain JSON files until the
//! archiver bundles them.

pub mod atomic;
pub mod layout;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::archive::LogArchiver;
use crate::domain::{
    ArchiveSummary, CheckpointRecord, CompositeMarker, JobKey, PartitionLog, PartitionStore,
    RunParameters,
};
use crate::error::{Result, StorageError};

pub use atomic::{atomic_create, atomic_write, replace_with_retry, ReplacePolicy};
pub use layout::{JobLayout, StorageLayout};

/// Store rooted at an injected directory
#[derive(Debug, Clone)]
pub struct FsPartitionStore {
    layout: StorageLayout,
    policy: ReplacePolicy,
}

impl FsPartitionStore {
    pub fn new(root: impl Into<PathBuf>, policy: ReplacePolicy) -> Self {
        Self {
            layout: StorageLayout::new(root),
            policy,
        }
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn layout(&self, job: &JobKey) -> JobLayout {
        self.layout.job(job)
    }

    pub fn archiver(&self, job: &JobKey) -> LogArchiver {
        LogArchiver::new(self.layout.job(job), self.policy)
    }
}

#[async_trait]
impl PartitionStore for FsPartitionStore {
    async fn load_checkpoint(
        &self,
        job: &JobKey,
        expected: &RunParameters,
    ) -> Result<Option<CheckpointRecord>> {
        let path = self.layout.job(job).checkpoint_path(expected.partition_id);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) if err.kind() == std::io::ErrorKind::InvalidData => {
                return Err(StorageError::checkpoint_corrupt(format!(
                    "checkpoint {} is not UTF-8",
                    path.display()
                ))
                .with_source(err))
            }
            Err(err) => return Err(err.into()),
        };

        let record = CheckpointRecord::from_text(&text)?;
        expected.validate(&record)?;
        debug!(
            "Loaded checkpoint {}: last completed block {}",
            path.display(),
            record.last_completed_block
        );
        Ok(Some(record))
    }

    async fn save_checkpoint(&self, job: &JobKey, record: &CheckpointRecord) -> Result<()> {
        let path = self.layout.job(job).checkpoint_path(record.partition_id);
        let text = record.to_text()?;
        atomic_write(&path, text.as_bytes(), self.policy).await
    }

    async fn composite_marker(
        &self,
        job: &JobKey,
        partition_id: u32,
    ) -> Result<Option<CompositeMarker>> {
        let path = self.layout.job(job).composite_path(partition_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_composite_marker(&self, job: &JobKey, marker: &CompositeMarker) -> Result<bool> {
        let path = self.layout.job(job).composite_path(marker.partition_id);
        let bytes = serde_json::to_vec_pretty(marker)?;
        let created = atomic_create(&path, &bytes).await?;
        if created {
            info!(
                "Composite marker written for partition {} (factor {})",
                marker.partition_id, marker.factor
            );
        } else {
            debug!(
                "Composite marker for partition {} already present, kept",
                marker.partition_id
            );
        }
        Ok(created)
    }

    async fn list_composite_markers(&self, job: &JobKey) -> Result<Vec<CompositeMarker>> {
        let dir = self.layout.job(job).composite_dir();
        let mut markers: Vec<CompositeMarker> = read_records(&dir).await?;
        markers.sort_by_key(|m| m.partition_id);
        Ok(markers)
    }

    async fn write_partition_log(&self, job: &JobKey, log: &PartitionLog) -> Result<()> {
        let path = self.layout.job(job).log_path(log.partition_id);
        let bytes = serde_json::to_vec_pretty(log)?;
        atomic_write(&path, &bytes, self.policy).await
    }

    async fn pending_logs(&self, job: &JobKey) -> Result<Vec<PartitionLog>> {
        let dir = self.layout.job(job).logs_dir();
        let mut logs: Vec<PartitionLog> = read_records(&dir).await?;
        logs.sort_by_key(|l| l.partition_id);
        Ok(logs)
    }

    async fn pending_log_count(&self, job: &JobKey) -> Result<usize> {
        self.archiver(job).pending_count().await
    }

    async fn archive_pending_logs(&self, job: &JobKey) -> Result<Option<ArchiveSummary>> {
        self.archiver(job).archive_pending().await
    }

    async fn archived_logs(&self, job: &JobKey) -> Result<Vec<PartitionLog>> {
        self.archiver(job).archived_logs().await
    }
}

/// Names of visible `partition_<id>.json` files in `dir`, sorted
pub(crate) async fn list_record_files(dir: &Path) -> Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if layout::is_record_file(&name) && entry.file_type().await?.is_file() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

async fn read_records<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut records = Vec::new();
    for name in list_record_files(dir).await? {
        match tokio::fs::read(dir.join(&name)).await {
            Ok(bytes) => records.push(serde_json::from_slice(&bytes)?),
            // Claimed by an archiver between listing and reading
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(records)
}
