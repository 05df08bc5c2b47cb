//! On-disk layout
//!
//! ```text
//! <root>/jobs/<job_key>/
//!   checkpoints/partition_<id>.ckpt
//!   composite/partition_<id>.json
//!   logs/partition_<id>.json
//!   logs/.staging-<uuid>/            (claimed by a running archiver)
//!   archives/logs_<timestamp>_<suffix>.jsonl.gz
//! ```

use std::path::{Path, PathBuf};

use crate::domain::JobKey;

pub(crate) const STAGING_PREFIX: &str = ".staging-";
pub(crate) const ARCHIVE_SUFFIX: &str = ".jsonl.gz";

/// Storage root (injected, never derived from the working directory)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job(&self, job: &JobKey) -> JobLayout {
        JobLayout {
            dir: self.root.join("jobs").join(job.as_str()),
        }
    }
}

/// Paths of one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLayout {
    dir: PathBuf,
}

impl JobLayout {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.dir.join("checkpoints")
    }

    pub fn checkpoint_path(&self, partition_id: u32) -> PathBuf {
        self.checkpoints_dir()
            .join(format!("partition_{}.ckpt", partition_id))
    }

    pub fn composite_dir(&self) -> PathBuf {
        self.dir.join("composite")
    }

    pub fn composite_path(&self, partition_id: u32) -> PathBuf {
        self.composite_dir()
            .join(format!("partition_{}.json", partition_id))
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.dir.join("logs")
    }

    pub fn log_path(&self, partition_id: u32) -> PathBuf {
        self.logs_dir().join(format!("partition_{}.json", partition_id))
    }

    pub fn staging_dir(&self, claim: &str) -> PathBuf {
        self.logs_dir().join(format!("{}{}", STAGING_PREFIX, claim))
    }

    pub fn archives_dir(&self) -> PathBuf {
        self.dir.join("archives")
    }
}

/// Visible `partition_<id>.json` files (skips temp files and staging dirs)
pub(crate) fn is_record_file(name: &str) -> bool {
    !name.starts_with('.') && name.starts_with("partition_") && name.ends_with(".json")
}
