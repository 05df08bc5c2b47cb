//! Domain layer for the partition store
//!
//! # Core Principles
//!
//! 1. **Job identity**: every artifact is namespaced by a `JobKey` derived
//!    from the target alone, so any number of runners can share one store.
//! 2. **Checkpoint atomicity**: a reader sees either the previous record or
//!    the new one, never a partial write.
//! 3. **Write-once findings**: the first composite marker of a partition wins.
//!
//! # Domain Models
//!
//! - `CheckpointRecord` / `RunParameters`: resumable progress of one partition
//! - `CompositeMarker`: proof of compositeness
//! - `PartitionLog`: immutable record of a finished partition
//!
//! # Port Trait
//!
//! - `PartitionStore`: storage abstraction used by partition runners
//!
//! # Examples
//!
//! ```rust,ignore
//! use freqsieve_storage::domain::{JobKey, PartitionStore, RunParameters};
//!
//! async fn resume_point(
//!     store: &dyn PartitionStore,
//!     params: &RunParameters,
//! ) -> Result<BlockNumber> {
//!     let job = JobKey::from_decimal(&params.target);
//!     Ok(store
//!         .load_checkpoint(&job, params)
//!         .await?
//!         .map(|record| record.next_block())
//!         .unwrap_or_default())
//! }
//! ```

mod checkpoint;
mod records;

pub use checkpoint::{CheckpointRecord, RunParameters, CHECKPOINT_SCHEMA_VERSION};
pub use records::{ArchiveSummary, CompositeMarker, FindingSource, PartitionLog, PartitionOutcome};

use async_trait::async_trait;
use freqsieve_core::Target;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::Result;

// ═══════════════════════════════════════════════════════════════════════════
// Job Identity
// ═══════════════════════════════════════════════════════════════════════════

/// Namespace of one target's artifacts: first 16 hex chars of SHA-256(decimal target)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey(String);

impl JobKey {
    pub fn for_target(target: &Target) -> Self {
        Self::from_decimal(&target.to_decimal())
    }

    pub fn from_decimal(decimal: &str) -> Self {
        let digest = Sha256::digest(decimal.as_bytes());
        let hex = format!("{:x}", digest);
        Self(hex[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Port Trait
// ═══════════════════════════════════════════════════════════════════════════

/// Durable state shared by all runners of a job
///
/// Implementations must be safe to use from many runners at once. Runners
/// only ever touch their own partition's checkpoint; markers and logs are
/// per-partition files as well, so the only cross-runner coordination is
/// archiving.
#[async_trait]
pub trait PartitionStore: Send + Sync {
    /// Load the checkpoint of `expected.partition_id`.
    ///
    /// `Ok(None)` when no checkpoint exists. A record that cannot be parsed
    /// is `CheckpointCorrupt`; one written for other parameters is
    /// `CheckpointMismatch`.
    async fn load_checkpoint(
        &self,
        job: &JobKey,
        expected: &RunParameters,
    ) -> Result<Option<CheckpointRecord>>;

    /// Atomically replace the checkpoint of `record.partition_id`
    async fn save_checkpoint(&self, job: &JobKey, record: &CheckpointRecord) -> Result<()>;

    /// Existing composite marker of a partition
    async fn composite_marker(&self, job: &JobKey, partition_id: u32)
        -> Result<Option<CompositeMarker>>;

    /// Write a marker unless one already exists for that partition.
    ///
    /// Returns `false` when an earlier marker was kept.
    async fn write_composite_marker(&self, job: &JobKey, marker: &CompositeMarker) -> Result<bool>;

    /// All markers of the job, ordered by partition id
    async fn list_composite_markers(&self, job: &JobKey) -> Result<Vec<CompositeMarker>>;

    /// Record a finished partition (pending until archived)
    async fn write_partition_log(&self, job: &JobKey, log: &PartitionLog) -> Result<()>;

    /// Logs not yet archived, ordered by partition id
    async fn pending_logs(&self, job: &JobKey) -> Result<Vec<PartitionLog>>;

    /// Number of logs not yet archived
    async fn pending_log_count(&self, job: &JobKey) -> Result<usize> {
        Ok(self.pending_logs(job).await?.len())
    }

    /// Bundle every pending log into one archive; `None` when nothing was pending
    async fn archive_pending_logs(&self, job: &JobKey) -> Result<Option<ArchiveSummary>>;

    /// Logs from every archive of the job
    async fn archived_logs(&self, job: &JobKey) -> Result<Vec<PartitionLog>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_key_is_stable_prefix_of_sha256() {
        let key = JobKey::for_target(&Target::from_u64(35).unwrap());
        assert_eq!(key.as_str().len(), 16);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, JobKey::from_decimal("35"));
        assert_ne!(key, JobKey::from_decimal("37"));
    }

    #[test]
    fn test_job_key_of_expression_uses_decimal_form() {
        let expr: Target = "2**7 + 3".parse().unwrap();
        assert_eq!(JobKey::for_target(&expr), JobKey::from_decimal("131"));
    }
}
