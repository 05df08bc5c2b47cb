//! Archive trigger
//!
//! Runs the job log archiver once the number of pending partition logs
//! reaches a threshold. Runners call it after writing their log; the CLI
//! can force a pass regardless of the threshold.

use std::sync::Arc;

use freqsieve_storage::{ArchiveSummary, JobKey, PartitionStore};
use tracing::{debug, info};

use crate::error::Result;

/// Default pending-log count that triggers archiving
pub const DEFAULT_ARCHIVE_THRESHOLD: usize = 100;

#[derive(Clone)]
pub struct ArchiveTrigger {
    store: Arc<dyn PartitionStore>,
    threshold: usize,
}

impl ArchiveTrigger {
    pub fn new(store: Arc<dyn PartitionStore>, threshold: usize) -> Self {
        Self {
            store,
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Archive when at least `threshold` logs are pending
    pub async fn maybe_archive(&self, job: &JobKey) -> Result<Option<ArchiveSummary>> {
        let pending = self.store.pending_log_count(job).await?;
        if pending < self.threshold {
            debug!(
                "{} pending logs for job {} (threshold {})",
                pending, job, self.threshold
            );
            return Ok(None);
        }

        info!(
            "Pending logs for job {} reached {} (threshold {}), archiving",
            job, pending, self.threshold
        );
        self.force(job).await
    }

    /// Archive whatever is pending
    pub async fn force(&self, job: &JobKey) -> Result<Option<ArchiveSummary>> {
        Ok(self.store.archive_pending_logs(job).await?)
    }
}
