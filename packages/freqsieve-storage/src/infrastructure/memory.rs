//! In-memory adapter for `PartitionStore`
//!
//! Same contract as the filesystem store. Checkpoints are kept in their
//! serialized form so loads go through the same parse/validate path, and
//! every saved block number is recorded for inspection in tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use freqsieve_core::BlockNumber;
use parking_lot::Mutex;

use crate::domain::{
    ArchiveSummary, CheckpointRecord, CompositeMarker, JobKey, PartitionLog, PartitionStore,
    RunParameters,
};
use crate::error::{Result, StorageError};

#[derive(Debug, Default)]
struct JobState {
    checkpoints: HashMap<u32, String>,
    history: HashMap<u32, Vec<BlockNumber>>,
    markers: BTreeMap<u32, CompositeMarker>,
    pending: BTreeMap<u32, PartitionLog>,
    archives: Vec<Vec<PartitionLog>>,
}

/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct InMemoryPartitionStore {
    jobs: Arc<Mutex<HashMap<JobKey, JobState>>>,
    fail_saves: Arc<AtomicBool>,
}

impl InMemoryPartitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every block number saved for a partition, in save order
    pub fn checkpoint_history(&self, job: &JobKey, partition_id: u32) -> Vec<BlockNumber> {
        self.jobs
            .lock()
            .get(job)
            .and_then(|state| state.history.get(&partition_id).cloned())
            .unwrap_or_default()
    }

    /// Overwrite a checkpoint with arbitrary text
    pub fn put_raw_checkpoint(&self, job: &JobKey, partition_id: u32, text: impl Into<String>) {
        self.jobs
            .lock()
            .entry(job.clone())
            .or_default()
            .checkpoints
            .insert(partition_id, text.into());
    }

    /// Make every subsequent checkpoint save fail as if retries were exhausted
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn archive_count(&self, job: &JobKey) -> usize {
        self.jobs
            .lock()
            .get(job)
            .map(|state| state.archives.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl PartitionStore for InMemoryPartitionStore {
    async fn load_checkpoint(
        &self,
        job: &JobKey,
        expected: &RunParameters,
    ) -> Result<Option<CheckpointRecord>> {
        let text = {
            let jobs = self.jobs.lock();
            jobs.get(job)
                .and_then(|state| state.checkpoints.get(&expected.partition_id).cloned())
        };

        match text {
            None => Ok(None),
            Some(text) => {
                let record = CheckpointRecord::from_text(&text)?;
                expected.validate(&record)?;
                Ok(Some(record))
            }
        }
    }

    async fn save_checkpoint(&self, job: &JobKey, record: &CheckpointRecord) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::retry_exhausted(
                format!("memory://{}/partition_{}", job, record.partition_id),
                1,
            ));
        }

        let text = record.to_text()?;
        let mut jobs = self.jobs.lock();
        let state = jobs.entry(job.clone()).or_default();
        state.checkpoints.insert(record.partition_id, text);
        state
            .history
            .entry(record.partition_id)
            .or_default()
            .push(record.last_completed_block.clone());
        Ok(())
    }

    async fn composite_marker(
        &self,
        job: &JobKey,
        partition_id: u32,
    ) -> Result<Option<CompositeMarker>> {
        Ok(self
            .jobs
            .lock()
            .get(job)
            .and_then(|state| state.markers.get(&partition_id).cloned()))
    }

    async fn write_composite_marker(&self, job: &JobKey, marker: &CompositeMarker) -> Result<bool> {
        let mut jobs = self.jobs.lock();
        let state = jobs.entry(job.clone()).or_default();
        if state.markers.contains_key(&marker.partition_id) {
            return Ok(false);
        }
        state.markers.insert(marker.partition_id, marker.clone());
        Ok(true)
    }

    async fn list_composite_markers(&self, job: &JobKey) -> Result<Vec<CompositeMarker>> {
        Ok(self
            .jobs
            .lock()
            .get(job)
            .map(|state| state.markers.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn write_partition_log(&self, job: &JobKey, log: &PartitionLog) -> Result<()> {
        self.jobs
            .lock()
            .entry(job.clone())
            .or_default()
            .pending
            .insert(log.partition_id, log.clone());
        Ok(())
    }

    async fn pending_logs(&self, job: &JobKey) -> Result<Vec<PartitionLog>> {
        Ok(self
            .jobs
            .lock()
            .get(job)
            .map(|state| state.pending.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn archive_pending_logs(&self, job: &JobKey) -> Result<Option<ArchiveSummary>> {
        let mut jobs = self.jobs.lock();
        let Some(state) = jobs.get_mut(job) else {
            return Ok(None);
        };
        if state.pending.is_empty() {
            return Ok(None);
        }

        let bundle: Vec<PartitionLog> = std::mem::take(&mut state.pending).into_values().collect();
        let logs = bundle.len();
        state.archives.push(bundle);
        Ok(Some(ArchiveSummary {
            archive: format!("memory-{}", state.archives.len()),
            logs,
        }))
    }

    async fn archived_logs(&self, job: &JobKey) -> Result<Vec<PartitionLog>> {
        Ok(self
            .jobs
            .lock()
            .get(job)
            .map(|state| state.archives.iter().flatten().cloned().collect())
            .unwrap_or_default())
    }
}
