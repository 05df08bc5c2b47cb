//! Job status aggregation
//!
//! Combines composite markers, pending logs and archived logs of one job
//! into a single verdict. Any marker proves the target composite; a
//! `completed` log for every partition is evidence of primality. Logs
//! written for a different partition count are ignored.

use std::collections::BTreeSet;

use freqsieve_core::Target;
use freqsieve_storage::{CompositeMarker, JobKey, PartitionOutcome, PartitionStore};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum JobVerdict {
    Composite { markers: Vec<CompositeMarker> },
    ProbablePrime,
    Incomplete { missing: Vec<u32> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job: JobKey,
    pub target: String,
    pub total_partitions: u32,
    pub verdict: JobVerdict,
    /// Partitions with a `completed` log
    pub completed: Vec<u32>,
    pub pending_logs: usize,
    pub archived_logs: usize,
}

impl JobStatus {
    pub async fn collect(
        store: &dyn PartitionStore,
        target: &Target,
        total_partitions: u32,
    ) -> Result<Self> {
        let job = JobKey::for_target(target);
        let markers = store.list_composite_markers(&job).await?;
        let pending = store.pending_logs(&job).await?;
        let archived = store.archived_logs(&job).await?;

        let completed: BTreeSet<u32> = pending
            .iter()
            .chain(archived.iter())
            .filter(|log| {
                log.total_partitions == total_partitions
                    && log.partition_id < total_partitions
                    && log.outcome == PartitionOutcome::Completed
            })
            .map(|log| log.partition_id)
            .collect();

        let verdict = if !markers.is_empty() {
            JobVerdict::Composite { markers }
        } else {
            let missing: Vec<u32> = (0..total_partitions)
                .filter(|id| !completed.contains(id))
                .collect();
            if missing.is_empty() {
                JobVerdict::ProbablePrime
            } else {
                JobVerdict::Incomplete { missing }
            }
        };

        Ok(Self {
            job,
            target: target.to_decimal(),
            total_partitions,
            verdict,
            completed: completed.into_iter().collect(),
            pending_logs: pending.len(),
            archived_logs: archived.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freqsieve_storage::{InMemoryPartitionStore, PartitionLog};

    fn completed_log(id: u32, total: u32) -> PartitionLog {
        PartitionLog::new(id, total, PartitionOutcome::Completed, 3u32, 3, 1, "w")
    }

    #[tokio::test]
    async fn test_incomplete_lists_missing_partitions() {
        let store = InMemoryPartitionStore::new();
        let target = Target::from_u64(7919).unwrap();
        let job = JobKey::for_target(&target);
        store.write_partition_log(&job, &completed_log(1, 3)).await.unwrap();

        let status = JobStatus::collect(&store, &target, 3).await.unwrap();
        assert_eq!(status.verdict, JobVerdict::Incomplete { missing: vec![0, 2] });
        assert_eq!(status.completed, vec![1]);
    }

    #[tokio::test]
    async fn test_prime_across_pending_and_archived_logs() {
        let store = InMemoryPartitionStore::new();
        let target = Target::from_u64(7919).unwrap();
        let job = JobKey::for_target(&target);
        store.write_partition_log(&job, &completed_log(0, 2)).await.unwrap();
        store.archive_pending_logs(&job).await.unwrap();
        store.write_partition_log(&job, &completed_log(1, 2)).await.unwrap();

        let status = JobStatus::collect(&store, &target, 2).await.unwrap();
        assert_eq!(status.verdict, JobVerdict::ProbablePrime);
        assert_eq!(status.pending_logs, 1);
        assert_eq!(status.archived_logs, 1);

        // Logs of another partitioning do not count
        let other = JobStatus::collect(&store, &target, 3).await.unwrap();
        assert_eq!(other.verdict, JobVerdict::Incomplete { missing: vec![0, 1, 2] });
    }

    #[tokio::test]
    async fn test_marker_proves_composite() {
        let store = InMemoryPartitionStore::new();
        let target = Target::from_u64(35).unwrap();
        let job = JobKey::for_target(&target);
        let marker = CompositeMarker::from_prefilter(0, 5, &target);
        store.write_composite_marker(&job, &marker).await.unwrap();

        let status = JobStatus::collect(&store, &target, 4).await.unwrap();
        match status.verdict {
            JobVerdict::Composite { markers } => assert_eq!(markers.len(), 1),
            other => panic!("expected composite verdict, got {:?}", other),
        }
    }
}
