//! Partition runner integration tests

use std::sync::Arc;
use std::time::Duration;

use freqsieve_core::{Prefilter, Target};
use freqsieve_orchestration::*;
use freqsieve_storage::{
    FindingSource, FsPartitionStore, InMemoryPartitionStore, JobKey, PartitionOutcome,
    PartitionStore, ReplacePolicy, RunParameters,
};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const COMPOSITE: u64 = 1_022_117; // 1009 * 1013
const PRIME: u64 = 7919;

fn target(n: u64) -> Target {
    Target::from_u64(n).unwrap()
}

fn runner(
    n: u64,
    config: RunnerConfig,
    store: &InMemoryPartitionStore,
) -> PartitionRunner {
    PartitionRunner::new(target(n), config, Arc::new(store.clone())).unwrap()
}

async fn run(runner: &PartitionRunner) -> PartitionReport {
    runner.run(CancellationToken::new()).await.unwrap()
}

fn block(n: u32) -> BigUint {
    BigUint::from(n)
}

/// Saved checkpoint blocks of partition `pid`, in save order
fn history(store: &InMemoryPartitionStore, n: u64, pid: u32) -> Vec<u64> {
    let job = JobKey::for_target(&target(n));
    store
        .checkpoint_history(&job, pid)
        .iter()
        .map(|b| b.to_u64().unwrap())
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// Outcomes
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_composite_found_in_fourth_block() {
    let store = InMemoryPartitionStore::new();
    let r = runner(COMPOSITE, RunnerConfig::new(0, 1, 100), &store);

    let report = run(&r).await;
    let marker = match report.outcome {
        RunOutcome::CompositeFound(marker) => marker,
        other => panic!("expected composite, got {:?}", other),
    };
    assert_eq!(marker.factor, "1009");
    assert_eq!(marker.cofactor, "1013");
    assert_eq!(marker.block, Some(block(3)));
    assert_eq!(marker.index.as_deref(), Some("335"));
    assert_eq!(marker.source, FindingSource::Scan);
    assert_eq!(report.total_blocks, block(11));
    assert_eq!(report.blocks_scanned, 4);
    assert_eq!(report.state.state_name(), "composite_found");

    // Blocks before the collision were checkpointed, the colliding one was not
    let job = JobKey::for_target(&target(COMPOSITE));
    assert_eq!(history(&store, COMPOSITE, 0), vec![0, 1, 2]);
    assert!(store.composite_marker(&job, 0).await.unwrap().is_some());
}

#[tokio::test]
async fn test_small_composite_collides_at_first_index() {
    let store = InMemoryPartitionStore::new();
    let report = run(&runner(35, RunnerConfig::new(0, 1, 10), &store)).await;
    match report.outcome {
        RunOutcome::CompositeFound(marker) => {
            assert_eq!(marker.factor, "5");
            assert_eq!(marker.cofactor, "7");
            assert_eq!(marker.block, Some(BigUint::zero()));
        }
        other => panic!("expected composite, got {:?}", other),
    }
}

#[tokio::test]
async fn test_hardened_prefilter_decides_without_scanning() {
    let store = InMemoryPartitionStore::new();
    let config = RunnerConfig::new(0, 1, 10).with_prefilter(Prefilter::hardened());
    let report = run(&runner(35, config, &store)).await;

    match report.outcome {
        RunOutcome::CompositeFound(marker) => {
            assert_eq!(marker.factor, "5");
            assert_eq!(marker.source, FindingSource::Prefilter);
            assert_eq!(marker.block, None);
        }
        other => panic!("expected composite, got {:?}", other),
    }
    assert_eq!(report.blocks_scanned, 0);

    // Excluded primes complete immediately
    let config = RunnerConfig::new(0, 1, 10).with_prefilter(Prefilter::hardened());
    let report = run(&runner(7, config, &store)).await;
    assert_eq!(report.outcome, RunOutcome::Completed);
}

#[tokio::test]
async fn test_huge_target_composite_in_first_block() {
    // floor(sqrt(10^100 + 25)) needs 167 bits
    let huge: Target = "10**100 + 25".parse().unwrap();
    let store = InMemoryPartitionStore::new();
    let r = PartitionRunner::new(
        huge.clone(),
        RunnerConfig::new(0, 1, 1000),
        Arc::new(store.clone()),
    )
    .unwrap();

    let report = run(&r).await;
    let marker = match report.outcome {
        RunOutcome::CompositeFound(marker) => marker,
        other => panic!("expected composite, got {:?}", other),
    };
    assert_eq!(marker.factor, "5");
    assert_eq!(marker.block, Some(BigUint::zero()));
    assert_eq!(marker.index.as_deref(), Some("0"));
    assert_eq!(report.blocks_scanned, 1);
    assert!(report.total_blocks.bits() > 128);

    let status = JobStatus::collect(&store, &huge, 1).await.unwrap();
    assert!(matches!(status.verdict, JobVerdict::Composite { .. }));
}

#[tokio::test]
async fn test_huge_partition_past_collision_range_completes_without_scanning() {
    // The last quarter of [0, sqrt(X)] lies beyond the first index with a(c) > sqrt(X)
    let huge: Target = "10**100 + 25".parse().unwrap();
    let store = InMemoryPartitionStore::new();
    let r = PartitionRunner::new(
        huge.clone(),
        RunnerConfig::new(3, 4, 1000),
        Arc::new(store.clone()),
    )
    .unwrap();

    let report = run(&r).await;
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.blocks_scanned, 0);

    let saved = store.checkpoint_history(&JobKey::for_target(&huge), 3);
    assert_eq!(saved, vec![&report.total_blocks - 1u32]);
    assert!(saved[0].bits() > 64);
}

#[tokio::test]
async fn test_prime_checkpoints_tail_once() {
    let store = InMemoryPartitionStore::new();
    let report = run(&runner(PRIME, RunnerConfig::new(0, 1, 10), &store)).await;

    // sqrt(7919) = 88; a(c) > 88 from c = 28, so blocks 3..=8 need no scan
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.total_blocks, block(9));
    assert_eq!(report.blocks_scanned, 3);
    assert_eq!(report.state.state_name(), "completed");
    assert_eq!(history(&store, PRIME, 0), vec![0, 1, 2, 8]);

    let status = JobStatus::collect(&store, &target(PRIME), 1).await.unwrap();
    assert_eq!(status.verdict, JobVerdict::ProbablePrime);
}

// ═══════════════════════════════════════════════════════════════════════════
// Interruption and resume
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_cancelled_before_first_block() {
    let store = InMemoryPartitionStore::new();
    let r = runner(PRIME, RunnerConfig::new(0, 1, 10), &store);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = r.run(cancel).await.unwrap();
    let resume_block = BigUint::zero();
    assert_eq!(report.outcome, RunOutcome::Interrupted { resume_block });
    assert_eq!(report.blocks_scanned, 0);
    assert_eq!(report.state.state_name(), "interrupted");

    // No partition log for an unfinished run
    let job = JobKey::for_target(&target(PRIME));
    assert_eq!(store.pending_log_count(&job).await.unwrap(), 0);
}

#[tokio::test]
async fn test_resume_one_block_at_a_time_matches_single_pass() {
    let store = InMemoryPartitionStore::new();
    let r = runner(PRIME, RunnerConfig::new(0, 1, 10).with_max_blocks(1), &store);

    let mut runs = 0;
    loop {
        runs += 1;
        let report = run(&r).await;
        match report.outcome {
            RunOutcome::Interrupted { resume_block } => assert_eq!(resume_block, block(runs)),
            RunOutcome::Completed => break,
            other => panic!("unexpected outcome {:?}", other),
        }
    }
    assert_eq!(runs, 4);
    assert_eq!(history(&store, PRIME, 0), vec![0, 1, 2, 8]);
}

#[tokio::test]
async fn test_rerun_after_completion_scans_nothing() {
    let store = InMemoryPartitionStore::new();
    let r = runner(PRIME, RunnerConfig::new(0, 1, 10), &store);
    run(&r).await;

    let report = run(&r).await;
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.blocks_scanned, 0);
}

#[tokio::test]
async fn test_existing_marker_short_circuits() {
    let store = InMemoryPartitionStore::new();
    let first = run(&runner(COMPOSITE, RunnerConfig::new(0, 1, 100), &store)).await;
    let second = run(&runner(COMPOSITE, RunnerConfig::new(0, 1, 100), &store)).await;

    assert_eq!(second.blocks_scanned, 0);
    match (first.outcome, second.outcome) {
        (RunOutcome::CompositeFound(a), RunOutcome::CompositeFound(b)) => assert_eq!(a, b),
        other => panic!("expected two composite outcomes, got {:?}", other),
    }

    let job = JobKey::for_target(&target(COMPOSITE));
    assert_eq!(store.list_composite_markers(&job).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_marker_reentry_logs_same_completed_blocks() {
    let store = InMemoryPartitionStore::new();
    let job = JobKey::for_target(&target(COMPOSITE));

    run(&runner(COMPOSITE, RunnerConfig::new(0, 1, 100), &store)).await;
    let first = store.pending_logs(&job).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].outcome, PartitionOutcome::Composite);
    assert_eq!(first[0].blocks_completed, block(3));
    assert_eq!(first[0].blocks_scanned, 4);

    run(&runner(COMPOSITE, RunnerConfig::new(0, 1, 100), &store)).await;
    let second = store.pending_logs(&job).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].blocks_completed, first[0].blocks_completed);
    assert_eq!(second[0].blocks_scanned, 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// Aborts
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_checkpoint_from_other_parameters_aborts() {
    let store = InMemoryPartitionStore::new();
    let job = JobKey::for_target(&target(PRIME));
    let foreign = RunParameters::new(&target(PRIME), 20, 1, 0).checkpoint(2u32);
    store.put_raw_checkpoint(&job, 0, foreign.to_text().unwrap());

    let err = runner(PRIME, RunnerConfig::new(0, 1, 10), &store)
        .run(CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.failed_invariant(), "checkpoint mismatch");
    assert_eq!(err.category(), ErrorCategory::Permanent);
    assert!(store.checkpoint_history(&job, 0).is_empty());
}

#[tokio::test]
async fn test_corrupt_checkpoint_aborts() {
    let store = InMemoryPartitionStore::new();
    let job = JobKey::for_target(&target(PRIME));
    store.put_raw_checkpoint(&job, 0, "last_completed_block: [");

    let err = runner(PRIME, RunnerConfig::new(0, 1, 10), &store)
        .run(CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.failed_invariant(), "checkpoint corruption");
}

#[tokio::test]
async fn test_checkpoint_past_last_block_aborts() {
    let store = InMemoryPartitionStore::new();
    let job = JobKey::for_target(&target(PRIME));
    let beyond = RunParameters::new(&target(PRIME), 10, 1, 0).checkpoint(40u32);
    store.put_raw_checkpoint(&job, 0, beyond.to_text().unwrap());

    let err = runner(PRIME, RunnerConfig::new(0, 1, 10), &store)
        .run(CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.failed_invariant(), "checkpoint corruption");
}

#[tokio::test]
async fn test_failed_checkpoint_save_aborts() {
    let store = InMemoryPartitionStore::new();
    store.fail_saves(true);

    let err = runner(PRIME, RunnerConfig::new(0, 1, 10), &store)
        .run(CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.failed_invariant(), "storage");
    assert_eq!(err.category(), ErrorCategory::Transient);
}

#[test]
fn test_invalid_runner_parameters() {
    let store: Arc<dyn PartitionStore> = Arc::new(InMemoryPartitionStore::new());
    for config in [
        RunnerConfig::new(0, 0, 10),
        RunnerConfig::new(3, 3, 10),
        RunnerConfig::new(0, 1, 0),
    ] {
        let err = PartitionRunner::new(target(PRIME), config, store.clone()).err();
        assert_eq!(err.map(|e| e.failed_invariant()), Some("configuration"));
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Whole jobs
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_concurrent_partitions_then_status() {
    let store = InMemoryPartitionStore::new();
    let handles: Vec<_> = (0..3)
        .map(|id| {
            let r = runner(PRIME, RunnerConfig::new(id, 3, 10), &store);
            tokio::spawn(async move { r.run(CancellationToken::new()).await })
        })
        .collect();
    for handle in handles {
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
    }

    let status = JobStatus::collect(&store, &target(PRIME), 3).await.unwrap();
    assert_eq!(status.verdict, JobVerdict::ProbablePrime);
    assert_eq!(status.completed, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_composite_partition_decides_job() {
    let store = InMemoryPartitionStore::new();
    let mut outcomes = Vec::new();
    for id in 0..3 {
        let report = run(&runner(COMPOSITE, RunnerConfig::new(id, 3, 100), &store)).await;
        outcomes.push(report.outcome);
    }
    assert!(matches!(outcomes[0], RunOutcome::CompositeFound(_)));
    assert_eq!(outcomes[1], RunOutcome::Completed);
    assert_eq!(outcomes[2], RunOutcome::Completed);

    let status = JobStatus::collect(&store, &target(COMPOSITE), 3).await.unwrap();
    match status.verdict {
        JobVerdict::Composite { markers } => {
            assert_eq!(markers.len(), 1);
            assert_eq!(markers[0].factor, "1009");
        }
        other => panic!("expected composite verdict, got {:?}", other),
    }
}

#[tokio::test]
async fn test_archive_trigger_bundles_logs_as_partitions_finish() {
    let store = InMemoryPartitionStore::new();
    let trigger = ArchiveTrigger::new(Arc::new(store.clone()), 1);
    for id in 0..3 {
        let r = runner(PRIME, RunnerConfig::new(id, 3, 10), &store)
            .with_archive_trigger(trigger.clone());
        run(&r).await;
    }

    let job = JobKey::for_target(&target(PRIME));
    assert_eq!(store.pending_log_count(&job).await.unwrap(), 0);
    assert_eq!(store.archive_count(&job), 3);

    let status = JobStatus::collect(&store, &target(PRIME), 3).await.unwrap();
    assert_eq!(status.verdict, JobVerdict::ProbablePrime);
    assert_eq!(status.archived_logs, 3);
}

#[tokio::test]
async fn test_progress_events() {
    let store = InMemoryPartitionStore::new();
    let (reporter, mut events) = progress_channel();
    let r = runner(PRIME, RunnerConfig::new(0, 1, 30), &store).with_progress(reporter);
    run(&r).await;
    drop(r);

    let mut received = Vec::new();
    while let Some(event) = events.recv().await {
        received.push(event);
    }

    // Block 1 starts at c = 30, past the collision range: it and block 2 are
    // reported once, as the last block
    let completed = |n| ProgressEvent::BlockCompleted {
        partition_id: 0,
        block: block(n),
        total_blocks: block(3),
    };
    assert_eq!(
        received,
        vec![
            ProgressEvent::Resumed {
                partition_id: 0,
                resume_block: BigUint::zero(),
                total_blocks: block(3),
            },
            completed(0),
            completed(2),
            ProgressEvent::PartitionCompleted {
                partition_id: 0,
                blocks_scanned: 1,
            },
        ]
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// Filesystem store
// ═══════════════════════════════════════════════════════════════════════════

fn fs_store(dir: &TempDir) -> Arc<FsPartitionStore> {
    Arc::new(FsPartitionStore::new(
        dir.path(),
        ReplacePolicy::new(3, Duration::from_millis(1)),
    ))
}

#[tokio::test]
async fn test_fs_resume_across_store_instances() {
    let dir = TempDir::new().unwrap();

    let first = PartitionRunner::new(
        target(PRIME),
        RunnerConfig::new(0, 1, 10).with_max_blocks(2),
        fs_store(&dir),
    )
    .unwrap();
    let report = run(&first).await;
    let resume_block = block(2);
    assert_eq!(report.outcome, RunOutcome::Interrupted { resume_block });

    let second =
        PartitionRunner::new(target(PRIME), RunnerConfig::new(0, 1, 10), fs_store(&dir)).unwrap();
    let report = run(&second).await;
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.blocks_scanned, 1);

    let status = JobStatus::collect(fs_store(&dir).as_ref(), &target(PRIME), 1).await.unwrap();
    assert_eq!(status.verdict, JobVerdict::ProbablePrime);
}

#[tokio::test]
async fn test_fs_composite_writes_marker_file() {
    let dir = TempDir::new().unwrap();
    let store = fs_store(&dir);
    let config = RunnerConfig::new(0, 1, 100);
    let r = PartitionRunner::new(target(COMPOSITE), config, store.clone()).unwrap();
    run(&r).await;

    let layout = store.layout(&JobKey::for_target(&target(COMPOSITE)));
    assert!(layout.composite_path(0).exists());
    assert!(layout.log_path(0).exists());

    // The checkpoint still names the last clear block
    let text = std::fs::read_to_string(layout.checkpoint_path(0)).unwrap();
    assert!(text.contains("last_completed_block: 2"));
}
