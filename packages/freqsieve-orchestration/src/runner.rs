//! Partition Runner
//!
//! Drives one partition of a job from recovery to a terminal state.
//!
//! # Architecture
//!
//! ```text
//! Recovering
//!   ├─ prefilter decides ──────────────────────────> Completed | CompositeFound
//!   ├─ marker already present for this partition ─> CompositeFound
//!   └─ checkpoint loaded + validated (mismatch / corruption -> Aborted)
//! Running (per block, in order)
//!   ├─ cancelled or budget spent ─────────────────> Interrupted
//!   ├─ block starts past the collision range -> checkpoint last block
//!   ├─ scan on the blocking pool
//!   ├─ collision -> marker -> log ────────────────> CompositeFound
//!   └─ candidate -> checkpoint saved -> next block
//! all blocks done -> log ─────────────────────────> Completed
//! ```
//!
//! Cancellation is observed between blocks only, so a block is either fully
//! scanned and checkpointed or not started. Blocks starting at or after the
//! first index with `a(c) > sqrt(X)` cannot collide; the whole tail is
//! covered by a single checkpoint of the partition's last block. Re-running an interrupted
//! partition with the same store and parameters resumes right after the last
//! checkpointed block.

use std::sync::Arc;
use std::time::Instant;

use freqsieve_core::{
    scan_block, BlockNumber, CollisionContext, PartitionPlan, PartitionRange, Prefilter,
    PrefilterOutcome, ScanVerdict, Target,
};
use num_bigint::BigUint;
use num_traits::Zero;
use freqsieve_storage::{
    CompositeMarker, JobKey, PartitionLog, PartitionOutcome, PartitionStore, RunParameters,
    StorageError,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::archiver::ArchiveTrigger;
use crate::error::{OrchestratorError, Result};
use crate::job::{PartitionStateMachine, RunnerState};
use crate::progress::{ProgressEvent, ProgressReporter};

/// Parameters of one partition run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    pub partition_id: u32,
    pub total_partitions: u32,
    pub block_size: u64,
    pub prefilter: Prefilter,
    /// Stop (as interrupted) after scanning this many blocks
    pub max_blocks: Option<u64>,
}

impl RunnerConfig {
    pub fn new(partition_id: u32, total_partitions: u32, block_size: u64) -> Self {
        Self {
            partition_id,
            total_partitions,
            block_size,
            prefilter: Prefilter::standard(),
            max_blocks: None,
        }
    }

    pub fn with_prefilter(mut self, prefilter: Prefilter) -> Self {
        self.prefilter = prefilter;
        self
    }

    pub fn with_max_blocks(mut self, max_blocks: u64) -> Self {
        self.max_blocks = Some(max_blocks);
        self
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every block of the partition is done without a collision
    Completed,
    /// The target is composite; the marker is durable
    CompositeFound(CompositeMarker),
    /// Stopped between blocks; rerun to continue
    Interrupted { resume_block: BlockNumber },
}

/// Summary returned by `PartitionRunner::run`
#[derive(Debug, Clone)]
pub struct PartitionReport {
    pub partition_id: u32,
    pub outcome: RunOutcome,
    /// Blocks scanned by this run
    pub blocks_scanned: u64,
    pub total_blocks: BlockNumber,
    pub elapsed_ms: u64,
    pub state: RunnerState,
}

pub struct PartitionRunner {
    target: Target,
    config: RunnerConfig,
    store: Arc<dyn PartitionStore>,
    job: JobKey,
    runner_id: String,
    progress: ProgressReporter,
    archive_trigger: Option<ArchiveTrigger>,
}

impl PartitionRunner {
    pub fn new(
        target: Target,
        config: RunnerConfig,
        store: Arc<dyn PartitionStore>,
    ) -> Result<Self> {
        if config.total_partitions == 0 {
            return Err(OrchestratorError::config("total_partitions must be positive"));
        }
        if config.partition_id >= config.total_partitions {
            return Err(OrchestratorError::config(format!(
                "partition_id {} out of range 0..{}",
                config.partition_id, config.total_partitions
            )));
        }
        if config.block_size == 0 {
            return Err(OrchestratorError::config("block_size must be positive"));
        }

        Ok(Self {
            job: JobKey::for_target(&target),
            target,
            config,
            store,
            runner_id: format!("worker-{}", Uuid::new_v4()),
            progress: ProgressReporter::disabled(),
            archive_trigger: None,
        })
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_archive_trigger(mut self, trigger: ArchiveTrigger) -> Self {
        self.archive_trigger = Some(trigger);
        self
    }

    pub fn job_key(&self) -> &JobKey {
        &self.job
    }

    pub fn runner_id(&self) -> &str {
        &self.runner_id
    }

    /// Run the partition until it completes, finds a composite, is cancelled
    /// or spends its block budget.
    pub async fn run(&self, cancel: CancellationToken) -> Result<PartitionReport> {
        let started = Instant::now();
        let mut sm = PartitionStateMachine::new(self.config.partition_id);
        info!(
            "Partition {}/{} of {} starting (job {}, runner {})",
            self.config.partition_id,
            self.config.total_partitions,
            self.target,
            self.job,
            self.runner_id
        );

        match self.execute(&mut sm, &cancel, started).await {
            Ok(report) => Ok(report),
            Err(err) => {
                error!(
                    "Partition {} aborted ({} violated): {}",
                    self.config.partition_id,
                    err.failed_invariant(),
                    err
                );
                if let Err(transition) = sm.abort(&err) {
                    warn!("Abort transition rejected: {}", transition);
                }
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        sm: &mut PartitionStateMachine,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<PartitionReport> {
        let pid = self.config.partition_id;

        // ═══════════════════════════════════════════════════════════════════
        // Recovering
        // ═══════════════════════════════════════════════════════════════════

        match self.config.prefilter.classify(&self.target) {
            PrefilterOutcome::Prime => {
                info!("Target {} is an excluded prime, nothing to scan", self.target);
                self.finish_log(PartitionOutcome::Completed, BigUint::zero(), 0, started)
                    .await?;
                sm.complete(0)?;
                self.progress.emit(ProgressEvent::PartitionCompleted {
                    partition_id: pid,
                    blocks_scanned: 0,
                });
                let outcome = RunOutcome::Completed;
                return Ok(self.report(sm, outcome, 0, BigUint::zero(), started));
            }
            PrefilterOutcome::Composite { divisor } => {
                info!("Target {} is divisible by {}", self.target, divisor);
                let marker = CompositeMarker::from_prefilter(pid, divisor, &self.target);
                let marker = self.record_composite(marker).await?;
                self.finish_log(PartitionOutcome::Composite, blocks_before(&marker), 0, started)
                    .await?;
                sm.composite(None, marker.factor.clone())?;
                let outcome = RunOutcome::CompositeFound(marker);
                return Ok(self.report(sm, outcome, 0, BigUint::zero(), started));
            }
            PrefilterOutcome::NeedsScan => {}
        }

        let ctx = Arc::new(CollisionContext::new(&self.target)?);
        let plan = PartitionPlan::new(
            ctx.limit().clone(),
            self.config.total_partitions,
            self.config.block_size,
        )?;
        let range = plan.partition(pid)?;
        let total_blocks = range.total_blocks();

        if let Some(marker) = self.store.composite_marker(&self.job, pid).await? {
            info!(
                "Partition {} already proved composite (factor {}), skipping scan",
                pid, marker.factor
            );
            self.finish_log(PartitionOutcome::Composite, blocks_before(&marker), 0, started)
                .await?;
            sm.composite(marker.block.clone(), marker.factor.clone())?;
            self.progress.emit(ProgressEvent::CompositeFound {
                partition_id: pid,
                block: marker.block.clone(),
                factor: marker.factor.clone(),
            });
            let outcome = RunOutcome::CompositeFound(marker);
            return Ok(self.report(sm, outcome, 0, total_blocks, started));
        }

        let params = RunParameters::new(
            &self.target,
            self.config.block_size,
            self.config.total_partitions,
            pid,
        );
        let checkpoint = self.store.load_checkpoint(&self.job, &params).await?;
        let resume_block = match &checkpoint {
            Some(record) if record.last_completed_block >= total_blocks => {
                return Err(StorageError::checkpoint_corrupt(format!(
                    "checkpoint names block {} but partition {} has only {} blocks",
                    record.last_completed_block, pid, total_blocks
                ))
                .into());
            }
            Some(record) => record.next_block(),
            None => BigUint::zero(),
        };

        sm.begin_scan(resume_block.clone(), total_blocks.clone())?;
        info!(
            "Partition {} covers [{}, {}) in {} blocks, resuming at block {}",
            pid, range.start, range.end, total_blocks, resume_block
        );
        self.progress.emit(ProgressEvent::Resumed {
            partition_id: pid,
            resume_block: resume_block.clone(),
            total_blocks: total_blocks.clone(),
        });

        // ═══════════════════════════════════════════════════════════════════
        // Running
        // ═══════════════════════════════════════════════════════════════════

        let scanned = self
            .scan_blocks(sm, cancel, &ctx, &range, &params, resume_block, started)
            .await?;
        if let Some(report) = scanned.report {
            return Ok(report);
        }

        self.finish_log(
            PartitionOutcome::Completed,
            total_blocks.clone(),
            scanned.blocks,
            started,
        )
        .await?;
        sm.complete(scanned.blocks)?;
        info!(
            "Partition {} completed: {} blocks, no collision",
            pid, total_blocks
        );
        self.progress.emit(ProgressEvent::PartitionCompleted {
            partition_id: pid,
            blocks_scanned: scanned.blocks,
        });
        Ok(self.report(sm, RunOutcome::Completed, scanned.blocks, total_blocks, started))
    }

    #[allow(clippy::too_many_arguments)]
    async fn scan_blocks(
        &self,
        sm: &mut PartitionStateMachine,
        cancel: &CancellationToken,
        ctx: &Arc<CollisionContext>,
        range: &PartitionRange,
        params: &RunParameters,
        resume_block: BlockNumber,
        started: Instant,
    ) -> Result<ScanProgress> {
        let pid = self.config.partition_id;
        let total_blocks = range.total_blocks();
        let mut scanned = 0u64;

        for block in range.blocks_from(resume_block) {
            let reason = if cancel.is_cancelled() {
                Some("cancelled")
            } else if self.config.max_blocks.is_some_and(|max| scanned >= max) {
                Some("block budget spent")
            } else {
                None
            };
            if let Some(reason) = reason {
                info!(
                    "Partition {} interrupted ({}) before block {}/{}",
                    pid, reason, block.number, total_blocks
                );
                sm.interrupt(block.number.clone(), reason)?;
                self.progress.emit(ProgressEvent::Interrupted {
                    partition_id: pid,
                    resume_block: block.number.clone(),
                });
                let outcome = RunOutcome::Interrupted {
                    resume_block: block.number,
                };
                return Ok(ScanProgress {
                    blocks: scanned,
                    report: Some(self.report(sm, outcome, scanned, total_blocks, started)),
                });
            }

            if !ctx.in_range(&block.start) {
                // Nothing from here to the end of the partition can collide
                let last = range.last_block().unwrap_or_else(|| block.number.clone());
                self.store
                    .save_checkpoint(&self.job, &params.checkpoint(last.clone()))
                    .await?;
                sm.advance(&last)?;
                debug!(
                    "Partition {} blocks {}..={} start past index {}, checkpointed as done",
                    pid,
                    block.number,
                    last,
                    ctx.scan_end()
                );
                self.progress.emit(ProgressEvent::BlockCompleted {
                    partition_id: pid,
                    block: last,
                    total_blocks: total_blocks.clone(),
                });
                break;
            }

            let scan_ctx = Arc::clone(ctx);
            let (start, end) = (block.start.clone(), block.end.clone());
            let verdict = tokio::task::spawn_blocking(move || scan_block(&scan_ctx, &start, &end))
                .await
                .map_err(|e| OrchestratorError::TaskJoin(e.to_string()))?;
            scanned += 1;

            match verdict {
                ScanVerdict::Composite(collision) => {
                    info!(
                        "Partition {} block {}: collision at index {} (lane {:?}), factor {}",
                        pid, block.number, collision.index, collision.lane, collision.factor
                    );
                    let marker = CompositeMarker::from_collision(
                        pid,
                        block.number.clone(),
                        &collision,
                        &self.target,
                    );
                    let marker = self.record_composite(marker).await?;
                    let completed = blocks_before(&marker);
                    self.finish_log(PartitionOutcome::Composite, completed, scanned, started)
                        .await?;
                    sm.composite(marker.block.clone(), marker.factor.clone())?;
                    return Ok(ScanProgress {
                        blocks: scanned,
                        report: Some(self.report(
                            sm,
                            RunOutcome::CompositeFound(marker),
                            scanned,
                            total_blocks,
                            started,
                        )),
                    });
                }
                ScanVerdict::StillCandidate => {
                    self.store
                        .save_checkpoint(&self.job, &params.checkpoint(block.number.clone()))
                        .await?;
                    sm.advance(&block.number)?;
                    debug!(
                        "Partition {} block {}/{} [{}, {}] clear",
                        pid,
                        &block.number + 1u32,
                        total_blocks,
                        block.start,
                        block.end
                    );
                    self.progress.emit(ProgressEvent::BlockCompleted {
                        partition_id: pid,
                        block: block.number,
                        total_blocks: total_blocks.clone(),
                    });
                }
            }
        }

        Ok(ScanProgress {
            blocks: scanned,
            report: None,
        })
    }

    /// Persist a marker; an earlier marker for this partition wins
    async fn record_composite(&self, marker: CompositeMarker) -> Result<CompositeMarker> {
        let pid = marker.partition_id;
        let marker = if self.store.write_composite_marker(&self.job, &marker).await? {
            marker
        } else {
            self.store
                .composite_marker(&self.job, pid)
                .await?
                .unwrap_or(marker)
        };
        self.progress.emit(ProgressEvent::CompositeFound {
            partition_id: pid,
            block: marker.block.clone(),
            factor: marker.factor.clone(),
        });
        Ok(marker)
    }

    async fn finish_log(
        &self,
        outcome: PartitionOutcome,
        blocks_completed: BlockNumber,
        blocks_scanned: u64,
        started: Instant,
    ) -> Result<()> {
        let log = PartitionLog::new(
            self.config.partition_id,
            self.config.total_partitions,
            outcome,
            blocks_completed,
            blocks_scanned,
            started.elapsed().as_millis() as u64,
            self.runner_id.clone(),
        );
        self.store.write_partition_log(&self.job, &log).await?;

        // The partition result is durable at this point; archiving is best effort
        if let Some(trigger) = &self.archive_trigger {
            if let Err(err) = trigger.maybe_archive(&self.job).await {
                warn!("Log archiving failed for job {}: {}", self.job, err);
            }
        }
        Ok(())
    }

    fn report(
        &self,
        sm: &PartitionStateMachine,
        outcome: RunOutcome,
        blocks_scanned: u64,
        total_blocks: BlockNumber,
        started: Instant,
    ) -> PartitionReport {
        PartitionReport {
            partition_id: self.config.partition_id,
            outcome,
            blocks_scanned,
            total_blocks,
            elapsed_ms: started.elapsed().as_millis() as u64,
            state: sm.state().clone(),
        }
    }
}

struct ScanProgress {
    blocks: u64,
    report: Option<PartitionReport>,
}

/// Blocks completed before the colliding block named by `marker`
///
/// Block numbers start at 0, so the colliding block's number is the count of
/// clear blocks before it. Prefilter markers name no block.
fn blocks_before(marker: &CompositeMarker) -> BlockNumber {
    marker.block.clone().unwrap_or_default()
}
