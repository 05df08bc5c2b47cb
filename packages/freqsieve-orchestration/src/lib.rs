/*
 * freqsieve orchestration - partitioned, resumable verification runs
 *
 * Architecture:
 * - Partition runner state machine (recover -> scan -> terminal)
 * - Cooperative cancellation + block budget between blocks
 * - Progress stream (mpsc) alongside tracing
 * - Threshold-driven log archiving
 * - Job status aggregation over markers and logs
 */

// Public modules
pub mod archiver;
pub mod error;
pub mod job;
pub mod progress;
pub mod runner;
pub mod status;

// Re-exports
pub use archiver::{ArchiveTrigger, DEFAULT_ARCHIVE_THRESHOLD};
pub use error::{ErrorCategory, OrchestratorError, Result};
pub use job::{PartitionStateMachine, RunnerState};
pub use progress::{progress_channel, ProgressEvent, ProgressReporter};
pub use runner::{PartitionReport, PartitionRunner, RunOutcome, RunnerConfig};
pub use status::{JobStatus, JobVerdict};
pub use tokio_util::sync::CancellationToken;
