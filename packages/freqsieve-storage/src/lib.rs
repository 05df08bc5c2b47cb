//! Partition store - durable state of a frequency-collision job
//!
//! ## Core Principles
//!
//! 1. **Resumability**: a partition's checkpoint names its last completed
//!    block; a restarted runner continues right after it.
//! 2. **Atomic replace**: checkpoints are written to a temp file, fsynced and
//!    renamed into place, retrying the rename on transient OS denials.
//! 3. **Validated resume**: a checkpoint for a different target, block size
//!    or partition count is a hard error, never silently reused.
//! 4. **Bounded logs**: finished-partition logs are periodically bundled into
//!    compressed archives by `LogArchiver`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use freqsieve_storage::{FsPartitionStore, JobKey, PartitionStore, ReplacePolicy, RunParameters};
//!
//! let store = FsPartitionStore::new("/var/lib/freqsieve", ReplacePolicy::default());
//! let job = JobKey::for_target(&target);
//! let params = RunParameters::new(&target, 1000, 8, 3);
//!
//! let next = store
//!     .load_checkpoint(&job, &params)
//!     .await?
//!     .map(|record| record.next_block())
//!     .unwrap_or_default();
//! store.save_checkpoint(&job, &params.checkpoint(next)).await?;
//! ```

pub mod archive;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};

pub use archive::{decode_archive, encode_archive, read_archive, LogArchiver};
pub use domain::{
    ArchiveSummary, CheckpointRecord, CompositeMarker, FindingSource, JobKey, PartitionLog,
    PartitionOutcome, PartitionStore, RunParameters, CHECKPOINT_SCHEMA_VERSION,
};
pub use infrastructure::fs::{FsPartitionStore, JobLayout, ReplacePolicy, StorageLayout};
pub use infrastructure::memory::InMemoryPartitionStore;
