//! Progress stream
//!
//! Runners publish structured events on an optional unbounded channel in
//! addition to their `tracing` output. A dropped receiver never affects the
//! run. Block numbers serialize as integers while they fit `u64`.

use freqsieve_core::decimal::{
    deserialize_biguint, deserialize_option_biguint, serialize_biguint, serialize_option_biguint,
};
use freqsieve_core::BlockNumber;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// One observable step of a partition run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Recovery finished; scanning resumes at `resume_block`
    Resumed {
        partition_id: u32,
        #[serde(
            serialize_with = "serialize_biguint",
            deserialize_with = "deserialize_biguint"
        )]
        resume_block: BlockNumber,
        #[serde(
            serialize_with = "serialize_biguint",
            deserialize_with = "deserialize_biguint"
        )]
        total_blocks: BlockNumber,
    },
    /// Block checkpointed without a collision
    BlockCompleted {
        partition_id: u32,
        #[serde(
            serialize_with = "serialize_biguint",
            deserialize_with = "deserialize_biguint"
        )]
        block: BlockNumber,
        #[serde(
            serialize_with = "serialize_biguint",
            deserialize_with = "deserialize_biguint"
        )]
        total_blocks: BlockNumber,
    },
    /// Composite marker written (or found from an earlier run)
    CompositeFound {
        partition_id: u32,
        #[serde(
            default,
            serialize_with = "serialize_option_biguint",
            deserialize_with = "deserialize_option_biguint"
        )]
        block: Option<BlockNumber>,
        factor: String,
    },
    /// Every block scanned
    PartitionCompleted { partition_id: u32, blocks_scanned: u64 },
    /// Stopped between blocks; rerun resumes at `resume_block`
    Interrupted {
        partition_id: u32,
        #[serde(
            serialize_with = "serialize_biguint",
            deserialize_with = "deserialize_biguint"
        )]
        resume_block: BlockNumber,
    },
}

/// Sending half held by a runner
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<UnboundedSender<ProgressEvent>>,
}

impl ProgressReporter {
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Connected reporter / receiver pair
pub fn progress_channel() -> (ProgressReporter, UnboundedReceiver<ProgressEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressReporter::new(tx), rx)
}
