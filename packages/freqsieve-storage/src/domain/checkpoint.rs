//! Checkpoint records
//!
//! One record per partition, rewritten after every completed block. The
//! serialized form is plain `key: value` lines:
//!
//! ```text
//! schema_version: 1
//! target: '1022117'
//! block_size: 100
//! total_partitions: 1
//! partition_id: 0
//! last_completed_block: 2
//! ```
//!
//! Block numbers past `u64` are written as quoted decimal strings.
//!
//! Parsing goes through a single serde boundary with unknown fields denied.
//! Anything that does not match schema v1 exactly is corruption; a
//! well-formed record for different run parameters is a mismatch.

use freqsieve_core::decimal::{deserialize_biguint, serialize_biguint};
use freqsieve_core::{BlockNumber, Target};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

/// Current checkpoint schema version
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// Persisted progress of one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckpointRecord {
    pub schema_version: u32,
    /// Target in decimal
    pub target: String,
    pub block_size: u64,
    pub total_partitions: u32,
    pub partition_id: u32,
    #[serde(
        serialize_with = "serialize_biguint",
        deserialize_with = "deserialize_biguint"
    )]
    pub last_completed_block: BlockNumber,
}

impl CheckpointRecord {
    /// Block to resume from
    pub fn next_block(&self) -> BlockNumber {
        &self.last_completed_block + 1u32
    }

    pub fn to_text(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            StorageError::serialization(format!("checkpoint encode failed: {}", e)).with_source(e)
        })
    }

    /// Parse a persisted record. Every failure here is corruption.
    pub fn from_text(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(StorageError::checkpoint_corrupt("checkpoint file is empty"));
        }

        let record: CheckpointRecord = serde_yaml::from_str(text).map_err(|e| {
            StorageError::checkpoint_corrupt(format!("unreadable checkpoint: {}", e)).with_source(e)
        })?;

        if record.schema_version != CHECKPOINT_SCHEMA_VERSION {
            return Err(StorageError::checkpoint_corrupt(format!(
                "unsupported checkpoint schema version {} (expected {})",
                record.schema_version, CHECKPOINT_SCHEMA_VERSION
            )));
        }
        Ok(record)
    }
}

/// Parameters of the current run, compared against any persisted record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunParameters {
    pub target: String,
    pub block_size: u64,
    pub total_partitions: u32,
    pub partition_id: u32,
}

impl RunParameters {
    pub fn new(target: &Target, block_size: u64, total_partitions: u32, partition_id: u32) -> Self {
        Self {
            target: target.to_decimal(),
            block_size,
            total_partitions,
            partition_id,
        }
    }

    /// Record stating that `block` is the last completed block
    pub fn checkpoint(&self, block: impl Into<BlockNumber>) -> CheckpointRecord {
        CheckpointRecord {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            target: self.target.clone(),
            block_size: self.block_size,
            total_partitions: self.total_partitions,
            partition_id: self.partition_id,
            last_completed_block: block.into(),
        }
    }

    /// Reject a record written for different parameters
    pub fn validate(&self, record: &CheckpointRecord) -> Result<()> {
        let mut diffs = Vec::new();
        if record.target != self.target {
            diffs.push(format!("target {} != {}", record.target, self.target));
        }
        if record.block_size != self.block_size {
            diffs.push(format!(
                "block_size {} != {}",
                record.block_size, self.block_size
            ));
        }
        if record.total_partitions != self.total_partitions {
            diffs.push(format!(
                "total_partitions {} != {}",
                record.total_partitions, self.total_partitions
            ));
        }
        if record.partition_id != self.partition_id {
            diffs.push(format!(
                "partition_id {} != {}",
                record.partition_id, self.partition_id
            ));
        }

        if diffs.is_empty() {
            Ok(())
        } else {
            Err(StorageError::checkpoint_mismatch(format!(
                "checkpoint does not belong to this run (stored vs current): {}",
                diffs.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    use num_bigint::BigUint;

    fn params() -> RunParameters {
        RunParameters::new(&Target::from_u64(1_022_117).unwrap(), 100, 1, 0)
    }

    #[test]
    fn test_text_format_is_key_value_lines() {
        let text = params().checkpoint(2u32).to_text().unwrap();
        assert!(text.contains("schema_version: 1"));
        assert!(text.contains("block_size: 100"));
        assert!(text.contains("last_completed_block: 2"));

        let parsed = CheckpointRecord::from_text(&text).unwrap();
        assert_eq!(parsed, params().checkpoint(2u32));
        assert_eq!(parsed.next_block(), BigUint::from(3u32));
    }

    #[test]
    fn test_block_beyond_u64_round_trips_as_string() {
        let block: BigUint = "340282366920938463463374607431768211456".parse().unwrap();
        let text = params().checkpoint(block.clone()).to_text().unwrap();
        assert!(text.contains("340282366920938463463374607431768211456"));

        let parsed = CheckpointRecord::from_text(&text).unwrap();
        assert_eq!(parsed.last_completed_block, block);
        assert_eq!(parsed.next_block(), block + 1u32);
    }

    #[test]
    fn test_negative_block_is_corruption() {
        let text = params().checkpoint(0u32).to_text().unwrap();
        let text = text.replace("last_completed_block: 0", "last_completed_block: -1");
        let err = CheckpointRecord::from_text(&text).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CheckpointCorrupt);
    }

    #[test]
    fn test_unknown_field_is_corruption() {
        let text = format!("{}extra: 1\n", params().checkpoint(0u32).to_text().unwrap());
        let err = CheckpointRecord::from_text(&text).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CheckpointCorrupt);
    }

    #[test]
    fn test_missing_field_is_corruption() {
        let err = CheckpointRecord::from_text("schema_version: 1\ntarget: '35'\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::CheckpointCorrupt);

        let err = CheckpointRecord::from_text("   \n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::CheckpointCorrupt);
    }

    #[test]
    fn test_unsupported_schema_is_corruption() {
        let mut record = params().checkpoint(0u32);
        record.schema_version = 2;
        let text = serde_yaml::to_string(&record).unwrap();
        let err = CheckpointRecord::from_text(&text).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CheckpointCorrupt);
        assert!(err.message.contains("version 2"));
    }

    #[test]
    fn test_parameter_mismatch() {
        let stored =
            RunParameters::new(&Target::from_u64(1000).unwrap(), 100, 1, 0).checkpoint(4u32);
        let current = RunParameters::new(&Target::from_u64(500).unwrap(), 100, 1, 0);

        let err = current.validate(&stored).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CheckpointMismatch);
        assert!(err.message.contains("target 1000 != 500"));

        assert!(params().validate(&params().checkpoint(7u32)).is_ok());
    }
}
