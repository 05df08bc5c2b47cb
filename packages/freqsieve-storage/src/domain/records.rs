//! Composite markers and partition logs

use chrono::{DateTime, Utc};
use freqsieve_core::decimal::{
    deserialize_biguint, deserialize_option_biguint, serialize_biguint, serialize_option_biguint,
};
use freqsieve_core::{BlockNumber, Collision, Target};
use serde::{Deserialize, Serialize};

/// Where a composite finding came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSource {
    /// Collision found by the block scanner
    Scan,
    /// Target divisible by an excluded small prime
    Prefilter,
}

/// Write-once proof that the target is composite
///
/// Numbers are decimal strings so arbitrarily large factors survive JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeMarker {
    pub partition_id: u32,
    /// Block containing the collision (absent for prefilter findings)
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_option_biguint",
        deserialize_with = "deserialize_option_biguint"
    )]
    pub block: Option<BlockNumber>,
    /// Candidate index of the collision (absent for prefilter findings)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    pub factor: String,
    pub cofactor: String,
    pub source: FindingSource,
    pub detected_at: DateTime<Utc>,
}

impl CompositeMarker {
    pub fn from_collision(
        partition_id: u32,
        block: BlockNumber,
        collision: &Collision,
        target: &Target,
    ) -> Self {
        Self {
            partition_id,
            block: Some(block),
            index: Some(collision.index.to_string()),
            cofactor: (target.value() / &collision.factor).to_string(),
            factor: collision.factor.to_string(),
            source: FindingSource::Scan,
            detected_at: Utc::now(),
        }
    }

    pub fn from_prefilter(partition_id: u32, divisor: u32, target: &Target) -> Self {
        Self {
            partition_id,
            block: None,
            index: None,
            factor: divisor.to_string(),
            cofactor: (target.value() / divisor).to_string(),
            source: FindingSource::Prefilter,
            detected_at: Utc::now(),
        }
    }
}

/// How a partition finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionOutcome {
    /// Every block scanned without a collision
    Completed,
    /// A composite marker was written
    Composite,
}

/// Immutable record of one finished partition run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionLog {
    pub partition_id: u32,
    pub total_partitions: u32,
    pub outcome: PartitionOutcome,
    /// Blocks durably completed (across all resumptions)
    #[serde(
        serialize_with = "serialize_biguint",
        deserialize_with = "deserialize_biguint"
    )]
    pub blocks_completed: BlockNumber,
    /// Blocks scanned by this run
    pub blocks_scanned: u64,
    pub elapsed_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub runner_id: String,
}

impl PartitionLog {
    pub fn new(
        partition_id: u32,
        total_partitions: u32,
        outcome: PartitionOutcome,
        blocks_completed: impl Into<BlockNumber>,
        blocks_scanned: u64,
        elapsed_ms: u64,
        runner_id: impl Into<String>,
    ) -> Self {
        Self {
            partition_id,
            total_partitions,
            outcome,
            blocks_completed: blocks_completed.into(),
            blocks_scanned,
            elapsed_ms,
            timestamp: Utc::now(),
            runner_id: runner_id.into(),
        }
    }
}

/// Result of one archiving pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSummary {
    /// Archive file name (or store-specific identifier)
    pub archive: String,
    pub logs: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use freqsieve_core::Lane;
    use num_bigint::BigUint;

    #[test]
    fn test_marker_from_collision() {
        let target = Target::from_u64(1_022_117).unwrap();
        let collision = Collision {
            index: BigUint::from(335u32),
            lane: Lane::A,
            factor: BigUint::from(1009u32),
        };
        let marker = CompositeMarker::from_collision(0, BigUint::from(3u32), &collision, &target);
        assert_eq!(marker.factor, "1009");
        assert_eq!(marker.cofactor, "1013");
        assert_eq!(marker.index.as_deref(), Some("335"));
        assert_eq!(marker.source, FindingSource::Scan);

        let json = serde_json::to_string(&marker).unwrap();
        assert!(json.contains("\"block\":3"));
        let back: CompositeMarker = serde_json::from_str(&json).unwrap();
        assert_eq!(back.block, Some(BigUint::from(3u32)));
    }

    #[test]
    fn test_prefilter_marker_serde_omits_block() {
        let target = Target::from_u64(91).unwrap();
        let marker = CompositeMarker::from_prefilter(2, 7, &target);
        let json = serde_json::to_string(&marker).unwrap();
        assert!(json.contains("\"source\":\"prefilter\""));
        assert!(!json.contains("\"block\""));
        assert!(json.contains("\"cofactor\":\"13\""));

        let back: CompositeMarker = serde_json::from_str(&json).unwrap();
        assert_eq!(back, marker);
    }

    #[test]
    fn test_partition_log_serde() {
        let log = PartitionLog::new(1, 4, PartitionOutcome::Completed, 11u32, 3, 25, "worker-a");
        let json = serde_json::to_string(&log).unwrap();
        assert!(json.contains("\"outcome\":\"completed\""));
        let back: PartitionLog = serde_json::from_str(&json).unwrap();
        assert_eq!(back, log);
    }
}
