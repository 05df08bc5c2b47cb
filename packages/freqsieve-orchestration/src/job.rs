use crate::error::{ErrorCategory, OrchestratorError, Result};
use chrono::{DateTime, Utc};
use freqsieve_core::decimal::{
    deserialize_biguint, deserialize_option_biguint, serialize_biguint, serialize_option_biguint,
};
use freqsieve_core::BlockNumber;
use serde::{Deserialize, Serialize};

/// Partition runner state
///
/// ```text
/// Recovering ──> Running ──> Completed
///     │             │──────> CompositeFound
///     │             │──────> Interrupted
///     │             └──────> Aborted
///     └──> CompositeFound | Completed | Interrupted | Aborted
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunnerState {
    Recovering {
        started_at: DateTime<Utc>,
    },
    Running {
        started_at: DateTime<Utc>,
        #[serde(
            serialize_with = "serialize_biguint",
            deserialize_with = "deserialize_biguint"
        )]
        next_block: BlockNumber,
        #[serde(
            serialize_with = "serialize_biguint",
            deserialize_with = "deserialize_biguint"
        )]
        total_blocks: BlockNumber,
    },
    Completed {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        duration_ms: u64,
        blocks_scanned: u64,
    },
    CompositeFound {
        started_at: DateTime<Utc>,
        found_at: DateTime<Utc>,
        #[serde(
            default,
            serialize_with = "serialize_option_biguint",
            deserialize_with = "deserialize_option_biguint"
        )]
        block: Option<BlockNumber>,
        factor: String,
    },
    Interrupted {
        started_at: DateTime<Utc>,
        interrupted_at: DateTime<Utc>,
        #[serde(
            serialize_with = "serialize_biguint",
            deserialize_with = "deserialize_biguint"
        )]
        resume_block: BlockNumber,
        reason: String,
    },
    Aborted {
        started_at: DateTime<Utc>,
        aborted_at: DateTime<Utc>,
        error: String,
        error_category: ErrorCategory,
        failed_invariant: String,
    },
}

impl RunnerState {
    pub fn state_name(&self) -> &'static str {
        match self {
            RunnerState::Recovering { .. } => "recovering",
            RunnerState::Running { .. } => "running",
            RunnerState::Completed { .. } => "completed",
            RunnerState::CompositeFound { .. } => "composite_found",
            RunnerState::Interrupted { .. } => "interrupted",
            RunnerState::Aborted { .. } => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            RunnerState::Recovering { .. } | RunnerState::Running { .. }
        )
    }

    fn started_at(&self) -> DateTime<Utc> {
        match self {
            RunnerState::Recovering { started_at }
            | RunnerState::Running { started_at, .. }
            | RunnerState::Completed { started_at, .. }
            | RunnerState::CompositeFound { started_at, .. }
            | RunnerState::Interrupted { started_at, .. }
            | RunnerState::Aborted { started_at, .. } => *started_at,
        }
    }
}

/// State machine for one partition run
#[derive(Debug, Clone)]
pub struct PartitionStateMachine {
    partition_id: u32,
    state: RunnerState,
    updated_at: DateTime<Utc>,
}

impl PartitionStateMachine {
    pub fn new(partition_id: u32) -> Self {
        let now = Utc::now();
        Self {
            partition_id,
            state: RunnerState::Recovering { started_at: now },
            updated_at: now,
        }
    }

    pub fn partition_id(&self) -> u32 {
        self.partition_id
    }

    pub fn state(&self) -> &RunnerState {
        &self.state
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn invalid(&self, to: &str) -> OrchestratorError {
        OrchestratorError::InvalidStateTransition {
            from: self.state.state_name().to_string(),
            to: to.to_string(),
        }
    }

    fn set(&mut self, state: RunnerState) {
        self.updated_at = Utc::now();
        self.state = state;
    }

    /// Transition: RECOVERING → RUNNING
    pub fn begin_scan(&mut self, next_block: BlockNumber, total_blocks: BlockNumber) -> Result<()> {
        match &self.state {
            RunnerState::Recovering { started_at } => {
                let started_at = *started_at;
                self.set(RunnerState::Running {
                    started_at,
                    next_block,
                    total_blocks,
                });
                Ok(())
            }
            _ => Err(self.invalid("running")),
        }
    }

    /// Record a completed block (RUNNING only)
    pub fn advance(&mut self, completed_block: &BlockNumber) -> Result<()> {
        match &mut self.state {
            RunnerState::Running { next_block, .. } => {
                *next_block = completed_block + 1u32;
                self.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(self.invalid("advance")),
        }
    }

    /// Transition: RECOVERING | RUNNING → COMPLETED
    pub fn complete(&mut self, blocks_scanned: u64) -> Result<()> {
        match &self.state {
            RunnerState::Recovering { .. } | RunnerState::Running { .. } => {
                let started_at = self.state.started_at();
                let now = Utc::now();
                self.set(RunnerState::Completed {
                    started_at,
                    completed_at: now,
                    duration_ms: (now - started_at).num_milliseconds().max(0) as u64,
                    blocks_scanned,
                });
                Ok(())
            }
            _ => Err(self.invalid("completed")),
        }
    }

    /// Transition: RECOVERING | RUNNING → COMPOSITE_FOUND
    pub fn composite(&mut self, block: Option<BlockNumber>, factor: String) -> Result<()> {
        match &self.state {
            RunnerState::Recovering { .. } | RunnerState::Running { .. } => {
                let started_at = self.state.started_at();
                self.set(RunnerState::CompositeFound {
                    started_at,
                    found_at: Utc::now(),
                    block,
                    factor,
                });
                Ok(())
            }
            _ => Err(self.invalid("composite_found")),
        }
    }

    /// Transition: RECOVERING | RUNNING → INTERRUPTED
    pub fn interrupt(
        &mut self,
        resume_block: BlockNumber,
        reason: impl Into<String>,
    ) -> Result<()> {
        match &self.state {
            RunnerState::Recovering { .. } | RunnerState::Running { .. } => {
                let started_at = self.state.started_at();
                self.set(RunnerState::Interrupted {
                    started_at,
                    interrupted_at: Utc::now(),
                    resume_block,
                    reason: reason.into(),
                });
                Ok(())
            }
            _ => Err(self.invalid("interrupted")),
        }
    }

    /// Transition: * (non-terminal) → ABORTED
    pub fn abort(&mut self, err: &OrchestratorError) -> Result<()> {
        if self.state.is_terminal() {
            return Err(self.invalid("aborted"));
        }
        let started_at = self.state.started_at();
        self.set(RunnerState::Aborted {
            started_at,
            aborted_at: Utc::now(),
            error: err.to_string(),
            error_category: err.category(),
            failed_invariant: err.failed_invariant().to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freqsieve_storage::StorageError;
    use num_bigint::BigUint;
    use num_traits::Zero;

    fn block(n: u32) -> BigUint {
        BigUint::from(n)
    }

    #[test]
    fn test_recovering_to_running_to_completed() {
        let mut sm = PartitionStateMachine::new(0);
        assert_eq!(sm.state().state_name(), "recovering");

        sm.begin_scan(block(3), block(11)).unwrap();
        sm.advance(&block(3)).unwrap();
        match sm.state() {
            RunnerState::Running {
                next_block,
                total_blocks,
                ..
            } => {
                assert_eq!(*next_block, block(4));
                assert_eq!(*total_blocks, block(11));
            }
            _ => panic!("Expected Running state"),
        }

        sm.complete(8).unwrap();
        assert!(sm.state().is_terminal());
        assert!(matches!(
            sm.state(),
            RunnerState::Completed {
                blocks_scanned: 8,
                ..
            }
        ));
    }

    #[test]
    fn test_composite_from_recovering() {
        let mut sm = PartitionStateMachine::new(2);
        sm.composite(None, "5".to_string()).unwrap();
        assert_eq!(sm.state().state_name(), "composite_found");
    }

    #[test]
    fn test_cannot_leave_terminal_state() {
        let mut sm = PartitionStateMachine::new(0);
        sm.begin_scan(BigUint::zero(), block(1)).unwrap();
        sm.interrupt(BigUint::zero(), "cancelled").unwrap();

        assert!(sm.begin_scan(BigUint::zero(), block(1)).is_err());
        assert!(sm.complete(0).is_err());
        let err = OrchestratorError::TaskJoin("boom".to_string());
        assert!(sm.abort(&err).is_err());
    }

    #[test]
    fn test_advance_requires_running() {
        let mut sm = PartitionStateMachine::new(0);
        let err = sm.advance(&BigUint::zero()).unwrap_err();
        assert!(err.to_string().contains("recovering -> advance"));
    }

    #[test]
    fn test_abort_records_failed_invariant() {
        let mut sm = PartitionStateMachine::new(0);
        let err: OrchestratorError = StorageError::checkpoint_mismatch("target 1000 != 500").into();
        sm.abort(&err).unwrap();

        match sm.state() {
            RunnerState::Aborted {
                failed_invariant,
                error_category,
                ..
            } => {
                assert_eq!(failed_invariant, "checkpoint mismatch");
                assert_eq!(*error_category, ErrorCategory::Permanent);
            }
            _ => panic!("Expected Aborted state"),
        }
    }

    #[test]
    fn test_state_serde_tag() {
        let sm = PartitionStateMachine::new(0);
        let json = serde_json::to_string(sm.state()).unwrap();
        assert!(json.contains("\"type\":\"recovering\""));

        let mut sm = PartitionStateMachine::new(0);
        let huge: BigUint = "100000000000000000000000000000".parse().unwrap();
        sm.begin_scan(huge.clone(), &huge + 5u32).unwrap();
        let json = serde_json::to_string(sm.state()).unwrap();
        assert!(json.contains("\"next_block\":\"100000000000000000000000000000\""));

        let back: RunnerState = serde_json::from_str(&json).unwrap();
        assert_eq!(&back, sm.state());
    }
}
