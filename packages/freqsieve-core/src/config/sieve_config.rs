//! Sieve configuration (YAML schema v1)
//!
//! Every section is optional and falls back to its defaults; `version` is
//! mandatory so that future schema changes fail loudly instead of being
//! silently misread.
//!
//! ```yaml
//! version: 1
//! storage:
//!   root: ./freqsieve-state
//! checkpoint:
//!   max_replace_attempts: 5
//!   replace_backoff_ms: 50
//! archive:
//!   threshold: 100
//! prefilter:
//!   excluded_primes: [2, 3, 5, 7]
//! pool:
//!   workers: 0
//!   block_size: 1000
//! ```

use super::error::{ConfigError, ConfigResult};
use crate::prefilter::Prefilter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Schema versions this build understands
pub const SUPPORTED_VERSIONS: &[u32] = &[1];

const CURRENT_VERSION: u32 = 1;

/// Where checkpoints, markers, logs and archives live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSettings {
    pub root: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("freqsieve-state"),
        }
    }
}

/// Atomic replace retry policy for checkpoint saves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CheckpointSettings {
    pub max_replace_attempts: u32,
    pub replace_backoff_ms: u64,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            max_replace_attempts: 5,
            replace_backoff_ms: 50,
        }
    }
}

/// Job log archiving
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ArchiveSettings {
    /// Archive once this many partition logs are pending
    pub threshold: usize,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self { threshold: 100 }
    }
}

/// Small primes classified by trial division before the search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PrefilterSettings {
    pub excluded_primes: Vec<u32>,
}

impl Default for PrefilterSettings {
    fn default() -> Self {
        Self {
            excluded_primes: Prefilter::standard().excluded_primes().to_vec(),
        }
    }
}

impl PrefilterSettings {
    pub fn to_prefilter(&self) -> ConfigResult<Prefilter> {
        Prefilter::with_primes(self.excluded_primes.clone())
            .map_err(|e| ConfigError::Prefilter(e.to_string()))
    }
}

/// Interval sieve worker pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PoolSettings {
    /// 0 = one worker per CPU core
    pub workers: usize,
    pub block_size: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            workers: 0,
            block_size: 1000,
        }
    }
}

/// On-disk schema; `version` is optional here only to report it as missing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<u32>,
    #[serde(default)]
    storage: StorageSettings,
    #[serde(default)]
    checkpoint: CheckpointSettings,
    #[serde(default)]
    archive: ArchiveSettings,
    #[serde(default)]
    prefilter: PrefilterSettings,
    #[serde(default)]
    pool: PoolSettings,
}

/// Validated configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SieveConfig {
    pub storage: StorageSettings,
    pub checkpoint: CheckpointSettings,
    pub archive: ArchiveSettings,
    pub prefilter: PrefilterSettings,
    pub pool: PoolSettings,
}

impl Default for SieveConfig {
    fn default() -> Self {
        Self {
            storage: StorageSettings::default(),
            checkpoint: CheckpointSettings::default(),
            archive: ArchiveSettings::default(),
            prefilter: PrefilterSettings::default(),
            pool: PoolSettings::default(),
        }
    }
}

impl SieveConfig {
    /// Load and validate a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let file: ConfigFile = serde_yaml::from_str(content)?;
        let version = file.version.ok_or(ConfigError::MissingVersion)?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(ConfigError::UnsupportedVersion {
                found: version,
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }

        let config = Self {
            storage: file.storage,
            checkpoint: file.checkpoint,
            archive: file.archive,
            prefilter: file.prefilter,
            pool: file.pool,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        let file = ConfigFile {
            version: Some(CURRENT_VERSION),
            storage: self.storage.clone(),
            checkpoint: self.checkpoint.clone(),
            archive: self.archive.clone(),
            prefilter: self.prefilter.clone(),
            pool: self.pool.clone(),
        };
        Ok(serde_yaml::to_string(&file)?)
    }

    /// Range checks
    pub fn validate(&self) -> ConfigResult<()> {
        let attempts = self.checkpoint.max_replace_attempts;
        if !(1..=100).contains(&attempts) {
            return Err(ConfigError::range_with_hint(
                "checkpoint.max_replace_attempts",
                attempts,
                1,
                100,
                "At least one replace attempt is required",
            ));
        }

        let backoff = self.checkpoint.replace_backoff_ms;
        if backoff > 60_000 {
            return Err(ConfigError::range_with_hint(
                "checkpoint.replace_backoff_ms",
                backoff,
                0,
                60_000,
                "Backoff above one minute stalls the runner",
            ));
        }

        let threshold = self.archive.threshold;
        if !(1..=1_000_000).contains(&threshold) {
            return Err(ConfigError::range_with_hint(
                "archive.threshold",
                threshold,
                1,
                1_000_000,
                "Archive at least one log per batch",
            ));
        }

        if self.pool.block_size == 0 {
            return Err(ConfigError::range_with_hint(
                "pool.block_size",
                0,
                1,
                u64::MAX,
                "Blocks must contain at least one number",
            ));
        }

        if self.pool.workers > 1024 {
            return Err(ConfigError::range_with_hint(
                "pool.workers",
                self.pool.workers,
                0,
                1024,
                "Use 0 for one worker per core",
            ));
        }

        self.prefilter.to_prefilter()?;
        Ok(())
    }

    pub fn prefilter(&self) -> ConfigResult<Prefilter> {
        self.prefilter.to_prefilter()
    }
}
