//! Configuration system
//!
//! One versioned YAML file feeds every package: storage location, checkpoint
//! retry policy, archive threshold, prefilter and worker pool. Command-line
//! flags override individual values after loading.
//!
//! # Examples
//!
//! ```rust,ignore
//! use freqsieve_core::config::SieveConfig;
//!
//! let config = SieveConfig::from_yaml("freqsieve.yaml")?;
//! let prefilter = config.prefilter()?;
//! ```

pub mod error;
pub mod sieve_config;

pub use error::{ConfigError, ConfigResult};
pub use sieve_config::{
    ArchiveSettings, CheckpointSettings, PoolSettings, PrefilterSettings, SieveConfig,
    StorageSettings, SUPPORTED_VERSIONS,
};
