//! Atomic file replacement
//!
//! ```text
//! write .<name>.<uuid>.tmp -> fsync -> rename over <name> -> fsync(dir)
//!                                       └ retried while the OS transiently denies it
//! ```
//!
//! Readers observe either the old or the new contents. Only the rename is
//! retried; writing the temp file is not subject to the transient denials
//! seen on shared or scanned filesystems.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::{Result, StorageError};

/// Retry policy for the final rename
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplacePolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl ReplacePolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_settings(settings: &freqsieve_core::config::CheckpointSettings) -> Self {
        Self::new(
            settings.max_replace_attempts,
            Duration::from_millis(settings.replace_backoff_ms),
        )
    }
}

impl Default for ReplacePolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(50))
    }
}

/// Errors the OS may return while another process briefly holds the file
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
    )
}

/// Run `op` until it succeeds, fails permanently, or attempts run out
pub async fn replace_with_retry<F, Fut>(policy: ReplacePolicy, path: &Path, mut op: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(()) => return Ok(()),
            Err(err) if is_transient(&err) => {
                if attempt >= policy.max_attempts {
                    return Err(
                        StorageError::retry_exhausted(path.display(), policy.max_attempts)
                            .with_source(err),
                    );
                }
                warn!(
                    "Replace of {} denied ({}), retry {}/{} in {:?}",
                    path.display(),
                    err,
                    attempt,
                    policy.max_attempts,
                    policy.backoff
                );
                attempt += 1;
                tokio::time::sleep(policy.backoff).await;
            }
            Err(err) => {
                return Err(StorageError::io(format!(
                    "Replace of {} failed: {}",
                    path.display(),
                    err
                ))
                .with_source(err))
            }
        }
    }
}

/// Unique sibling temp path for `path`
pub(crate) fn temp_path_for(path: &Path) -> PathBuf {
    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
        uuid::Uuid::new_v4()
    );
    path.with_file_name(temp_name)
}

/// Write `data` to a fresh temp file next to `path` and fsync it
pub(crate) async fn write_temp(path: &Path, data: &[u8]) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let temp_path = temp_path_for(path);
    let file = tokio::fs::File::create(&temp_path).await?;
    fill_temp(file, &temp_path, data).await?;
    Ok(temp_path)
}

/// Write and fsync `data`, removing the temp file if either step fails
async fn fill_temp(mut file: tokio::fs::File, temp_path: &Path, data: &[u8]) -> Result<()> {
    // flush surfaces errors from writes tokio already reported as done
    let written: io::Result<()> = async {
        file.write_all(data).await?;
        file.flush().await?;
        file.sync_all().await
    }
    .await;

    if let Err(err) = written {
        drop(file);
        let _ = tokio::fs::remove_file(temp_path).await;
        return Err(StorageError::io(format!(
            "Write of {} failed: {}",
            temp_path.display(),
            err
        ))
        .with_source(err));
    }
    Ok(())
}

/// Best-effort fsync of the parent directory so the rename itself is durable
pub(crate) async fn sync_parent(path: &Path) {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            if let Ok(dir) = tokio::fs::File::open(parent).await {
                let _ = dir.sync_all().await;
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

/// Atomically replace `path` with `data`
pub async fn atomic_write(path: &Path, data: &[u8], policy: ReplacePolicy) -> Result<()> {
    let temp_path = write_temp(path, data).await?;

    let renamed = replace_with_retry(policy, path, || tokio::fs::rename(&temp_path, path)).await;
    if renamed.is_err() {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return renamed;
    }

    sync_parent(path).await;
    Ok(())
}

/// Atomically create `path` with `data` unless it already exists.
///
/// Returns `false` (and leaves the existing file untouched) when `path` exists.
pub async fn atomic_create(path: &Path, data: &[u8]) -> Result<bool> {
    let temp_path = write_temp(path, data).await?;

    // hard_link fails with AlreadyExists instead of overwriting
    let linked = tokio::fs::hard_link(&temp_path, path).await;
    let _ = tokio::fs::remove_file(&temp_path).await;

    match linked {
        Ok(()) => {
            sync_parent(path).await;
            Ok(true)
        }
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(err) => Err(StorageError::io(format!(
            "Create of {} failed: {}",
            path.display(),
            err
        ))
        .with_source(err)),
    }
}
