//! Chunked Transfer Module
//!
//! Moves source vectors out of object storage and finished index artifacts back into it.
//!
//! ## Core Mechanisms
//! - **Chunked download**: an existence check first, then fixed-size ranged reads fetched in
//!   parallel and written in order to a temporary file that is removed when dropped.
//! - **Multipart upload**: the artifact is split into numbered parts uploaded by a bounded pool.
//!   Parts are sorted before completion; any unrecoverable failure aborts the session server-side.
//! - **Retry**: every chunk and part gets a fixed number of attempts with exponential backoff.
//!
//! ## Submodules
//! - **`storage`**: the `ObjectStorage` seam the rest of the crate talks to.
//! - **`s3`**: `ObjectStorage` backed by Amazon S3.
//! - **`download`** / **`upload`**: the two transfer directions.

pub mod download;
#[cfg(test)]
pub(crate) mod memory;
pub mod s3;
pub mod storage;
pub mod upload;


pub use download::DownloadedObject;
pub use storage::{CompletedPart, ObjectMeta, ObjectStorage};
pub use upload::UploadSummary;

use crate::error::TransferError;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * MIB;

/// Backoff schedule shared by chunk downloads and part uploads.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(150),
            max_delay: Duration::from_millis(1200),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub download_chunk_size: u64,
    pub download_concurrency: usize,
    pub upload_part_size: u64,
    pub upload_concurrency: usize,
    pub retry: RetryPolicy,
    /// Where temporary files go. `None` means the system temp directory.
    pub temp_dir: Option<PathBuf>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            download_chunk_size: MIB,
            download_concurrency: 8,
            upload_part_size: GIB,
            upload_concurrency: default_upload_concurrency(),
            retry: RetryPolicy::default(),
            temp_dir: None,
        }
    }
}

impl TransferConfig {
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Leaves two cores for the request server and the index builder.
pub fn default_upload_concurrency() -> usize {
    num_cpus::get().saturating_sub(2).max(1)
}

/// Entry point for both transfer directions. One instance is shared by every job on a worker;
/// per-transfer state (temp files, upload sessions) lives only inside each call.
pub struct TransferManager {
    storage: Arc<dyn ObjectStorage>,
    config: TransferConfig,
}

impl TransferManager {
    pub fn new(storage: Arc<dyn ObjectStorage>, config: TransferConfig) -> Arc<Self> {
        Arc::new(Self { storage, config })
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or runs out of attempts.
///
/// On failure returns the number of attempts made alongside the last error.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, (u32, TransferError)>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TransferError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.base_delay;

    for attempt in 1..=max_attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}",
                    what,
                    attempt,
                    max_attempts,
                    e
                );
                let jitter = Duration::from_millis(rand::random::<u64>() % 50);
                tokio::time::sleep(delay + jitter).await;
                delay = (delay * 2).min(policy.max_delay);
            }
            Err(e) => return Err((attempt, e)),
        }
    }

    Err((
        max_attempts,
        TransferError::Storage(format!("{}: retry attempts exhausted", what)),
    ))
}
