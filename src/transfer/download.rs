use super::{TransferManager, with_retry};
use crate::error::TransferError;

use futures::stream::{self, StreamExt};
use std::ops::Range;
use std::path::Path;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

/// A fully downloaded object on local disk. The file is deleted when this value is dropped.
#[derive(Debug)]
pub struct DownloadedObject {
    path: TempPath,
    pub size: u64,
}

impl DownloadedObject {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Splits `[0, size)` into consecutive ranges of at most `chunk_size` bytes.
pub fn chunk_ranges(size: u64, chunk_size: u64) -> Vec<Range<u64>> {
    let chunk_size = chunk_size.max(1);
    (0..size.div_ceil(chunk_size))
        .map(|i| {
            let start = i * chunk_size;
            start..(start + chunk_size).min(size)
        })
        .collect()
}

impl TransferManager {
    /// Downloads `bucket/key` into a temporary file.
    ///
    /// A missing object fails fast with `TransferError::NotFound` before any local file is created.
    pub async fn download(&self, bucket: &str, key: &str) -> Result<DownloadedObject, TransferError> {
        tracing::info!("Bucket name: {}, Object key: {}", bucket, key);

        let meta = with_retry(&self.config.retry, &format!("HEAD {}/{}", bucket, key), |_| {
            self.storage.head(bucket, key)
        })
        .await
        .map_err(|(_, e)| e)?
        .ok_or_else(|| TransferError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })?;

        let suffix = Path::new(key)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let temp_path = tempfile::Builder::new()
            .prefix("vectors-")
            .suffix(&suffix)
            .tempfile_in(self.config.temp_dir())?
            .into_temp_path();

        tracing::info!("Downloading {} ({} bytes) to {}", key, meta.size, temp_path.display());

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&temp_path)
            .await?;

        let ranges = chunk_ranges(meta.size, self.config.download_chunk_size);
        let total_chunks = ranges.len();

        let mut chunks = stream::iter(ranges.into_iter().enumerate())
            .map(|(idx, range)| {
                let storage = self.storage.clone();
                let policy = self.config.retry.clone();
                let what = format!("Chunk {} of {}/{}", idx + 1, bucket, key);
                async move {
                    let expected = range.end - range.start;
                    with_retry(&policy, &what, |_| {
                        let storage = storage.clone();
                        let range = range.clone();
                        async move {
                            let data = storage.get_range(bucket, key, range).await?;
                            if data.len() as u64 != expected {
                                return Err(TransferError::Storage(format!(
                                    "short read: expected {} bytes, got {}",
                                    expected,
                                    data.len()
                                )));
                            }
                            Ok(data)
                        }
                    })
                    .await
                    .map_err(|(_, e)| e)
                }
            })
            .buffered(self.config.download_concurrency.max(1));

        let mut downloaded = 0u64;
        let mut chunks_written = 0usize;
        let mut last_reported_decile = 0u64;

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;

            downloaded += chunk.len() as u64;
            chunks_written += 1;

            let progress = downloaded * 100 / meta.size.max(1);
            tracing::trace!(
                "Progress: {}% ({}/{} bytes, chunk {}/{})",
                progress,
                downloaded,
                meta.size,
                chunks_written,
                total_chunks
            );
            if progress / 10 > last_reported_decile {
                last_reported_decile = progress / 10;
                tracing::info!("Progress: {}% ({}/{} bytes)", progress, downloaded, meta.size);
            }
        }

        file.flush().await?;
        file.sync_all().await?;

        tracing::info!("Download completed: {}", temp_path.display());

        Ok(DownloadedObject {
            path: temp_path,
            size: downloaded,
        })
    }
}
