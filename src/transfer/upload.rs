use super::storage::{CompletedPart, ObjectStorage};
use super::{RetryPolicy, TransferManager, with_retry};
use crate::error::TransferError;

use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// One slice of the local file, uploaded as a single numbered part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartSpec {
    pub part_number: u32,
    pub offset: u64,
    pub len: u64,
}

#[derive(Debug, Clone)]
pub struct UploadSummary {
    pub upload_id: String,
    pub parts: usize,
    pub bytes: u64,
}

/// Partitions a file of `size` bytes into 1-based contiguous parts.
///
/// An empty file still yields one zero-length part.
pub fn plan_parts(size: u64, part_size: u64) -> Vec<PartSpec> {
    let part_size = part_size.max(1);
    if size == 0 {
        return vec![PartSpec {
            part_number: 1,
            offset: 0,
            len: 0,
        }];
    }

    (0..size.div_ceil(part_size))
        .map(|i| {
            let offset = i * part_size;
            PartSpec {
                part_number: (i + 1) as u32,
                offset,
                len: part_size.min(size - offset),
            }
        })
        .collect()
}

impl TransferManager {
    /// Uploads a local file to `bucket/key` through a multipart session.
    ///
    /// Any unrecoverable failure aborts the session before the error is returned.
    pub async fn upload_file(&self, path: &Path, bucket: &str, key: &str) -> Result<UploadSummary, TransferError> {
        let size = tokio::fs::metadata(path).await?.len();
        let plan = plan_parts(size, self.config.upload_part_size);

        let upload_id = with_retry(
            &self.config.retry,
            &format!("Create multipart upload for {}/{}", bucket, key),
            |_| self.storage.create_multipart(bucket, key),
        )
        .await
        .map_err(|(_, e)| e)?;

        tracing::info!(
            "Uploading {} ({} bytes) to {}/{} in {} part(s), upload id {}",
            path.display(),
            size,
            bucket,
            key,
            plan.len(),
            upload_id
        );

        let mut parts = match self.upload_parts(path, bucket, key, &upload_id, &plan).await {
            Ok(parts) => parts,
            Err(e) => {
                self.abort(bucket, key, &upload_id).await;
                return Err(e);
            }
        };

        parts.sort_by_key(|part| part.part_number);
        let part_count = parts.len();

        if let Err(e) = self
            .storage
            .complete_multipart(bucket, key, &upload_id, parts)
            .await
        {
            tracing::error!("Failed to complete multipart upload {} for {}/{}: {}", upload_id, bucket, key, e);
            self.abort(bucket, key, &upload_id).await;
            return Err(e);
        }

        tracing::info!("Upload completed: {}/{} ({} parts)", bucket, key, part_count);

        Ok(UploadSummary {
            upload_id,
            parts: part_count,
            bytes: size,
        })
    }

    async fn upload_parts(
        &self,
        path: &Path,
        bucket: &str,
        key: &str,
        upload_id: &str,
        plan: &[PartSpec],
    ) -> Result<Vec<CompletedPart>, TransferError> {
        let slots = Arc::new(Semaphore::new(self.config.upload_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for spec in plan.iter().copied() {
            let job = PartUpload {
                storage: self.storage.clone(),
                policy: self.config.retry.clone(),
                path: path.to_path_buf(),
                bucket: bucket.to_string(),
                key: key.to_string(),
                upload_id: upload_id.to_string(),
                spec,
            };
            let slots = slots.clone();

            tasks.spawn(async move {
                let _slot = slots
                    .acquire_owned()
                    .await
                    .map_err(|e| TransferError::Join(e.to_string()))?;
                job.run().await
            });
        }

        let mut completed = Vec::with_capacity(plan.len());
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| TransferError::Join(e.to_string())).and_then(|r| r);
            match outcome {
                Ok(part) => completed.push(part),
                Err(e) => {
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }

        Ok(completed)
    }

    async fn abort(&self, bucket: &str, key: &str, upload_id: &str) {
        tracing::error!("Aborting multipart upload {} for {}/{}", upload_id, bucket, key);
        if let Err(e) = self.storage.abort_multipart(bucket, key, upload_id).await {
            tracing::error!("Failed to abort multipart upload {} for {}/{}: {}", upload_id, bucket, key, e);
        }
    }
}

/// Everything one pool task needs to upload one part, owned so it can run on its own task.
struct PartUpload {
    storage: Arc<dyn ObjectStorage>,
    policy: RetryPolicy,
    path: PathBuf,
    bucket: String,
    key: String,
    upload_id: String,
    spec: PartSpec,
}

impl PartUpload {
    async fn run(self) -> Result<CompletedPart, TransferError> {
        let data = read_part(&self.path, &self.spec).await?;
        let part_number = self.spec.part_number;

        let what = format!("Part {} of {}/{}", part_number, self.bucket, self.key);
        let part = with_retry(&self.policy, &what, |_| {
            self.storage
                .upload_part(&self.bucket, &self.key, &self.upload_id, part_number, data.clone())
        })
        .await
        .map_err(|(attempts, e)| TransferError::PartFailed {
            part: part_number,
            attempts,
            message: e.to_string(),
        })?;

        tracing::debug!("Uploaded part {} ({} bytes) of {}/{}", part_number, self.spec.len, self.bucket, self.key);
        Ok(part)
    }
}

/// Buffers the whole part, so peak memory is about `upload_concurrency × upload_part_size`.
async fn read_part(path: &Path, spec: &PartSpec) -> Result<Bytes, TransferError> {
    let mut buf = vec![0u8; spec.len as usize];
    if spec.len > 0 {
        let mut file = tokio::fs::File::open(path).await?;
        file.seek(SeekFrom::Start(spec.offset)).await?;
        file.read_exact(&mut buf).await?;
    }
    Ok(Bytes::from(buf))
}
