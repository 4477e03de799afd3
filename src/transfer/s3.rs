//! Amazon S3 backend.
//!
//! One client per bucket, built lazily from the standard AWS environment (credentials, endpoint)
//! plus the configured region.

use super::storage::{CompletedPart, ObjectMeta, ObjectStorage};
use crate::error::TransferError;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::multipart::{MultipartStore, PartId};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::ops::Range;
use std::sync::Arc;

pub struct S3Storage {
    region: String,
    clients: DashMap<String, Arc<AmazonS3>>,
}

impl S3Storage {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            clients: DashMap::new(),
        }
    }

    fn client(&self, bucket: &str) -> Result<Arc<AmazonS3>, TransferError> {
        if let Some(client) = self.clients.get(bucket) {
            return Ok(client.clone());
        }

        let client = AmazonS3Builder::from_env()
            .with_region(&self.region)
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| TransferError::Storage(format!("Failed to configure S3 for {}: {}", bucket, e)))?;
        let client = Arc::new(client);

        self.clients.insert(bucket.to_string(), client.clone());
        tracing::debug!("Created S3 client for bucket {} in {}", bucket, self.region);
        Ok(client)
    }
}

fn map_err(bucket: &str, key: &str, err: object_store::Error) -> TransferError {
    match err {
        object_store::Error::NotFound { .. } => TransferError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        other => TransferError::Storage(other.to_string()),
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>, TransferError> {
        let client = self.client(bucket)?;
        match client.head(&ObjectPath::from(key)).await {
            Ok(meta) => Ok(Some(ObjectMeta {
                size: meta.size as u64,
            })),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(map_err(bucket, key, e)),
        }
    }

    async fn get_range(&self, bucket: &str, key: &str, range: Range<u64>) -> Result<Bytes, TransferError> {
        let client = self.client(bucket)?;
        client
            .get_range(&ObjectPath::from(key), range.start as usize..range.end as usize)
            .await
            .map_err(|e| map_err(bucket, key, e))
    }

    async fn create_multipart(&self, bucket: &str, key: &str) -> Result<String, TransferError> {
        let client = self.client(bucket)?;
        client
            .create_multipart(&ObjectPath::from(key))
            .await
            .map_err(|e| map_err(bucket, key, e))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<CompletedPart, TransferError> {
        let client = self.client(bucket)?;
        // object_store indexes parts from zero.
        let part_idx = part_number.saturating_sub(1) as usize;
        let part = client
            .put_part(
                &ObjectPath::from(key),
                &upload_id.to_string(),
                part_idx,
                PutPayload::from(data),
            )
            .await
            .map_err(|e| map_err(bucket, key, e))?;

        Ok(CompletedPart {
            part_number,
            etag: part.content_id,
        })
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), TransferError> {
        let client = self.client(bucket)?;
        let parts = parts
            .into_iter()
            .map(|part| PartId {
                content_id: part.etag,
            })
            .collect();

        client
            .complete_multipart(&ObjectPath::from(key), &upload_id.to_string(), parts)
            .await
            .map(|_| ())
            .map_err(|e| map_err(bucket, key, e))
    }

    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) -> Result<(), TransferError> {
        let client = self.client(bucket)?;
        client
            .abort_multipart(&ObjectPath::from(key), &upload_id.to_string())
            .await
            .map_err(|e| map_err(bucket, key, e))
    }
}
