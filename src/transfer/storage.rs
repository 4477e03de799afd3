use crate::error::TransferError;

use async_trait::async_trait;
use bytes::Bytes;
use std::ops::Range;

/// Metadata returned by an existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
}

/// Identifier the store hands back for one uploaded part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based, contiguous.
    pub part_number: u32,
    pub etag: String,
}

/// The object-storage operations the transfer manager needs.
///
/// `head` reports a missing object as `Ok(None)`; every other method reports it as
/// `TransferError::NotFound`.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>, TransferError>;

    async fn get_range(&self, bucket: &str, key: &str, range: Range<u64>) -> Result<Bytes, TransferError>;

    /// Opens a multipart session and returns its upload id.
    async fn create_multipart(&self, bucket: &str, key: &str) -> Result<String, TransferError>;

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<CompletedPart, TransferError>;

    /// `parts` must be sorted by part number.
    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), TransferError>;

    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) -> Result<(), TransferError>;
}
