//! In-memory `ObjectStorage` used by the transfer and pipeline tests.
//!
//! Supports failure injection per part number and per ranged read, and records every
//! completed and aborted multipart session.

use super::storage::{CompletedPart, ObjectMeta, ObjectStorage};
use crate::error::TransferError;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

struct PendingUpload {
    bucket: String,
    key: String,
    parts: HashMap<u32, Bytes>,
}

#[derive(Default)]
pub(crate) struct MemoryStorage {
    objects: Mutex<HashMap<(String, String), Bytes>>,
    uploads: Mutex<HashMap<String, PendingUpload>>,
    next_upload: AtomicU64,
    /// part number -> remaining injected failures
    part_failures: Mutex<HashMap<u32, u32>>,
    range_failures: AtomicU32,
    complete_fails: Mutex<bool>,
    pub part_attempts: Mutex<HashMap<u32, u32>>,
    pub completed: Mutex<Vec<(String, Vec<u32>)>>,
    pub aborted: Mutex<Vec<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        self.objects
            .lock()
            .insert((bucket.to_string(), key.to_string()), data.into());
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn fail_part(&self, part_number: u32, times: u32) {
        self.part_failures.lock().insert(part_number, times);
    }

    pub fn fail_ranges(&self, times: u32) {
        self.range_failures.store(times, Ordering::SeqCst);
    }

    pub fn fail_complete(&self) {
        *self.complete_fails.lock() = true;
    }

    pub fn pending_uploads(&self) -> usize {
        self.uploads.lock().len()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>, TransferError> {
        Ok(self.object(bucket, key).map(|data| ObjectMeta {
            size: data.len() as u64,
        }))
    }

    async fn get_range(&self, bucket: &str, key: &str, range: Range<u64>) -> Result<Bytes, TransferError> {
        let injected = self
            .range_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(TransferError::Storage("injected range failure".to_string()));
        }

        let data = self.object(bucket, key).ok_or_else(|| TransferError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })?;
        let end = (range.end as usize).min(data.len());
        let start = (range.start as usize).min(end);
        Ok(data.slice(start..end))
    }

    async fn create_multipart(&self, bucket: &str, key: &str) -> Result<String, TransferError> {
        let upload_id = format!("upload-{}", self.next_upload.fetch_add(1, Ordering::SeqCst));
        self.uploads.lock().insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: HashMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<CompletedPart, TransferError> {
        *self.part_attempts.lock().entry(part_number).or_insert(0) += 1;

        {
            let mut failures = self.part_failures.lock();
            if let Some(remaining) = failures.get_mut(&part_number)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(TransferError::Storage(format!("injected failure for part {}", part_number)));
            }
        }

        let mut uploads = self.uploads.lock();
        let upload = uploads
            .get_mut(upload_id)
            .ok_or_else(|| TransferError::Storage(format!("no such upload {}", upload_id)))?;
        upload.parts.insert(part_number, data);

        Ok(CompletedPart {
            part_number,
            etag: format!("etag-{}", part_number),
        })
    }

    async fn complete_multipart(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), TransferError> {
        if *self.complete_fails.lock() {
            return Err(TransferError::Storage("injected completion failure".to_string()));
        }

        let upload = self
            .uploads
            .lock()
            .remove(upload_id)
            .ok_or_else(|| TransferError::Storage(format!("no such upload {}", upload_id)))?;

        let mut body = BytesMut::new();
        for part in &parts {
            let data = upload
                .parts
                .get(&part.part_number)
                .ok_or_else(|| TransferError::Storage(format!("missing part {}", part.part_number)))?;
            body.extend_from_slice(data);
        }

        self.put(&upload.bucket, &upload.key, body.freeze());
        self.completed.lock().push((
            upload_id.to_string(),
            parts.iter().map(|part| part.part_number).collect(),
        ));
        Ok(())
    }

    async fn abort_multipart(&self, _bucket: &str, _key: &str, upload_id: &str) -> Result<(), TransferError> {
        self.uploads.lock().remove(upload_id);
        self.aborted.lock().push(upload_id.to_string());
        Ok(())
    }
}
