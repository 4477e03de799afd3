//! Worker Build Pipeline
//!
//! The body of every job executed on a worker:
//! 1. Download the raw vectors from `bucketName/objectLocation`.
//! 2. Check the file holds `numberOfVectors × dimensions` little-endian `f32` values.
//! 3. Hand the file to the `IndexConstructor` (the opaque native builder).
//! 4. Upload the artifact as `<objectLocation>.faiss.<cpu|gpu>` to the same bucket.
//!
//! Temporary files are owned by guards, so they are removed on every exit path.

use super::builder::{IndexBuilder, IndexConstructor};
use super::types::{CreateIndexRequest, IndexBuildType, JobId};
use crate::transfer::TransferManager;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Instant;

pub struct BuildPipeline {
    transfer: Arc<TransferManager>,
    constructor: Arc<dyn IndexConstructor>,
    build_type: IndexBuildType,
}

impl BuildPipeline {
    pub fn new(
        transfer: Arc<TransferManager>,
        constructor: Arc<dyn IndexConstructor>,
        build_type: IndexBuildType,
    ) -> Self {
        Self {
            transfer,
            constructor,
            build_type,
        }
    }
}

#[async_trait]
impl IndexBuilder for BuildPipeline {
    async fn build(&self, job_id: &JobId, request: &CreateIndexRequest) -> Result<Map<String, Value>> {
        tracing::info!("Building index for job {} with input: {}", job_id, request);

        let started = Instant::now();
        let dataset = self
            .transfer
            .download(&request.bucket_name, &request.object_location)
            .await?;
        let download_time = started.elapsed().as_secs_f64();

        let expected = request.expected_vector_bytes();
        if dataset.size < expected {
            anyhow::bail!(
                "Expected {} values, but got {}",
                request.number_of_vectors.saturating_mul(request.dimensions as u64),
                dataset.size / std::mem::size_of::<f32>() as u64
            );
        }

        let artifact_key = request.artifact_key(self.build_type);
        let file_name = artifact_key.replace('/', "_");
        let work_dir = tempfile::Builder::new()
            .prefix("index-build-")
            .tempdir_in(self.transfer.config().temp_dir())?;
        let artifact_path = work_dir.path().join(&file_name);

        let started = Instant::now();
        let build_stats = self
            .constructor
            .construct(request, dataset.path(), &artifact_path)
            .await?;
        let build_time = started.elapsed().as_secs_f64();
        tracing::info!("Stats for job {}: {:?}", job_id, build_stats);

        // The source vectors are no longer needed once the artifact exists.
        let downloaded_bytes = dataset.size;
        drop(dataset);

        let started = Instant::now();
        let upload = self
            .transfer
            .upload_file(&artifact_path, &request.bucket_name, &artifact_key)
            .await?;
        let upload_time = started.elapsed().as_secs_f64();

        tracing::info!("Index file uploaded for job {}: {}/{}", job_id, request.bucket_name, artifact_key);

        let mut result = Map::new();
        result.insert("indexFile".to_string(), Value::from(artifact_key));
        result.insert("bucketName".to_string(), Value::from(request.bucket_name.clone()));
        result.insert("buildType".to_string(), Value::from(self.build_type.as_str()));
        result.insert(
            "stats".to_string(),
            json!({
                "download": { "time": download_time, "unit": "seconds", "bytes": downloaded_bytes },
                "build": { "time": build_time, "unit": "seconds", "builder": build_stats },
                "upload": { "time": upload_time, "unit": "seconds", "parts": upload.parts, "bytes": upload.bytes },
            }),
        );

        Ok(result)
    }
}
