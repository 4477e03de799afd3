//! Executor Module Tests
//!
//! Unit and integration tests for the worker-side job system.
//!
//! ## Test Scopes
//! - **Data Types**: request validation, wire spellings and status transitions.
//! - **Job Manager**: lifecycle bookkeeping, failure isolation and the execution slot limit.
//! - **Pipeline**: download → construct → upload against the in-memory store.
//! - **HTTP API**: the worker router served on a local port.

#[cfg(test)]
mod tests {
    use crate::error::ServiceError;
    use crate::executor::builder::{CommandIndexer, IndexBuilder, IndexConstructor};
    use crate::executor::handlers;
    use crate::executor::manager::JobManager;
    use crate::executor::pipeline::BuildPipeline;
    use crate::executor::types::*;
    use crate::transfer::memory::MemoryStorage;
    use crate::transfer::{RetryPolicy, TransferConfig, TransferManager};

    use async_trait::async_trait;
    use serde_json::{Map, Value, json};
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    fn sample_request() -> CreateIndexRequest {
        CreateIndexRequest {
            bucket_name: "vectors-bucket".to_string(),
            object_location: "data/vectors.bin".to_string(),
            number_of_vectors: 4,
            dimensions: 2,
        }
    }

    /// Builder with a fixed outcome.
    enum Outcome {
        Succeed,
        Fail(&'static str),
        Panic,
    }

    struct StaticBuilder {
        outcome: Outcome,
        calls: AtomicUsize,
    }

    impl StaticBuilder {
        fn new(outcome: Outcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl IndexBuilder for StaticBuilder {
        async fn build(&self, job_id: &JobId, _request: &CreateIndexRequest) -> anyhow::Result<Map<String, Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                Outcome::Succeed => {
                    let mut result = Map::new();
                    result.insert("indexFile".to_string(), Value::from(format!("{}.faiss.cpu", job_id)));
                    Ok(result)
                }
                Outcome::Fail(message) => Err(anyhow::anyhow!(message)),
                Outcome::Panic => panic!("builder exploded"),
            }
        }
    }

    /// Builder that blocks until the test hands out permits, tracking peak concurrency.
    struct GatedBuilder {
        gate: Semaphore,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl GatedBuilder {
        fn new(open_permits: usize) -> Arc<Self> {
            Arc::new(Self {
                gate: Semaphore::new(open_permits),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl IndexBuilder for GatedBuilder {
        async fn build(&self, _job_id: &JobId, _request: &CreateIndexRequest) -> anyhow::Result<Map<String, Value>> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let permit = self.gate.acquire().await?;
            permit.forget();
            tokio::time::sleep(Duration::from_millis(5)).await;

            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(Map::new())
        }
    }

    async fn wait_for_status(manager: &JobManager, id: &JobId, status: JobStatus) {
        for _ in 0..200 {
            if manager.get_job_status(id).map(|job| job.status) == Some(status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {} never reached {}", id, status);
    }

    // ============================================================
    // TEST 1: CreateIndexRequest - Validation and Wire Format
    // ============================================================

    #[test]
    fn test_request_accepts_camel_case() {
        let request: CreateIndexRequest = serde_json::from_value(json!({
            "bucketName": "vectors-bucket",
            "objectLocation": "data/vectors.bin",
            "numberOfVectors": 4,
            "dimensions": 2
        }))
        .unwrap();

        assert_eq!(request, sample_request());
    }

    #[test]
    fn test_request_accepts_snake_case_and_numeric_strings() {
        let request: CreateIndexRequest = serde_json::from_value(json!({
            "bucket_name": "vectors-bucket",
            "object_location": "data/vectors.bin",
            "number_of_vectors": "4",
            "dimensions": 2.0
        }))
        .unwrap();

        assert_eq!(request, sample_request());
    }

    #[test]
    fn test_request_serializes_camel_case_only() {
        let value = serde_json::to_value(sample_request()).unwrap();

        assert_eq!(
            value,
            json!({
                "bucketName": "vectors-bucket",
                "objectLocation": "data/vectors.bin",
                "numberOfVectors": 4,
                "dimensions": 2
            })
        );

        let back: CreateIndexRequest = serde_json::from_value(value).unwrap();
        assert_eq!(back, sample_request());
    }

    #[test]
    fn test_request_missing_field_is_named() {
        let err = serde_json::from_value::<CreateIndexRequest>(json!({
            "objectLocation": "data/vectors.bin",
            "numberOfVectors": 4,
            "dimensions": 2
        }))
        .unwrap_err();

        assert!(err.to_string().contains("bucketName"), "{}", err);
    }

    #[test]
    fn test_request_rejects_invalid_values() {
        let invalid = [
            json!({"bucketName": "", "objectLocation": "k", "numberOfVectors": 4, "dimensions": 2}),
            json!({"bucketName": "b", "objectLocation": "k", "numberOfVectors": 0, "dimensions": 2}),
            json!({"bucketName": "b", "objectLocation": "k", "numberOfVectors": -3, "dimensions": 2}),
            json!({"bucketName": "b", "objectLocation": "k", "numberOfVectors": 4, "dimensions": 2.5}),
            json!({"bucketName": "b", "objectLocation": "k", "numberOfVectors": "many", "dimensions": 2}),
            json!({"bucketName": 7, "objectLocation": "k", "numberOfVectors": 4, "dimensions": 2}),
            json!({"bucketName": "b", "objectLocation": "k", "numberOfVectors": 4}),
        ];

        for body in invalid {
            assert!(
                serde_json::from_value::<CreateIndexRequest>(body.clone()).is_err(),
                "accepted {}",
                body
            );
        }
    }

    #[test]
    fn test_artifact_key_and_expected_size() {
        let request = sample_request();

        assert_eq!(request.artifact_key(IndexBuildType::Cpu), "data/vectors.bin.faiss.cpu");
        assert_eq!(request.artifact_key(IndexBuildType::Gpu), "data/vectors.bin.faiss.gpu");
        assert_eq!(request.expected_vector_bytes(), 32);
    }

    #[test]
    fn test_build_type_parsing() {
        assert_eq!("CPU".parse::<IndexBuildType>().unwrap(), IndexBuildType::Cpu);
        assert_eq!(" gpu ".parse::<IndexBuildType>().unwrap(), IndexBuildType::Gpu);
        assert!(matches!("tpu".parse::<IndexBuildType>(), Err(ServiceError::Validation(_))));
    }

    // ============================================================
    // TEST 2: JobStatus - Forward-only Transitions
    // ============================================================

    #[test]
    fn test_status_transitions_only_move_forward() {
        use JobStatus::*;

        assert!(Submitted.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));

        assert!(!Submitted.can_transition_to(Completed));
        assert!(!Running.can_transition_to(Submitted));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Running));

        assert!(Completed.is_terminal() && Failed.is_terminal());
        assert!(!Submitted.is_terminal() && !Running.is_terminal());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(JobStatus::Running).unwrap(), json!("running"));
        assert_eq!(JobStatus::Completed.to_string(), "completed");
    }

    // ============================================================
    // TEST 3: JobManager - Lifecycle Bookkeeping
    // ============================================================

    #[tokio::test]
    async fn test_create_job_records_submitted() {
        let manager = JobManager::new(StaticBuilder::new(Outcome::Succeed), 2);
        let id = JobId("job-1".to_string());

        let record = manager.create_job(id.clone(), sample_request()).unwrap();

        assert_eq!(record.status, JobStatus::Submitted);
        assert!(record.result.is_none() && record.error.is_none());
        assert_eq!(manager.get_job_status(&id).unwrap().status, JobStatus::Submitted);
    }

    #[tokio::test]
    async fn test_duplicate_job_id_rejected() {
        let manager = JobManager::new(StaticBuilder::new(Outcome::Succeed), 2);
        let id = JobId("job-1".to_string());
        manager.create_job(id.clone(), sample_request()).unwrap();

        let err = manager.create_job(id, sample_request()).unwrap_err();

        assert!(matches!(err, ServiceError::DuplicateJob(ref dup) if dup == "job-1"));
        assert_eq!(manager.get_jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_update_unknown_job_is_noop() {
        let manager = JobManager::new(StaticBuilder::new(Outcome::Succeed), 2);

        let applied = manager.update_job_status(&JobId("ghost".to_string()), JobUpdate::status(JobStatus::Running));

        assert!(!applied);
        assert!(manager.get_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_update_rejects_backward_transition() {
        let manager = JobManager::new(StaticBuilder::new(Outcome::Succeed), 2);
        let id = JobId("job-1".to_string());
        manager.create_job(id.clone(), sample_request()).unwrap();

        assert!(!manager.update_job_status(&id, JobUpdate::failed("too early")));
        assert!(manager.update_job_status(&id, JobUpdate::status(JobStatus::Running)));
        assert!(manager.update_job_status(&id, JobUpdate::completed(Map::new())));
        assert!(!manager.update_job_status(&id, JobUpdate::failed("too late")));

        let job = manager.get_job_status(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
    }

    // ============================================================
    // TEST 4: JobManager - Execution Outcomes
    // ============================================================

    #[tokio::test]
    async fn test_successful_build_completes_job() {
        // ARRANGE
        let builder = StaticBuilder::new(Outcome::Succeed);
        let manager = JobManager::new(builder.clone(), 2);
        let id = JobId("job-ok".to_string());
        manager.create_job(id.clone(), sample_request()).unwrap();

        // ACT
        manager.start_job(id.clone(), sample_request()).await.unwrap();

        // ASSERT
        let job = manager.get_job_status(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.unwrap()["indexFile"], json!("job-ok.faiss.cpu"));
        assert!(job.error.is_none());
        assert_eq!(builder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_build_records_error() {
        let manager = JobManager::new(StaticBuilder::new(Outcome::Fail("disk full")), 2);
        let id = JobId("job-err".to_string());
        manager.create_job(id.clone(), sample_request()).unwrap();

        manager.start_job(id.clone(), sample_request()).await.unwrap();

        let job = manager.get_job_status(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.result.is_none());
        assert!(job.error.unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn test_panicking_build_fails_only_that_job() {
        // ARRANGE
        let manager = JobManager::new(StaticBuilder::new(Outcome::Panic), 1);
        let first = JobId("job-a".to_string());
        let second = JobId("job-b".to_string());
        manager.create_job(first.clone(), sample_request()).unwrap();
        manager.create_job(second.clone(), sample_request()).unwrap();

        // ACT
        manager.start_job(first.clone(), sample_request()).await.unwrap();
        manager.start_job(second.clone(), sample_request()).await.unwrap();

        // ASSERT: the slot was released and both jobs ended
        for id in [&first, &second] {
            let job = manager.get_job_status(id).unwrap();
            assert_eq!(job.status, JobStatus::Failed);
            assert_eq!(job.error.as_deref(), Some("Index builder panicked"));
        }
    }

    #[tokio::test]
    async fn test_jobs_wait_for_free_slot() {
        // ARRANGE: one slot, builder blocked
        let builder = GatedBuilder::new(0);
        let manager = JobManager::new(builder.clone(), 1);
        let first = JobId("job-1".to_string());
        let second = JobId("job-2".to_string());
        manager.create_job(first.clone(), sample_request()).unwrap();
        manager.create_job(second.clone(), sample_request()).unwrap();

        // ACT
        let first_handle = manager.start_job(first.clone(), sample_request());
        let second_handle = manager.start_job(second.clone(), sample_request());
        wait_for_status(&manager, &first, JobStatus::Running).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        // ASSERT: the second job has not started
        assert_eq!(manager.get_job_status(&second).unwrap().status, JobStatus::Submitted);

        builder.gate.add_permits(2);
        first_handle.await.unwrap();
        second_handle.await.unwrap();

        assert_eq!(manager.get_job_status(&first).unwrap().status, JobStatus::Completed);
        assert_eq!(manager.get_job_status(&second).unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_slots() {
        let builder = GatedBuilder::new(100);
        let manager = JobManager::new(builder.clone(), 2);
        assert_eq!(manager.concurrency(), 2);

        let mut handles = Vec::new();
        for i in 0..8 {
            let id = JobId(format!("job-{}", i));
            manager.create_job(id.clone(), sample_request()).unwrap();
            handles.push(manager.start_job(id, sample_request()));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(builder.peak.load(Ordering::SeqCst) <= 2);
        assert!(
            manager
                .get_jobs()
                .values()
                .all(|job| job.status == JobStatus::Completed)
        );
    }

    // ============================================================
    // TEST 5: BuildPipeline - Download, Construct, Upload
    // ============================================================

    struct FakeConstructor {
        called: AtomicBool,
    }

    #[async_trait]
    impl IndexConstructor for FakeConstructor {
        async fn construct(
            &self,
            request: &CreateIndexRequest,
            vectors_file: &Path,
            output_file: &Path,
        ) -> anyhow::Result<Map<String, Value>> {
            self.called.store(true, Ordering::SeqCst);
            let vectors = tokio::fs::read(vectors_file).await?;
            let mut artifact = b"INDEX".to_vec();
            artifact.extend_from_slice(&vectors);
            tokio::fs::write(output_file, artifact).await?;

            let mut stats = Map::new();
            stats.insert("vectors".to_string(), Value::from(request.number_of_vectors));
            Ok(stats)
        }
    }

    fn pipeline_fixture() -> (Arc<MemoryStorage>, Arc<FakeConstructor>, BuildPipeline, tempfile::TempDir) {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let storage = Arc::new(MemoryStorage::new());
        let config = TransferConfig {
            download_chunk_size: 8,
            download_concurrency: 2,
            upload_part_size: 16,
            upload_concurrency: 2,
            retry: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
            temp_dir: Some(temp_dir.path().to_path_buf()),
        };
        let transfer = TransferManager::new(storage.clone(), config);
        let constructor = Arc::new(FakeConstructor {
            called: AtomicBool::new(false),
        });
        let pipeline = BuildPipeline::new(transfer, constructor.clone(), IndexBuildType::Cpu);
        (storage, constructor, pipeline, temp_dir)
    }

    #[tokio::test]
    async fn test_pipeline_uploads_artifact() {
        // ARRANGE: 4 vectors x 2 dims x 4 bytes
        let (storage, _constructor, pipeline, temp_dir) = pipeline_fixture();
        let vectors: Vec<u8> = (0..32).collect();
        storage.put("vectors-bucket", "data/vectors.bin", vectors.clone());

        // ACT
        let result = pipeline
            .build(&JobId("job-1".to_string()), &sample_request())
            .await
            .unwrap();

        // ASSERT
        assert_eq!(result["indexFile"], json!("data/vectors.bin.faiss.cpu"));
        assert_eq!(result["bucketName"], json!("vectors-bucket"));
        assert_eq!(result["buildType"], json!("cpu"));
        assert_eq!(result["stats"]["download"]["bytes"], json!(32));
        assert_eq!(result["stats"]["build"]["builder"]["vectors"], json!(4));
        assert_eq!(result["stats"]["upload"]["parts"], json!(3));

        let artifact = storage.object("vectors-bucket", "data/vectors.bin.faiss.cpu").unwrap();
        assert_eq!(&artifact[..5], b"INDEX");
        assert_eq!(&artifact[5..], &vectors[..]);

        // Scratch files are gone.
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_pipeline_rejects_short_dataset() {
        let (storage, constructor, pipeline, temp_dir) = pipeline_fixture();
        storage.put("vectors-bucket", "data/vectors.bin", vec![0u8; 16]);

        let err = pipeline
            .build(&JobId("job-1".to_string()), &sample_request())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Expected 8 values, but got 4"), "{}", err);
        assert!(!constructor.called.load(Ordering::SeqCst));
        assert!(storage.object("vectors-bucket", "data/vectors.bin.faiss.cpu").is_none());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_pipeline_missing_source_object() {
        let (_storage, constructor, pipeline, _temp_dir) = pipeline_fixture();

        let err = pipeline
            .build(&JobId("job-1".to_string()), &sample_request())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("does not exist in the bucket"), "{}", err);
        assert!(!constructor.called.load(Ordering::SeqCst));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_indexer_reports_exit_status() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let input = temp_dir.path().join("in");
        let output = temp_dir.path().join("out");

        let ok = CommandIndexer::new("true", IndexBuildType::Cpu)
            .construct(&sample_request(), &input, &output)
            .await
            .unwrap();
        assert_eq!(ok["unit"], json!("seconds"));
        assert!(ok.contains_key("totalTime"));

        let err = CommandIndexer::new("false", IndexBuildType::Cpu)
            .construct(&sample_request(), &input, &output)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Index builder exited"), "{}", err);

        let err = CommandIndexer::new("no-such-index-builder-binary", IndexBuildType::Cpu)
            .construct(&sample_request(), &input, &output)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to launch"), "{}", err);
    }

    // ============================================================
    // TEST 6: Worker HTTP API
    // ============================================================

    async fn serve(manager: Arc<JobManager>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, handlers::router(manager)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_http_create_and_poll_job() {
        // ARRANGE
        let manager = JobManager::new(StaticBuilder::new(Outcome::Succeed), 2);
        let base = serve(manager.clone()).await;
        let client = reqwest::Client::new();

        // ACT: submit
        let response = client
            .post(format!("{}/create_index", base))
            .json(&sample_request())
            .send()
            .await
            .unwrap();

        // ASSERT
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], json!("submitted"));
        let job_id = JobId(body["job_id"].as_str().unwrap().to_string());

        wait_for_status(&manager, &job_id, JobStatus::Completed).await;

        let job: Value = client
            .get(format!("{}/job/{}", base, job_id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(job["status"], json!("completed"));
        assert_eq!(job["result"]["indexFile"], json!(format!("{}.faiss.cpu", job_id)));
        assert_eq!(job["error"], Value::Null);

        let jobs: Value = client.get(format!("{}/jobs", base)).send().await.unwrap().json().await.unwrap();
        assert_eq!(jobs[&job_id.0]["status"], json!("completed"));
    }

    #[tokio::test]
    async fn test_http_invalid_request_is_400() {
        let manager = JobManager::new(StaticBuilder::new(Outcome::Succeed), 2);
        let base = serve(manager.clone()).await;

        let response = reqwest::Client::new()
            .post(format!("{}/create_index", base))
            .json(&json!({"bucketName": "b", "dimensions": 2}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("numberOfVectors"), "{}", body);
        assert!(manager.get_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_http_unknown_job_is_404_and_heart_beat_is_200() {
        let manager = JobManager::new(StaticBuilder::new(Outcome::Succeed), 2);
        let base = serve(manager).await;
        let client = reqwest::Client::new();

        let missing = client.get(format!("{}/job/nope", base)).send().await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
        let body: Value = missing.json().await.unwrap();
        assert_eq!(body["error"], json!("Job not found with Id nope"));

        let heart_beat = client.get(format!("{}/heart_beat", base)).send().await.unwrap();
        assert_eq!(heart_beat.status(), reqwest::StatusCode::OK);
        assert!(heart_beat.bytes().await.unwrap().is_empty());

        let banner: Value = client.get(format!("{}/", base)).send().await.unwrap().json().await.unwrap();
        assert!(banner["message"].as_str().unwrap().contains("Worker"));
    }
}
