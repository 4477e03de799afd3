//! Coordinator Worker Service
//!
//! Fans requests out to the worker pool: one worker per build request (round-robin with failover),
//! every worker for job queries. A failure on one worker is logged and skipped whenever another
//! worker can still serve the request.

use super::client::{WorkerHandle, WorkerReply};
use super::protocol::{RegisterWorkerResponse, WorkerListResponse};
use super::registry::WorkerRegistry;
use super::types::{RegisterWorkerRequest, WorkerDescriptor};
use crate::error::ServiceError;
use crate::executor::types::CreateIndexRequest;

use anyhow::Context;
use futures::future::join_all;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub struct WorkerService {
    registry: Arc<WorkerRegistry>,
    request_timeout: Duration,
}

impl WorkerService {
    pub fn new(registry: Arc<WorkerRegistry>, request_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            registry,
            request_timeout,
        })
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    /// Dispatches a build request to the next worker in rotation.
    ///
    /// If the chosen worker cannot be reached the rotation advances, at most once per registered
    /// worker. An HTTP answer of any status ends the search and is returned verbatim.
    pub async fn create_index(&self, request: &CreateIndexRequest) -> Result<WorkerReply, ServiceError> {
        let attempts = self.registry.len().max(1);
        let mut last_error = None;

        for _ in 0..attempts {
            let Some(handle) = self.registry.get_next() else {
                break;
            };

            match handle.create_index(request).await {
                Ok(reply) => {
                    tracing::info!("Dispatched {} to worker {} ({})", request, handle.worker(), reply.status);
                    return Ok(reply);
                }
                Err(e) => {
                    tracing::warn!("Dispatch to {} failed, trying next worker: {}", handle.worker(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(ServiceError::NoWorkerAvailable))
    }

    /// First positive answer for `job_id`, asking every worker in parallel.
    pub async fn get_job(&self, job_id: &str) -> Result<Value, ServiceError> {
        let handles = self.registry.snapshot();
        let answers = join_all(handles.iter().map(|handle| handle.get_job(job_id))).await;

        for (handle, answer) in handles.iter().zip(answers) {
            match answer {
                Ok(Some(job)) => return Ok(job),
                Ok(None) => tracing::debug!("Job {} not on {}", job_id, handle.worker()),
                Err(e) => tracing::warn!("{}", e),
            }
        }

        tracing::info!("No job found for {} across {} worker(s)", job_id, handles.len());
        Err(ServiceError::JobNotFound(job_id.to_string()))
    }

    /// Merged job map across every reachable worker.
    pub async fn get_jobs(&self) -> Map<String, Value> {
        let handles = self.registry.snapshot();
        let answers = join_all(handles.iter().map(|handle| handle.get_jobs())).await;

        let mut jobs = Map::new();
        for answer in answers {
            match answer {
                Ok(worker_jobs) => jobs.extend(worker_jobs),
                Err(e) => tracing::warn!("{}", e),
            }
        }

        tracing::debug!("Collected {} job(s) from {} worker(s)", jobs.len(), handles.len());
        jobs
    }

    pub fn register_workers(&self, request: &RegisterWorkerRequest) -> Result<RegisterWorkerResponse, ServiceError> {
        tracing::info!("Registering {} worker(s)", request.worker_list.len());

        let mut response = RegisterWorkerResponse::default();
        for entry in &request.worker_list {
            let handle = WorkerHandle::from_entry(entry, self.request_timeout)?;
            let descriptor = WorkerDescriptor::from(handle.worker());

            if self.registry.register(Arc::new(handle)) {
                response.registered.push(descriptor);
            } else {
                response.rejected.push(descriptor);
            }
        }

        Ok(response)
    }

    pub fn list_workers(&self) -> WorkerListResponse {
        WorkerListResponse {
            worker_list: self.registry.list(),
        }
    }

    /// Registers every worker listed in a seed file (same shape as a `/register_worker` body).
    pub async fn load_seed_file(&self, path: &Path) -> anyhow::Result<usize> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read worker seed file {}", path.display()))?;
        let request: RegisterWorkerRequest = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid worker seed file {}", path.display()))?;

        let response = self.register_workers(&request)?;
        tracing::info!(
            "Seeded {} worker(s) from {} ({} rejected)",
            response.registered.len(),
            path.display(),
            response.rejected.len()
        );
        Ok(response.registered.len())
    }
}
