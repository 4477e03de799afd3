//! Worker Client
//!
//! `WorkerHandle` wraps a pooled HTTP client bound to one worker and remembers the last known
//! liveness of that worker. Every call is bounded by a timeout; transport failures come back as
//! `ServiceError::WorkerCall` naming the worker and the call.

use super::types::{Worker, WorkerDescriptor, WorkerEntry, WorkerProtocol};
use crate::error::ServiceError;
use crate::executor::protocol::{ENDPOINT_CREATE_INDEX, ENDPOINT_HEART_BEAT, ENDPOINT_JOB, ENDPOINT_JOBS};
use crate::executor::types::CreateIndexRequest;

use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::{StatusCode, Url};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const MAX_IDLE_CONNECTIONS: usize = 10;

/// A worker's answer, forwarded to the caller unchanged.
#[derive(Debug, Clone)]
pub struct WorkerReply {
    pub status: StatusCode,
    pub body: Bytes,
}

pub struct WorkerHandle {
    worker: Worker,
    protocol: WorkerProtocol,
    base_url: String,
    client: reqwest::Client,
    request_timeout: Duration,
    alive: AtomicBool,
    last_seen: Mutex<Option<Instant>>,
}

impl WorkerHandle {
    pub fn new(worker: Worker, protocol: WorkerProtocol, request_timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS)
            .build()
            .map_err(|e| ServiceError::Internal(format!("Failed to build HTTP client for {}: {}", worker, e)))?;

        Ok(Self {
            base_url: format!("{}://{}:{}", protocol.as_str(), worker.host, worker.port),
            worker,
            protocol,
            client,
            request_timeout,
            alive: AtomicBool::new(true),
            last_seen: Mutex::new(None),
        })
    }

    pub fn from_entry(entry: &WorkerEntry, request_timeout: Duration) -> Result<Self, ServiceError> {
        Self::new(entry.worker(), entry.worker_protocol, request_timeout)
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    pub fn protocol(&self) -> WorkerProtocol {
        self.protocol
    }

    pub fn descriptor(&self) -> WorkerDescriptor {
        WorkerDescriptor::from(&self.worker)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn last_seen(&self) -> Option<Instant> {
        *self.last_seen.lock()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn call_error(&self, call: &'static str, err: impl std::fmt::Display) -> ServiceError {
        ServiceError::WorkerCall {
            worker: self.worker.to_string(),
            call,
            message: err.to_string(),
        }
    }

    /// Forwards a build request. Any HTTP answer is returned as-is, whatever its status.
    pub async fn create_index(&self, request: &CreateIndexRequest) -> Result<WorkerReply, ServiceError> {
        tracing::info!("Forwarding {} to worker {}", request, self.worker);

        let response = self
            .client
            .post(self.url(ENDPOINT_CREATE_INDEX))
            .json(request)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| self.call_error("create_index", e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.call_error("create_index", e))?;

        tracing::debug!("Worker {} answered create_index with {}", self.worker, status);
        Ok(WorkerReply { status, body })
    }

    /// `<base>/job/<id>` with the id as one percent-encoded path segment.
    fn job_url(&self, job_id: &str) -> Result<Url, ServiceError> {
        let mut url = Url::parse(&self.url(ENDPOINT_JOB)).map_err(|e| self.call_error("get_job", e))?;
        url.path_segments_mut()
            .map_err(|_| self.call_error("get_job", "worker URL cannot carry a path"))?
            .push(job_id);
        Ok(url)
    }

    /// Fetches one job. `Ok(None)` when this worker answers 404 for the id.
    pub async fn get_job(&self, job_id: &str) -> Result<Option<Value>, ServiceError> {
        let response = self
            .client
            .get(self.job_url(job_id)?)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| self.call_error("get_job", e))?;

        match response.status() {
            StatusCode::OK => response
                .json::<Value>()
                .await
                .map(Some)
                .map_err(|e| self.call_error("get_job", e)),
            StatusCode::NOT_FOUND => {
                tracing::debug!("No job found for {} on {}", job_id, self.worker);
                Ok(None)
            }
            status => Err(self.call_error("get_job", format!("unexpected status {} for job {}", status, job_id))),
        }
    }

    pub async fn get_jobs(&self) -> Result<Map<String, Value>, ServiceError> {
        let response = self
            .client
            .get(self.url(ENDPOINT_JOBS))
            .timeout(self.request_timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.call_error("get_jobs", e))?;

        response
            .json::<Map<String, Value>>()
            .await
            .map_err(|e| self.call_error("get_jobs", e))
    }

    /// Liveness probe. Any non-2xx answer, timeout or connection error counts as dead.
    pub async fn heart_beat(&self, timeout: Duration) -> bool {
        let outcome = self
            .client
            .get(self.url(ENDPOINT_HEART_BEAT))
            .timeout(timeout)
            .send()
            .await;

        let alive = match outcome {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!("Heartbeat for {} returned {}", self.worker, response.status());
                false
            }
            Err(e) => {
                tracing::warn!("Error in heart_beat for {}: {}", self.worker, e);
                false
            }
        };

        self.alive.store(alive, Ordering::SeqCst);
        if alive {
            *self.last_seen.lock() = Some(Instant::now());
        }
        alive
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("worker", &self.worker)
            .field("protocol", &self.protocol)
            .field("alive", &self.is_alive())
            .finish()
    }
}
