//! Job Lifecycle Manager
//!
//! Per-node table of build jobs plus a bounded execution pool.
//!
//! ## Responsibilities
//! - **Bookkeeping**: `create_job` / `update_job_status` / `get_job_status` / `get_jobs`, all under one lock.
//! - **Execution**: `start_job` returns immediately; the job waits for a free pool slot and only then
//!   becomes `running`.
//! - **Isolation**: builder errors and panics end that one job as `failed`; nothing propagates out.

use super::builder::IndexBuilder;
use super::types::*;
use crate::error::ServiceError;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

pub struct JobManager {
    jobs: Mutex<HashMap<JobId, JobRecord>>,
    builder: Arc<dyn IndexBuilder>,
    /// One permit per concurrently executing job.
    slots: Arc<Semaphore>,
    concurrency: usize,
}

impl JobManager {
    pub fn new(builder: Arc<dyn IndexBuilder>, concurrency: usize) -> Arc<Self> {
        let concurrency = concurrency.max(1);
        Arc::new(Self {
            jobs: Mutex::new(HashMap::new()),
            builder,
            slots: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Inserts a new record in `submitted` state. Ids must be unique on this node.
    pub fn create_job(&self, id: JobId, request: CreateIndexRequest) -> Result<JobRecord, ServiceError> {
        let mut jobs = self.jobs.lock();
        if jobs.contains_key(&id) {
            tracing::warn!("Rejecting duplicate job id {}", id);
            return Err(ServiceError::DuplicateJob(id.0));
        }

        let record = JobRecord::submitted(id.clone(), request);
        jobs.insert(id, record.clone());
        tracing::info!("Job {} submitted: {}", record.id, record.request);
        Ok(record)
    }

    /// Queues the build for `id` and returns without waiting for it.
    ///
    /// The returned handle resolves once the job has reached a terminal state.
    pub fn start_job(self: &Arc<Self>, id: JobId, request: CreateIndexRequest) -> JoinHandle<()> {
        let manager = self.clone();
        tracing::info!("Job started {}", id);
        tokio::spawn(async move {
            manager.run_job(id, request).await;
        })
    }

    /// Applies a partial update atomically. Unknown ids are ignored.
    ///
    /// Returns `false` when nothing was applied: either the id is unknown or the status change
    /// would move the job backwards.
    pub fn update_job_status(&self, id: &JobId, update: JobUpdate) -> bool {
        let mut jobs = self.jobs.lock();
        let Some(job) = jobs.get_mut(id) else {
            tracing::debug!("Ignoring update for unknown job {}", id);
            return false;
        };

        if let Some(next) = update.status {
            if !job.status.can_transition_to(next) {
                tracing::warn!(
                    "Ignoring illegal transition {} -> {} for job {}",
                    job.status,
                    next,
                    id
                );
                return false;
            }
            job.status = next;
        }
        if let Some(result) = update.result {
            job.result = Some(result);
        }
        if let Some(error) = update.error {
            job.error = Some(error);
        }
        true
    }

    pub fn get_job_status(&self, id: &JobId) -> Option<JobRecord> {
        self.jobs.lock().get(id).cloned()
    }

    /// Snapshot of every job this node knows about.
    pub fn get_jobs(&self) -> HashMap<JobId, JobRecord> {
        self.jobs.lock().clone()
    }

    async fn run_job(&self, id: JobId, request: CreateIndexRequest) {
        let _permit = match self.slots.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                tracing::error!("Job {} could not acquire an execution slot: {}", id, e);
                self.update_job_status(&id, JobUpdate::status(JobStatus::Running));
                self.update_job_status(&id, JobUpdate::failed(format!("Executor unavailable: {}", e)));
                return;
            }
        };

        if !self.update_job_status(&id, JobUpdate::status(JobStatus::Running)) {
            tracing::warn!("Job {} is not runnable, skipping execution", id);
            return;
        }
        tracing::info!("Starting index creation for job {}", id);

        // Run the builder on its own task so a panic ends the job rather than the pool.
        let builder = self.builder.clone();
        let build_id = id.clone();
        let outcome = tokio::spawn(async move { builder.build(&build_id, &request).await }).await;

        match outcome {
            Ok(Ok(result)) => {
                self.update_job_status(&id, JobUpdate::completed(result));
                tracing::info!("Index creation completed for job {}", id);
            }
            Ok(Err(e)) => {
                let message = format!("{:#}", e);
                tracing::error!("Error creating index for job {}: {}", id, message);
                self.update_job_status(&id, JobUpdate::failed(message));
            }
            Err(e) => {
                let message = if e.is_panic() {
                    "Index builder panicked".to_string()
                } else {
                    format!("Index builder was cancelled: {}", e)
                };
                tracing::error!("Error creating index for job {}: {}", id, message);
                self.update_job_status(&id, JobUpdate::failed(message));
            }
        }
    }
}
