use super::manager::JobManager;
use super::protocol::*;
use super::types::*;
use crate::error::ServiceError;

use axum::extract::rejection::JsonRejection;
use axum::routing::{get, post};
use axum::{Extension, Json, Router, extract::Path, http::StatusCode};
use std::collections::HashMap;
use std::sync::Arc;

/// Routes served by a worker node.
pub fn router(manager: Arc<JobManager>) -> Router {
    Router::new()
        .route(ENDPOINT_ROOT, get(handle_root))
        .route(ENDPOINT_HEART_BEAT, get(handle_heart_beat))
        .route(ENDPOINT_CREATE_INDEX, post(handle_create_index))
        .route(ENDPOINT_JOBS, get(handle_get_jobs))
        .route("/job/:id", get(handle_get_job))
        .layer(Extension(manager))
}

pub async fn handle_root() -> Json<ServiceBanner> {
    Json(ServiceBanner::now("Hello from Vector Index Build Service Worker!"))
}

/// Liveness probe. No body.
pub async fn handle_heart_beat() -> StatusCode {
    StatusCode::OK
}

pub async fn handle_create_index(
    Extension(manager): Extension<Arc<JobManager>>,
    payload: Result<Json<CreateIndexRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateIndexResponse>), ServiceError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::warn!("Rejected create_index request: {}", rejection.body_text());
        ServiceError::Validation(rejection.body_text())
    })?;
    tracing::info!("Received request: {}", request);

    let job = manager.create_job(JobId::new(), request)?;
    manager.start_job(job.id.clone(), job.request.clone());

    Ok((
        StatusCode::CREATED,
        Json(CreateIndexResponse {
            job_id: job.id,
            status: job.status,
        }),
    ))
}

pub async fn handle_get_job(
    Extension(manager): Extension<Arc<JobManager>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ServiceError> {
    let job_id = JobId(job_id);

    match manager.get_job_status(&job_id) {
        Some(job) => {
            tracing::debug!("Job status query: {} -> {}", job_id, job.status);
            Ok(Json(job.into()))
        }
        None => Err(ServiceError::JobNotFound(job_id.0)),
    }
}

pub async fn handle_get_jobs(
    Extension(manager): Extension<Arc<JobManager>>,
) -> Json<HashMap<JobId, JobRecord>> {
    Json(manager.get_jobs())
}
