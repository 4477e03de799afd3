use super::protocol::*;
use super::service::WorkerService;
use super::types::RegisterWorkerRequest;
use crate::error::ServiceError;
use crate::executor::protocol::{ENDPOINT_CREATE_INDEX, ENDPOINT_JOBS, ENDPOINT_ROOT, ServiceBanner};
use crate::executor::types::CreateIndexRequest;

use axum::extract::rejection::JsonRejection;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router, extract::Path, http::StatusCode};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Routes served by the coordinator node.
pub fn router(service: Arc<WorkerService>) -> Router {
    Router::new()
        .route(ENDPOINT_ROOT, get(handle_root))
        .route(ENDPOINT_CREATE_INDEX, post(handle_create_index))
        .route(ENDPOINT_JOBS, get(handle_get_jobs))
        .route("/job/:id", get(handle_get_job))
        .route(ENDPOINT_REGISTER_WORKER, post(handle_register_worker))
        .route(ENDPOINT_WORKERS, get(handle_list_workers))
        .layer(Extension(service))
}

pub async fn handle_root() -> Json<ServiceBanner> {
    Json(ServiceBanner::now("Hello from Vector Index Build Service Coordinator!"))
}

pub async fn handle_create_index(
    Extension(service): Extension<Arc<WorkerService>>,
    payload: Result<Json<CreateIndexRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let Json(request) = payload.map_err(|rejection| ServiceError::Validation(rejection.body_text()))?;

    let reply = service.create_index(&request).await?;
    Ok((
        reply.status,
        [(header::CONTENT_TYPE, "application/json")],
        reply.body,
    )
        .into_response())
}

pub async fn handle_get_job(
    Extension(service): Extension<Arc<WorkerService>>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    service.get_job(&job_id).await.map(Json)
}

pub async fn handle_get_jobs(Extension(service): Extension<Arc<WorkerService>>) -> Json<Map<String, Value>> {
    Json(service.get_jobs().await)
}

pub async fn handle_register_worker(
    Extension(service): Extension<Arc<WorkerService>>,
    payload: Result<Json<RegisterWorkerRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterWorkerResponse>), ServiceError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::warn!("Rejected register_worker request: {}", rejection.body_text());
        ServiceError::Validation(rejection.body_text())
    })?;

    let response = service.register_workers(&request)?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn handle_list_workers(Extension(service): Extension<Arc<WorkerService>>) -> Json<WorkerListResponse> {
    Json(service.list_workers())
}
