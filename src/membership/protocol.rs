//! Network Protocol Definitions
//!
//! Coordinator-only endpoints and bodies. The coordinator also serves `/create_index`, `/job/<id>`
//! and `/jobs` with the same paths as a worker (see `executor::protocol`).

use super::types::WorkerDescriptor;
use serde::{Deserialize, Serialize};

pub const ENDPOINT_REGISTER_WORKER: &str = "/register_worker";
pub const ENDPOINT_WORKERS: &str = "/workers";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterWorkerResponse {
    pub registered: Vec<WorkerDescriptor>,
    /// Entries whose host and port were already registered.
    pub rejected: Vec<WorkerDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerListResponse {
    #[serde(rename = "workerList")]
    pub worker_list: Vec<WorkerDescriptor>,
}
