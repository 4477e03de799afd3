//! Network Protocol Definitions
//!
//! Request/response bodies of the worker HTTP API, plus the endpoint paths the coordinator
//! uses to reach it.

use super::types::*;
use serde::{Deserialize, Serialize};

pub const ENDPOINT_ROOT: &str = "/";
pub const ENDPOINT_CREATE_INDEX: &str = "/create_index";
pub const ENDPOINT_JOB: &str = "/job";
pub const ENDPOINT_JOBS: &str = "/jobs";
pub const ENDPOINT_HEART_BEAT: &str = "/heart_beat";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIndexResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub status: JobStatus,
    pub result: Option<serde_json::Map<String, serde_json::Value>>,
    pub error: Option<String>,
}

impl From<JobRecord> for JobStatusResponse {
    fn from(record: JobRecord) -> Self {
        Self {
            status: record.status,
            result: record.result,
            error: record.error,
        }
    }
}

/// Greeting served on `/` by both roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceBanner {
    pub message: String,
    pub timestamp: String,
}

impl ServiceBanner {
    pub fn now(message: &str) -> Self {
        Self {
            message: message.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
