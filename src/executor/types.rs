use crate::error::ServiceError;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a build job on one node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct JobId(pub String);

impl JobId {
    /// Generates a new random UUID v4-based JobId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a build job.
///
/// Transitions only move forward: `Submitted -> Running -> Completed | Failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Submitted,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal forward step.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Submitted, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Submitted => "submitted",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selects the external index builder and the artifact suffix.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexBuildType {
    Cpu,
    Gpu,
}

impl IndexBuildType {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexBuildType::Cpu => "cpu",
            IndexBuildType::Gpu => "gpu",
        }
    }
}

impl fmt::Display for IndexBuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexBuildType {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(IndexBuildType::Cpu),
            "gpu" => Ok(IndexBuildType::Gpu),
            other => Err(ServiceError::Validation(format!(
                "unknown index build type '{}', expected 'cpu' or 'gpu'",
                other
            ))),
        }
    }
}

/// A request to build one index from vectors stored at `bucketName/objectLocation`.
///
/// camelCase is the wire convention in both directions. snake_case spellings are accepted on
/// input because older clients send them; they are never emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawCreateIndexRequest")]
pub struct CreateIndexRequest {
    pub bucket_name: String,
    pub object_location: String,
    pub number_of_vectors: u64,
    pub dimensions: u32,
}

impl CreateIndexRequest {
    /// Object key the finished artifact is uploaded under.
    pub fn artifact_key(&self, build_type: IndexBuildType) -> String {
        format!("{}.faiss.{}", self.object_location, build_type)
    }

    /// Minimum number of bytes the source object must hold (little-endian `f32` vectors).
    pub fn expected_vector_bytes(&self) -> u64 {
        self.number_of_vectors
            .saturating_mul(self.dimensions as u64)
            .saturating_mul(std::mem::size_of::<f32>() as u64)
    }
}

impl fmt::Display for CreateIndexRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CreateIndexRequest(bucketName='{}', objectLocation='{}', numberOfVectors={}, dimensions={})",
            self.bucket_name, self.object_location, self.number_of_vectors, self.dimensions
        )
    }
}

/// Untyped inbound shape; validation happens in `TryFrom`.
#[derive(Debug, Deserialize)]
struct RawCreateIndexRequest {
    #[serde(rename = "bucketName", alias = "bucket_name")]
    bucket_name: Option<Value>,
    #[serde(rename = "objectLocation", alias = "object_location")]
    object_location: Option<Value>,
    #[serde(rename = "numberOfVectors", alias = "number_of_vectors")]
    number_of_vectors: Option<Value>,
    #[serde(rename = "dimensions")]
    dimensions: Option<Value>,
}

impl TryFrom<RawCreateIndexRequest> for CreateIndexRequest {
    type Error = ServiceError;

    fn try_from(raw: RawCreateIndexRequest) -> Result<Self, Self::Error> {
        let number_of_vectors = required_positive_int(raw.number_of_vectors, "numberOfVectors")?;
        let dimensions = required_positive_int(raw.dimensions, "dimensions")?;
        let dimensions = u32::try_from(dimensions).map_err(|_| {
            ServiceError::Validation(format!("dimensions is too large: {}", dimensions))
        })?;

        Ok(Self {
            bucket_name: required_string(raw.bucket_name, "bucketName")?,
            object_location: required_string(raw.object_location, "objectLocation")?,
            number_of_vectors,
            dimensions,
        })
    }
}

fn required_string(value: Option<Value>, field: &str) -> Result<String, ServiceError> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
        Some(Value::String(_)) => Err(ServiceError::Validation(format!("{} must not be empty", field))),
        Some(Value::Null) | None => Err(ServiceError::Validation(format!(
            "missing required field '{}'",
            field
        ))),
        Some(other) => Err(ServiceError::Validation(format!(
            "{} must be a string, got {}",
            field, other
        ))),
    }
}

/// Accepts JSON integers, integral floats and numeric strings, as long as the result is > 0.
fn required_positive_int(value: Option<Value>, field: &str) -> Result<u64, ServiceError> {
    let invalid = |v: &Value| {
        ServiceError::Validation(format!("{} must be a positive integer, got {}", field, v))
    };

    let value = match value {
        Some(Value::Null) | None => {
            return Err(ServiceError::Validation(format!(
                "missing required field '{}'",
                field
            )));
        }
        Some(v) => v,
    };

    let parsed = match &value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 1.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    match parsed {
        Some(n) if n > 0 => Ok(n),
        _ => Err(invalid(&value)),
    }
}

/// The node-local record of one build job.
///
/// Only serialized snapshots leave the node that owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub request: CreateIndexRequest,
    pub result: Option<serde_json::Map<String, Value>>,
    pub error: Option<String>,
}

impl JobRecord {
    pub fn submitted(id: JobId, request: CreateIndexRequest) -> Self {
        Self {
            id,
            status: JobStatus::Submitted,
            request,
            result: None,
            error: None,
        }
    }
}

/// A partial update applied atomically by `JobManager::update_job_status`.
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub result: Option<serde_json::Map<String, Value>>,
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn completed(result: serde_json::Map<String, Value>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            result: None,
            error: Some(error.into()),
        }
    }
}
