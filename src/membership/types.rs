use crate::error::ServiceError;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A reachable build-worker process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Worker {
    pub host: String,
    pub port: u16,
}

impl Worker {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Transport scheme used to reach a worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerProtocol {
    #[default]
    Http,
    Https,
}

impl WorkerProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerProtocol::Http => "http",
            WorkerProtocol::Https => "https",
        }
    }
}

/// Public view of a registered worker, as listed by `GET /workers`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerDescriptor {
    #[serde(rename = "workerURL")]
    pub worker_url: String,
    #[serde(rename = "workerPort")]
    pub worker_port: u16,
}

impl From<&Worker> for WorkerDescriptor {
    fn from(worker: &Worker) -> Self {
        Self {
            worker_url: worker.host.clone(),
            worker_port: worker.port,
        }
    }
}

/// One entry of a `/register_worker` body.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WorkerEntry {
    #[serde(rename = "workerURL")]
    pub worker_url: String,
    #[serde(rename = "workerPort")]
    pub worker_port: u16,
    #[serde(rename = "workerProtocol")]
    pub worker_protocol: WorkerProtocol,
}

impl WorkerEntry {
    pub fn worker(&self) -> Worker {
        Worker::new(self.worker_url.clone(), self.worker_port)
    }
}

/// Body of `POST /register_worker`, also the format of the dev seed file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "RawRegisterWorkerRequest")]
pub struct RegisterWorkerRequest {
    #[serde(rename = "workerList")]
    pub worker_list: Vec<WorkerEntry>,
}

#[derive(Debug, Deserialize)]
struct RawRegisterWorkerRequest {
    #[serde(rename = "workerList")]
    worker_list: Option<Vec<RawWorkerEntry>>,
}

#[derive(Debug, Deserialize)]
struct RawWorkerEntry {
    #[serde(rename = "workerURL")]
    worker_url: Option<String>,
    #[serde(rename = "workerPort")]
    worker_port: Option<Value>,
    #[serde(rename = "workerProtocol")]
    worker_protocol: Option<String>,
}

impl TryFrom<RawRegisterWorkerRequest> for RegisterWorkerRequest {
    type Error = ServiceError;

    fn try_from(raw: RawRegisterWorkerRequest) -> Result<Self, Self::Error> {
        let entries = match raw.worker_list {
            Some(list) if !list.is_empty() => list,
            Some(_) => {
                return Err(ServiceError::Validation(
                    "At least 1 worker should be present in workerList".to_string(),
                ));
            }
            None => {
                return Err(ServiceError::Validation(
                    "missing required field 'workerList'".to_string(),
                ));
            }
        };

        let worker_list = entries
            .into_iter()
            .enumerate()
            .map(|(idx, entry)| parse_entry(idx, entry))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { worker_list })
    }
}

fn parse_entry(idx: usize, entry: RawWorkerEntry) -> Result<WorkerEntry, ServiceError> {
    let worker_url = entry
        .worker_url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ServiceError::Validation(format!("workerList[{}] is missing 'workerURL'", idx)))?;

    let worker_port = match entry.worker_port {
        None | Some(Value::Null) => {
            return Err(ServiceError::Validation(format!(
                "workerList[{}] is missing 'workerPort'",
                idx
            )));
        }
        Some(Value::Number(n)) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Some(Value::String(s)) => s.trim().parse::<u16>().ok(),
        Some(_) => None,
    }
    .filter(|port| *port > 0)
    .ok_or_else(|| ServiceError::Validation(format!("workerList[{}] has an invalid 'workerPort'", idx)))?;

    let worker_protocol = match entry.worker_protocol.as_deref().map(str::trim) {
        None | Some("") => WorkerProtocol::Http,
        Some(p) if p.eq_ignore_ascii_case("http") => WorkerProtocol::Http,
        Some(p) if p.eq_ignore_ascii_case("https") => WorkerProtocol::Https,
        Some(other) => {
            return Err(ServiceError::Validation(format!(
                "workerList[{}] has an unsupported workerProtocol '{}'",
                idx, other
            )));
        }
    };

    Ok(WorkerEntry {
        worker_url,
        worker_port,
        worker_protocol,
    })
}
