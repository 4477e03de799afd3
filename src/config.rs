//! Node Configuration
//!
//! Both roles are configured from environment variables, read once at startup.
//! Every loader takes a lookup closure so tests never have to mutate the process environment;
//! `from_env` simply plugs in `std::env::var`.

use crate::executor::types::IndexBuildType;
use crate::transfer::TransferConfig;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_COORDINATOR_PORT: u16 = 6006;
pub const DEFAULT_WORKER_PORT: u16 = 6005;

const DEFAULT_SEED_FILE: &str = "config/workers.json";
const DEFAULT_BUILDER_COMMAND: &str = "faiss-index-builder";
const DEFAULT_REGION: &str = "us-west-2";
const DEFAULT_JOB_CONCURRENCY: usize = 5;

/// Deployment domain. `Dev` bootstraps workers from a static seed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub domain: Domain,
    pub seed_file: PathBuf,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub worker_request_timeout: Duration,
}

impl CoordinatorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let domain = match lookup("DOMAIN").as_deref().map(str::trim) {
            Some(d) if d.eq_ignore_ascii_case("dev") => Domain::Dev,
            _ => Domain::Prod,
        };

        Ok(Self {
            domain,
            seed_file: lookup("WORKER_SEED_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SEED_FILE)),
            heartbeat_interval: Duration::from_secs(parse_or(&lookup, "HEARTBEAT_INTERVAL_SECS", 5)?),
            heartbeat_timeout: Duration::from_millis(parse_or(&lookup, "HEARTBEAT_TIMEOUT_MS", 1000)?),
            worker_request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "WORKER_REQUEST_TIMEOUT_SECS",
                30,
            )?),
        })
    }
}

/// Where a worker finds the coordinator it registers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorEndpoint {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl CoordinatorEndpoint {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub register_with_coordinator: bool,
    pub coordinator: Option<CoordinatorEndpoint>,
    pub advertise_host: Option<String>,
    pub build_type: IndexBuildType,
    pub builder_command: String,
    pub aws_region: String,
    pub job_concurrency: usize,
    pub transfer: TransferConfig,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let register_with_coordinator = parse_or::<u8, _>(&lookup, "REGISTER_WITH_COORDINATOR", 1)? == 1;

        let coordinator = lookup("COORDINATOR_NODE_URL")
            .map(|host| host.trim().to_string())
            .filter(|host| !host.is_empty())
            .map(|host| -> Result<CoordinatorEndpoint> {
                Ok(CoordinatorEndpoint {
                    protocol: lookup("COORDINATOR_NODE_PROTOCOL").unwrap_or_else(|| "http".to_string()),
                    host,
                    port: parse_or(&lookup, "COORDINATOR_NODE_PORT", DEFAULT_COORDINATOR_PORT)?,
                })
            })
            .transpose()?;

        if register_with_coordinator && coordinator.is_none() {
            anyhow::bail!("COORDINATOR_NODE_URL must be set when REGISTER_WITH_COORDINATOR=1");
        }

        let build_type = match lookup("INDEX_BUILD_TYPE") {
            Some(raw) => raw.parse::<IndexBuildType>()?,
            None => IndexBuildType::Cpu,
        };

        let job_concurrency = parse_or(&lookup, "JOB_CONCURRENCY", DEFAULT_JOB_CONCURRENCY)?.max(1);

        Ok(Self {
            register_with_coordinator,
            coordinator,
            advertise_host: lookup("WORKER_ADVERTISE_HOST").filter(|h| !h.trim().is_empty()),
            build_type,
            builder_command: lookup("INDEX_BUILDER_COMMAND")
                .unwrap_or_else(|| DEFAULT_BUILDER_COMMAND.to_string()),
            aws_region: lookup("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            job_concurrency,
            transfer: TransferConfig::default(),
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    <T as std::str::FromStr>::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
