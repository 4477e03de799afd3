//! Worker self-registration.
//!
//! A worker announces itself to the coordinator once at startup. The coordinator may still be
//! coming up, so the POST is retried with exponential backoff before giving up.

use super::protocol::ENDPOINT_REGISTER_WORKER;
use super::types::{RegisterWorkerRequest, WorkerEntry, WorkerProtocol};
use crate::config::CoordinatorEndpoint;

use anyhow::{Context, Result};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

const REGISTER_ATTEMPTS: usize = 5;
const REGISTER_TIMEOUT: Duration = Duration::from_secs(5);

/// Address the coordinator should use to reach this worker.
///
/// An explicit host wins. Otherwise a specific bind IP is used as-is; for a wildcard bind the
/// local address of the interface that routes to the coordinator is used.
pub async fn resolve_advertise_host(
    explicit: Option<&str>,
    bind_addr: SocketAddr,
    coordinator: &CoordinatorEndpoint,
) -> Result<String> {
    if let Some(host) = explicit {
        return Ok(host.to_string());
    }
    if !bind_addr.ip().is_unspecified() {
        return Ok(bind_addr.ip().to_string());
    }

    let probe = tokio::net::UdpSocket::bind(SocketAddr::new(IpAddr::from([0, 0, 0, 0]), 0)).await?;
    probe
        .connect((coordinator.host.as_str(), coordinator.port))
        .await
        .with_context(|| format!("Cannot route to coordinator {}", coordinator.base_url()))?;
    let local = probe.local_addr()?;

    if local.ip().is_unspecified() {
        anyhow::bail!("Host IP is empty; set WORKER_ADVERTISE_HOST");
    }
    Ok(local.ip().to_string())
}

pub async fn register_with_coordinator(coordinator: &CoordinatorEndpoint, host: &str, port: u16) -> Result<()> {
    let url = format!("{}{}", coordinator.base_url(), ENDPOINT_REGISTER_WORKER);
    let body = RegisterWorkerRequest {
        worker_list: vec![WorkerEntry {
            worker_url: host.to_string(),
            worker_port: port,
            worker_protocol: WorkerProtocol::Http,
        }],
    };

    tracing::info!("Registering the worker {}:{} with coordinator {}", host, port, coordinator.base_url());

    let client = reqwest::Client::new();
    let mut delay_ms = 500u64;

    for attempt in 0..REGISTER_ATTEMPTS {
        let outcome = client
            .post(&url)
            .json(&body)
            .timeout(REGISTER_TIMEOUT)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match outcome {
            Ok(response) => {
                let text = response.text().await.unwrap_or_default();
                tracing::info!("Response for registering worker is: {}", text);
                return Ok(());
            }
            Err(e) if attempt + 1 < REGISTER_ATTEMPTS => {
                tracing::warn!(
                    "Registration attempt {}/{} failed: {}",
                    attempt + 1,
                    REGISTER_ATTEMPTS,
                    e
                );
                let jitter = rand::random::<u64>() % 50;
                tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                delay_ms = (delay_ms * 2).min(8000);
            }
            Err(e) => {
                return Err(anyhow::Error::new(e).context(format!(
                    "Failed to register with coordinator {}",
                    coordinator.base_url()
                )));
            }
        }
    }

    anyhow::bail!("Retry attempts exhausted")
}
