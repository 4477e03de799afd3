//! Heartbeat Monitor
//!
//! One background task probes every registered worker on a fixed interval and evicts the ones
//! that fail. Eviction is permanent; a worker comes back only by registering again.

use super::registry::WorkerRegistry;
use super::types::Worker;

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(1);

pub struct HeartbeatMonitor {
    registry: Arc<WorkerRegistry>,
    interval: Duration,
    probe_timeout: Duration,
}

/// Stops the monitor loop when asked to.
pub struct HeartbeatHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!("Heartbeat monitor ended abnormally: {}", e);
        }
    }
}

impl HeartbeatMonitor {
    pub fn new(registry: Arc<WorkerRegistry>, interval: Duration, probe_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            registry,
            interval,
            probe_timeout,
        })
    }

    /// Starts the perpetual monitoring loop on its own task.
    pub fn spawn(self: Arc<Self>) -> HeartbeatHandle {
        let (shutdown, receiver) = watch::channel(false);
        let task = tokio::spawn(async move {
            self.run(receiver).await;
        });
        HeartbeatHandle { shutdown, task }
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "Starting heartbeat monitor (interval {:?}, probe timeout {:?})",
            self.interval,
            self.probe_timeout
        );
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            // A panicking cycle must not take the monitor down with it.
            let monitor = self.clone();
            match tokio::spawn(async move { monitor.check_workers().await }).await {
                Ok(evicted) if !evicted.is_empty() => {
                    tracing::info!(
                        "Heartbeat cycle evicted {} worker(s); {} remaining",
                        evicted.len(),
                        self.registry.len()
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!("Heartbeat cycle failed: {}", e),
            }
        }

        tracing::info!("Heartbeat monitor stopped");
    }

    /// Runs one monitoring cycle and returns the workers it evicted.
    ///
    /// Probes run concurrently, so a cycle takes at most about one probe timeout.
    pub async fn check_workers(&self) -> Vec<Worker> {
        let handles = self.registry.snapshot();
        if handles.is_empty() {
            tracing::trace!("No workers registered, skipping heartbeat");
            return Vec::new();
        }

        let probes = handles.iter().map(|handle| handle.heart_beat(self.probe_timeout));
        let results = join_all(probes).await;

        let mut evicted = Vec::new();
        for (handle, alive) in handles.iter().zip(results) {
            if alive {
                tracing::trace!("Worker {} is alive", handle.worker());
                continue;
            }

            if self.registry.remove(handle.worker()).is_some() {
                tracing::warn!("Evicted worker {} after failed heartbeat", handle.worker());
                evicted.push(handle.worker().clone());
            }
        }

        evicted
    }
}
