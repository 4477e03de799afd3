//! Worker Registry & Round-Robin Dispatch
//!
//! The registry *is* the rotation: one list of handles behind one mutex. Registration appends to
//! the tail, eviction removes from the list, and `get_next` reads-and-advances, each in a single
//! critical section. A handle therefore can never be in rotation without being registered.

use super::client::WorkerHandle;
use super::round_robin::RoundRobin;
use super::types::{Worker, WorkerDescriptor};

use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
pub struct WorkerRegistry {
    rotation: Mutex<RoundRobin<Arc<WorkerHandle>>>,
}

impl WorkerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Adds a worker at the tail of the rotation.
    ///
    /// Returns `false` (and changes nothing) when the same host and port are already registered.
    pub fn register(&self, handle: Arc<WorkerHandle>) -> bool {
        let mut rotation = self.rotation.lock();
        if rotation.contains_where(|h| h.worker() == handle.worker()) {
            tracing::warn!("Worker {} is already registered", handle.worker());
            return false;
        }

        tracing::info!("Registered worker {} ({})", handle.worker(), handle.protocol().as_str());
        rotation.push(handle);
        true
    }

    /// Next worker in round-robin order, or `None` when no worker is registered.
    pub fn get_next(&self) -> Option<Arc<WorkerHandle>> {
        self.rotation.lock().next()
    }

    /// Drops a worker from the registry and the rotation. Unknown workers are a no-op.
    pub fn remove(&self, worker: &Worker) -> Option<Arc<WorkerHandle>> {
        let removed = self.rotation.lock().remove_where(|h| h.worker() == worker);
        if removed.is_some() {
            tracing::info!("Removed worker {} from rotation", worker);
        }
        removed
    }

    pub fn contains(&self, worker: &Worker) -> bool {
        self.rotation.lock().contains_where(|h| h.worker() == worker)
    }

    pub fn list(&self) -> Vec<WorkerDescriptor> {
        self.rotation
            .lock()
            .items()
            .iter()
            .map(|h| h.descriptor())
            .collect()
    }

    /// Current handles in rotation order.
    pub fn snapshot(&self) -> Vec<Arc<WorkerHandle>> {
        self.rotation.lock().items().to_vec()
    }

    pub fn len(&self) -> usize {
        self.rotation.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rotation.lock().is_empty()
    }
}
