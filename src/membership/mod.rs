//! Worker Membership Module
//!
//! The coordinator's view of the worker pool: who is registered, who gets the next build request,
//! and who has stopped answering.
//!
//! ## Core Mechanisms
//! - **Registration**: workers are added explicitly (`POST /register_worker`, the dev seed file,
//!   or a worker announcing itself at startup). Duplicate host/port pairs are rejected.
//! - **Round-robin dispatch**: build requests cycle through the *current* membership. The rotation
//!   and the registry are one structure behind one lock.
//! - **Failure detection**: a heartbeat monitor probes every worker on a fixed interval and evicts
//!   any worker that misses a single probe. Evicted workers stay out until they register again.
//!
//! ## Submodules
//! - **`types`**: `Worker`, registration bodies and descriptors.
//! - **`round_robin`**: the cyclic cursor used by the registry.
//! - **`client`**: `WorkerHandle`, the per-worker HTTP client.
//! - **`registry`**: `WorkerRegistry`, the shared membership list and rotation.
//! - **`heartbeat`**: `HeartbeatMonitor`, the background liveness loop.
//! - **`service`**: `WorkerService`, fan-out of coordinator requests to workers.
//! - **`bootstrap`**: worker self-registration at startup.
//! - **`protocol`** / **`handlers`**: coordinator HTTP API.

pub mod bootstrap;
pub mod client;
pub mod handlers;
pub mod heartbeat;
pub mod protocol;
pub mod registry;
pub mod round_robin;
pub mod service;
pub mod types;
