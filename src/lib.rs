//! Vector Index Build Cluster Library
//!
//! Coordination layer for building vector-search indexes on a pool of worker nodes.
//! The same crate runs as either node role; `main.rs` wires one or the other.
//!
//! ## Architecture Modules
//! - **`membership`**: coordinator side. Worker registry, round-robin dispatch, heartbeat-based
//!   eviction and fan-out of job queries.
//! - **`executor`**: worker side. Per-node job table, bounded asynchronous execution and the
//!   download → build → upload pipeline.
//! - **`transfer`**: chunked, retrying transfers between local disk and object storage.
//! - **`config`**: environment-driven configuration for both roles.
//! - **`error`**: error taxonomy and its mapping to HTTP responses.

pub mod config;
pub mod error;
pub mod executor;
pub mod membership;
pub mod transfer;
