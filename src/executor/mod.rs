//! Job Execution Module
//!
//! Everything a worker node needs to accept a build request and see it through.
//!
//! ## Architecture Overview
//! 1. **Submission**: `POST /create_index` validates the body and records a `submitted` job.
//! 2. **Scheduling**: the job waits for one of a fixed number of execution slots.
//! 3. **Execution**: the job turns `running` and the `IndexBuilder` runs the download, build and
//!    upload steps.
//! 4. **Completion**: the builder's result map or error is stored and the job ends
//!    `completed` or `failed`. Callers poll `GET /job/<id>` for the outcome.
//!
//! Job tables are in memory and local to one node.
//!
//! ## Submodules
//! - **`types`**: request, job record and status types.
//! - **`manager`**: the job table and bounded execution pool.
//! - **`builder`**: the `IndexBuilder` / `IndexConstructor` seams and the external-program constructor.
//! - **`pipeline`**: the download → construct → upload builder used in production.
//! - **`protocol`**: worker HTTP DTOs and endpoint paths.
//! - **`handlers`**: worker HTTP handlers and router.

pub mod builder;
pub mod handlers;
pub mod manager;
pub mod pipeline;
pub mod protocol;
pub mod types;

#[cfg(test)]
mod tests;
