//! Index Builder Seam
//!
//! The job manager knows nothing about how an index is produced. It hands each job's request to
//! an `IndexBuilder` and records whatever result map (or error) comes back.
//!
//! Two implementations exist in the crate:
//! - `pipeline::BuildPipeline`: the real worker flow (download, construct, upload).
//! - `CommandIndexer`: the opaque graph-construction step, delegated to an external program.

use super::types::{CreateIndexRequest, IndexBuildType, JobId};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Instant;
use tokio::process::Command;

/// Anything that can turn a `CreateIndexRequest` into a finished artifact.
#[async_trait]
pub trait IndexBuilder: Send + Sync {
    async fn build(&self, job_id: &JobId, request: &CreateIndexRequest) -> Result<Map<String, Value>>;
}

/// Builds the index file itself from a local vectors file.
///
/// This is the native-library boundary (HNSW on CPU, CAGRA on GPU).
#[async_trait]
pub trait IndexConstructor: Send + Sync {
    async fn construct(
        &self,
        request: &CreateIndexRequest,
        vectors_file: &Path,
        output_file: &Path,
    ) -> Result<Map<String, Value>>;
}

/// Runs an external index-construction program.
///
/// Invocation:
/// `<program> --input <vectors> --output <artifact> --dimensions <d> --vectors <n> --build-type <cpu|gpu>`
///
/// A JSON object printed on stdout is returned as the construction stats.
pub struct CommandIndexer {
    program: String,
    build_type: IndexBuildType,
}

impl CommandIndexer {
    pub fn new(program: impl Into<String>, build_type: IndexBuildType) -> Self {
        Self {
            program: program.into(),
            build_type,
        }
    }
}

#[async_trait]
impl IndexConstructor for CommandIndexer {
    async fn construct(
        &self,
        request: &CreateIndexRequest,
        vectors_file: &Path,
        output_file: &Path,
    ) -> Result<Map<String, Value>> {
        tracing::info!(
            "Running {} ({}) for {} -> {}",
            self.program,
            self.build_type,
            request,
            output_file.display()
        );

        let started = Instant::now();
        let output = Command::new(&self.program)
            .arg("--input")
            .arg(vectors_file)
            .arg("--output")
            .arg(output_file)
            .arg("--dimensions")
            .arg(request.dimensions.to_string())
            .arg("--vectors")
            .arg(request.number_of_vectors.to_string())
            .arg("--build-type")
            .arg(self.build_type.as_str())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to launch index builder '{}'", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Index builder exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }

        let mut stats = match serde_json::from_slice::<Value>(&output.stdout) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        stats
            .entry("totalTime")
            .or_insert_with(|| Value::from(started.elapsed().as_secs_f64()));
        stats
            .entry("unit")
            .or_insert_with(|| Value::from("seconds"));

        Ok(stats)
    }
}
