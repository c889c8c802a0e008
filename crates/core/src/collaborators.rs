//! Seams for the external steps the dispatcher drives but does not own.
//!
//! Building a job body from a request, scoring a report and rendering a
//! digest are opaque to the dispatch engine. Implementations live in the
//! pipeline crate (and in tests).

use async_trait::async_trait;

use crate::error::CoreError;
use crate::job::{JobId, JobRequest};
use crate::report::Report;
use crate::types::Timestamp;

/// Turns a submission into the task description an agent executes
/// (the batch+merge step).
pub trait JobBuilder: Send + Sync {
    fn build(
        &self,
        id: JobId,
        request: &JobRequest,
        created_at: Timestamp,
    ) -> Result<serde_json::Value, CoreError>;
}

/// Scores a report in place.
pub trait Scorer: Send + Sync {
    fn score(&self, report: &mut Report) -> Result<(), CoreError>;
}

/// Renders a scored report into a human-readable digest.
#[async_trait]
pub trait Digester: Send + Sync {
    async fn digest(&self, report: &Report) -> Result<String, CoreError>;
}
