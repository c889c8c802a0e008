//! Batch+merge: turns a submission into the job body an agent executes.

use std::path::Path;

use serde_json::{json, Map, Value};
use testu_core::collaborators::JobBuilder;
use testu_core::error::CoreError;
use testu_core::job::{JobId, JobRequest};
use testu_core::types::Timestamp;

use crate::error::PipelineError;

/// Name of the one-target batch every submission is wrapped in.
const BATCH_ID: &str = "testuList";

/// Merges each submission into a fixed script.
#[derive(Debug, Clone)]
pub struct ScriptMerger {
    script: Map<String, Value>,
    report_url: String,
}

impl ScriptMerger {
    /// Build a merger around a script object.
    ///
    /// The script must be a JSON object. Missing top-level fields are taken
    /// from the default script.
    pub fn new(script: Value, report_url: impl Into<String>) -> Result<Self, PipelineError> {
        let Value::Object(mut script) = script else {
            return Err(PipelineError::InvalidScript(
                "script must be a JSON object".to_string(),
            ));
        };
        for (key, value) in default_script() {
            script.entry(key).or_insert(value);
        }
        if !script["acts"].is_array() {
            return Err(PipelineError::InvalidScript(
                "\"acts\" must be an array".to_string(),
            ));
        }
        Ok(Self {
            script,
            report_url: report_url.into(),
        })
    }

    /// Load the script from a JSON file.
    pub fn from_file(path: &Path, report_url: impl Into<String>) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path)?;
        let script: Value = serde_json::from_str(&raw)?;
        Self::new(script, report_url)
    }

    /// A merger around the built-in script, which has no acts.
    pub fn with_default_script(report_url: impl Into<String>) -> Self {
        Self {
            script: default_script(),
            report_url: report_url.into(),
        }
    }
}

fn default_script() -> Map<String, Value> {
    let mut script = Map::new();
    script.insert("id".into(), json!("testu"));
    script.insert("what".into(), json!("Testu accessibility test"));
    script.insert("strict".into(), json!(true));
    script.insert("timeLimit".into(), json!(300));
    script.insert("acts".into(), json!([]));
    script
}

impl JobBuilder for ScriptMerger {
    fn build(
        &self,
        id: JobId,
        request: &JobRequest,
        created_at: Timestamp,
    ) -> Result<Value, CoreError> {
        let mut job = self.script.clone();
        let script_id = job.get("id").cloned().unwrap_or(Value::Null);

        job.insert("id".into(), json!(id));
        job.insert("creationTime".into(), json!(created_at.to_rfc3339()));
        job.insert(
            "timeStamp".into(),
            json!(created_at.format("%y%m%dT%H%M").to_string()),
        );
        job.insert(
            "sources".into(),
            json!({
                "script": script_id,
                "batch": BATCH_ID,
                "target": {
                    "what": request.page_what.trim(),
                    "which": request.page_url.trim(),
                },
                "requester": "",
                "sendReportTo": self.report_url,
            }),
        );
        Ok(Value::Object(job))
    }
}
