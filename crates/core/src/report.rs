//! Agent reports and their validation.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::job::JobId;

/// Top-level fields every agent report must carry.
pub const REQUIRED_REPORT_FIELDS: [&str; 9] = [
    "id",
    "what",
    "strict",
    "timeLimit",
    "acts",
    "sources",
    "creationTime",
    "timeStamp",
    "jobData",
];

/// A validated agent report.
///
/// The contents are opaque apart from the required fields; scorers mutate
/// the underlying object in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Report(Map<String, Value>);

impl Report {
    /// Validate a raw JSON value as a report.
    ///
    /// Fails with [`CoreError::InvalidReport`] naming every missing field.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        let Value::Object(map) = value else {
            return Err(CoreError::InvalidReport {
                missing: REQUIRED_REPORT_FIELDS.iter().map(|f| f.to_string()).collect(),
            });
        };

        let missing: Vec<String> = REQUIRED_REPORT_FIELDS
            .iter()
            .filter(|field| !map.contains_key(**field))
            .map(|field| field.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(CoreError::InvalidReport { missing });
        }

        Ok(Self(map))
    }

    /// The report id as sent by the agent, rendered as a string.
    pub fn id(&self) -> String {
        match &self.0["id"] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// The job this report answers.
    pub fn job_id(&self) -> Result<JobId, CoreError> {
        self.id().parse()
    }

    /// Name of the reporting agent, from `jobData.agent`.
    pub fn agent(&self) -> Option<&str> {
        self.0.get("jobData")?.get("agent")?.as_str()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
