//! Job model: identifiers, submission requests and lifecycle state.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// Creation-ordered job identifier.
///
/// The value is the creation time in microseconds since the Unix epoch,
/// bumped past the previously issued id when the clock has not advanced.
/// It renders as a fixed-width decimal string so lexical order matches
/// creation order on the wire and on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct JobId(u64);

/// Width of the rendered id. `u64::MAX` has 20 decimal digits.
const JOB_ID_WIDTH: usize = 20;

impl JobId {
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Approximate creation time encoded in the id.
    pub fn created_at(self) -> Option<Timestamp> {
        i64::try_from(self.0)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_micros)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.0, width = JOB_ID_WIDTH)
    }
}

impl FromStr for JobId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > JOB_ID_WIDTH || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::UnknownJob(s.to_string()));
        }
        s.parse::<u64>()
            .map(JobId)
            .map_err(|_| CoreError::UnknownJob(s.to_string()))
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for JobId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Issues strictly increasing [`JobId`]s.
///
/// Not thread-safe on its own; the owning queue is always accessed under
/// the dispatcher lock.
#[derive(Debug, Default)]
pub struct JobIdGenerator {
    last: u64,
}

impl JobIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the id for a job created at `now`.
    pub fn next(&mut self, now: Timestamp) -> JobId {
        let micros = u64::try_from(now.timestamp_micros()).unwrap_or(0);
        let id = micros.max(self.last.saturating_add(1));
        self.last = id;
        JobId(id)
    }
}

// ---------------------------------------------------------------------------
// JobRequest
// ---------------------------------------------------------------------------

/// What a submitter asks for: a page to test and a label for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(rename = "pageURL", default)]
    pub page_url: String,
    #[serde(rename = "pageWhat", default)]
    pub page_what: String,
}

impl JobRequest {
    pub fn new(page_url: impl Into<String>, page_what: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
            page_what: page_what.into(),
        }
    }

    /// Check that both fields are present and the target is an HTTP(S) URL.
    pub fn validate(&self) -> Result<(), CoreError> {
        let url = self.page_url.trim();
        if url.is_empty() {
            return Err(CoreError::InvalidSubmission(
                "pageURL must not be empty".to_string(),
            ));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CoreError::InvalidSubmission(format!(
                "pageURL must be an http or https URL, got \"{url}\""
            )));
        }
        if self.page_what.trim().is_empty() {
            return Err(CoreError::InvalidSubmission(
                "pageWhat must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JobState / Job
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Assigned,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Assigned => write!(f, "assigned"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal outcome passed to [`JobQueue::mark_terminal`](crate::queue::JobQueue::mark_terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
}

impl From<JobOutcome> for JobState {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Completed => JobState::Completed,
            JobOutcome::Failed => JobState::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub request: JobRequest,
    /// Task description handed verbatim to the agent.
    pub body: serde_json::Value,
    pub state: JobState,
    pub agent: Option<String>,
    pub created_at: Timestamp,
    pub assigned_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

impl Job {
    pub fn new(
        id: JobId,
        request: JobRequest,
        body: serde_json::Value,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            request,
            body,
            state: JobState::Pending,
            agent: None,
            created_at,
            assigned_at: None,
            finished_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
