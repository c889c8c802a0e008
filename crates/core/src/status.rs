//! Status events pushed to a submitter while their job moves through the
//! pipeline.
//!
//! On the wire each event is a server-sent event whose name is the
//! [`StatusKind`] tag and whose data is the JSON-serialized [`StatusEvent`].

use chrono::Utc;
use serde::Serialize;

use crate::job::JobId;
use crate::types::Timestamp;

/// Job accepted and waiting for an agent.
pub const EVENT_RECEIVED: &str = "received";

/// Job handed to an agent.
pub const EVENT_ASSIGNED: &str = "assigned";

/// The agent's report arrived and passed validation.
pub const EVENT_REPORT_RECEIVED: &str = "report_received";

/// The report was scored and saved.
pub const EVENT_SCORED: &str = "scored";

/// The digest was rendered and saved; terminal.
pub const EVENT_DIGESTED: &str = "digested";

/// Processing the report failed; terminal.
pub const EVENT_FAILED: &str = "failed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusKind {
    Received,
    Assigned { agent: String },
    ReportReceived,
    Scored,
    Digested { digest_url: String },
    Failed { reason: String },
}

impl StatusKind {
    pub fn event_name(&self) -> &'static str {
        match self {
            StatusKind::Received => EVENT_RECEIVED,
            StatusKind::Assigned { .. } => EVENT_ASSIGNED,
            StatusKind::ReportReceived => EVENT_REPORT_RECEIVED,
            StatusKind::Scored => EVENT_SCORED,
            StatusKind::Digested { .. } => EVENT_DIGESTED,
            StatusKind::Failed { .. } => EVENT_FAILED,
        }
    }

    /// After a terminal event the channel is closed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusKind::Digested { .. } | StatusKind::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    pub job_id: JobId,
    #[serde(flatten)]
    pub kind: StatusKind,
    /// Human-readable status line for display.
    pub message: String,
    pub timestamp: Timestamp,
}

impl StatusEvent {
    pub fn new(job_id: JobId, kind: StatusKind) -> Self {
        let message = match &kind {
            StatusKind::Received => {
                format!("Job {job_id} received and waiting for a testing agent.")
            }
            StatusKind::Assigned { agent } => {
                format!("Job {job_id} assigned to testing agent {agent}.")
            }
            StatusKind::ReportReceived => {
                format!("Report for job {job_id} received from the testing agent.")
            }
            StatusKind::Scored => format!("Report for job {job_id} scored."),
            StatusKind::Digested { digest_url } => {
                format!("Report for job {job_id} digested. The digest is at {digest_url}")
            }
            StatusKind::Failed { reason } => {
                format!("Processing of job {job_id} failed: {reason}")
            }
        };
        Self {
            job_id,
            kind,
            message,
            timestamp: Utc::now(),
        }
    }

    pub fn event_name(&self) -> &'static str {
        self.kind.event_name()
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}
