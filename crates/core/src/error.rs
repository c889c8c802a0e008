use crate::job::JobId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Agent '{agent}' is not authorized to take jobs")]
    Unauthorized { agent: String },

    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("Report received, but it was invalid (missing: {})", missing.join(", "))]
    InvalidReport { missing: Vec<String> },

    #[error("No assigned job with id {0}")]
    UnknownJob(String),

    #[error("No status channel registered for job {0}")]
    ChannelNotFound(JobId),

    #[error("Status channel for job {0} was closed by the submitter")]
    ChannelGone(JobId),

    #[error("A status channel is already open for job {0}")]
    DuplicateRegistration(JobId),

    #[error("Internal error: {0}")]
    Internal(String),
}
