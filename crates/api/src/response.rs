//! Shared response envelope types for API handlers.
//!
//! Submitter-facing responses use a `{ "data": ... }` envelope. Agent-facing
//! responses keep the bare shapes agents already parse: the job body itself,
//! or a [`MessageResponse`].

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
///
/// # Example
///
/// ```ignore
/// Ok(Json(DataResponse { data: submission }))
/// ```
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// `{ "message": "..." }` acknowledgement sent to agents.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
