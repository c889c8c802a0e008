//! Handlers for the testing-agent protocol.
//!
//! Agents poll for work and post their reports back. Responses keep the
//! bare shapes agents parse: the job body itself, or `{"message": ...}`.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::response::MessageResponse;
use crate::state::AppState;

/// Query parameters for [`poll_job`].
#[derive(Debug, Deserialize)]
pub struct PollQuery {
    pub agent: Option<String>,
}

/// GET {base}/api/job?agent=NAME
///
/// Hand the oldest pending job to an authorized agent. An empty queue is
/// answered with a message, never by waiting.
pub async fn poll_job(
    State(state): State<AppState>,
    Query(query): Query<PollQuery>,
) -> AppResult<Response> {
    let agent = query.agent.unwrap_or_default();
    let response = match state.dispatcher.poll(&agent).await? {
        Some(job) => Json(job.body).into_response(),
        None => Json(MessageResponse::new(format!(
            "No network job at {} to do",
            state.config.app_url
        )))
        .into_response(),
    };
    Ok(response)
}

/// POST {base}/api/report
///
/// Validate the report and acknowledge it at once. Scoring, persistence and
/// digesting continue in a tracked background task. The body limit is
/// `MAX_REPORT_BYTES`, set on the route.
pub async fn submit_report(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<MessageResponse>> {
    let value: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Report is not valid JSON: {e}")))?;

    let accepted = state.dispatcher.accept_report(value).await?;
    let job_id = accepted.job_id();

    state.dispatcher.spawn_processing(accepted);

    Ok(Json(MessageResponse::new(format!(
        "Report {job_id} received and validated"
    ))))
}
