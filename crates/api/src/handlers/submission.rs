//! Handler for the submission form.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Form, Json};
use testu_core::job::JobRequest;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST {base}
///
/// Accept a page to test (form fields `pageURL` and `pageWhat`). Returns 201
/// with the job id and the URLs of its status stream and future digest.
pub async fn submit_job(
    State(state): State<AppState>,
    Form(input): Form<JobRequest>,
) -> AppResult<impl IntoResponse> {
    let submission = state.dispatcher.submit(input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: submission })))
}
