//! Digest retrieval.

use axum::extract::{Path, State};
use axum::response::Html;
use testu_core::error::CoreError;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// GET {base}/reports/{id}.html
pub async fn get_digest(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> AppResult<Html<String>> {
    let not_found = || {
        AppError::Core(CoreError::NotFound {
            entity: "Digest",
            id: file.clone(),
        })
    };
    let id = file.strip_suffix(".html").ok_or_else(not_found)?;

    state
        .store
        .load_digest(id)
        .await?
        .map(Html)
        .ok_or_else(not_found)
}
