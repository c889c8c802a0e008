pub mod health;

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;

use crate::config::ServerConfig;
use crate::handlers::{agent, digest, status, submission};
use crate::state::AppState;

/// Build the application route tree under `config.base_path`.
///
/// Route hierarchy (relative to the base path, which may be empty):
///
/// ```text
/// /                       submission form (POST)
/// /api/job?agent=NAME     agent poll (GET)
/// /api/report             agent report (POST)
/// /reports/{id}.html      digest (GET)
/// /status?jobID=ID        status stream (GET, SSE)
/// ```
///
/// Every route except the status stream is subject to the request timeout.
/// The report route takes bodies up to `config.max_report_bytes`; the others
/// keep axum's default limit.
pub fn app_routes(config: &ServerConfig) -> Router<AppState> {
    let base_path = config.base_path.as_str();
    let request_timeout = Duration::from_secs(config.request_timeout_secs);

    let requests = Router::new()
        .route(&at(base_path, "/"), post(submission::submit_job))
        .route(&at(base_path, "/api/job"), get(agent::poll_job))
        .route(
            &at(base_path, "/api/report"),
            post(agent::submit_report).layer(DefaultBodyLimit::max(config.max_report_bytes)),
        )
        .route(&at(base_path, "/reports/{file}"), get(digest::get_digest))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ));

    let streams = Router::new().route(&at(base_path, "/status"), get(status::status_stream));

    requests.merge(streams)
}

/// Join a normalized base path and a route path. The root of a non-empty
/// base is the base itself.
fn at(base_path: &str, path: &str) -> String {
    match (base_path.is_empty(), path) {
        (true, _) => path.to_string(),
        (false, "/") => base_path.to_string(),
        (false, _) => format!("{base_path}{path}"),
    }
}
