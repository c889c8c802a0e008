#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use testu_core::agents::AgentRoster;
use testu_store::{FsReportStore, ReportStore};
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use testu_api::config::ServerConfig;
use testu_api::engine::Dispatcher;
use testu_api::routes;
use testu_api::state::AppState;

pub const APP_URL: &str = "http://localhost:3008/testu";

/// Build a test `ServerConfig` writing reports under `report_dir`.
pub fn test_config(report_dir: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        app_url: APP_URL.to_string(),
        base_path: "/testu".to_string(),
        report_dir: report_dir.to_path_buf(),
        agents: vec![
            "TXRIWin".to_string(),
            "RIWSMac".to_string(),
            "PoolMac".to_string(),
        ],
        script_path: None,
        cors_origins: vec!["http://localhost:3008".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        channel_sweep_secs: 30,
        max_report_bytes: 16 * 1024 * 1024,
    }
}

/// Application router plus the dispatcher behind it, for tests that need
/// to wait on background work.
pub struct TestApp {
    pub router: Router,
    pub dispatcher: Arc<Dispatcher>,
}

/// Build the full application router with all middleware layers, storing
/// reports under `report_dir`.
///
/// This mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack that production uses.
pub fn build_test_app(report_dir: &Path) -> TestApp {
    let config = test_config(report_dir);
    let store: Arc<dyn ReportStore> = Arc::new(FsReportStore::new(report_dir));
    let dispatcher = Arc::new(Dispatcher::new(
        AgentRoster::new(config.agents.iter().map(String::as_str)),
        config.app_url.clone(),
        Arc::clone(&store),
    ));

    let app_routes = routes::app_routes(&config);
    let state = AppState {
        config: Arc::new(config),
        dispatcher: Arc::clone(&dispatcher),
        store,
    };

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:3008".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    let router = Router::new()
        .merge(routes::health::router())
        .merge(app_routes)
        .layer(CatchPanicLayer::new())
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state);

    TestApp { router, dispatcher }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_json(app: &Router, uri: &str, json: &Value) -> Response<Body> {
    post_raw(app, uri, "application/json", json.to_string()).await
}

/// POST an `application/x-www-form-urlencoded` body.
pub async fn post_form(app: &Router, uri: &str, form: &str) -> Response<Body> {
    post_raw(
        app,
        uri,
        "application/x-www-form-urlencoded",
        form.to_string(),
    )
    .await
}

pub async fn post_raw(
    app: &Router,
    uri: &str,
    content_type: &str,
    body: String,
) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

// ---------------------------------------------------------------------------
// Body helpers
// ---------------------------------------------------------------------------

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

/// Parse an SSE body into `(event name, JSON data)` pairs, skipping
/// keep-alive comments.
pub fn sse_events(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter_map(|block| {
            let mut name = None;
            let mut data = None;
            for line in block.lines() {
                if let Some(rest) = line.strip_prefix("event:") {
                    name = Some(rest.trim().to_string());
                } else if let Some(rest) = line.strip_prefix("data:") {
                    data = serde_json::from_str(rest.trim()).ok();
                }
            }
            Some((name?, data?))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Flow helpers
// ---------------------------------------------------------------------------

/// Submit a page and return the job id.
pub async fn submit(app: &Router) -> String {
    let response = post_form(
        app,
        "/testu",
        "pageURL=http%3A%2F%2Fexample.com&pageWhat=Example+home",
    )
    .await;
    body_json(response).await["data"]["job_id"]
        .as_str()
        .unwrap()
        .to_string()
}

/// Turn a polled job body into the report an agent would send back.
pub fn report_for(job: &Value, agent: &str) -> Value {
    let mut report = job.clone();
    report["jobData"] = serde_json::json!({"agent": agent, "endTime": "2026-10-17T10:00:00Z"});
    report["acts"] = serde_json::json!([
        {"type": "launch", "which": "chromium"},
        {"type": "test", "which": "axe", "result": {"totals": [0, 1, 2, 0]}}
    ]);
    report
}

/// Wait until the job reaches a terminal state.
pub async fn wait_until_finished(dispatcher: &Dispatcher, job_id: &str) {
    let id = job_id.parse().unwrap();
    for _ in 0..200 {
        if dispatcher
            .job(id)
            .await
            .is_some_and(|job| job.state.is_terminal())
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish");
}
