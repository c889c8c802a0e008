use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method};
use axum::Router;
use testu_core::agents::AgentRoster;
use testu_pipeline::ScriptMerger;
use testu_store::{FsReportStore, ReportStore};
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use testu_api::config::ServerConfig;
use testu_api::engine::{sweeper, Dispatcher};
use testu_api::{routes, state};

use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "testu_api=debug,testu_store=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        app_url = %config.app_url,
        base_path = %config.base_path,
        "Loaded server configuration",
    );

    // --- Report store ---
    let store: Arc<dyn ReportStore> = Arc::new(FsReportStore::new(config.report_dir.clone()));
    store
        .ensure_root()
        .await
        .expect("Failed to create report directory");
    tracing::info!(dir = %config.report_dir.display(), "Report store ready");

    // --- Dispatcher ---
    let agents = AgentRoster::new(config.agents.iter().map(String::as_str));
    tracing::info!(agents = ?agents.names().collect::<Vec<_>>(), "Authorized agents");

    let mut dispatcher = Dispatcher::new(agents, config.app_url.clone(), Arc::clone(&store));
    if let Some(path) = &config.script_path {
        let merger =
            ScriptMerger::from_file(path, config.report_url()).expect("Failed to load script");
        tracing::info!(path = %path.display(), "Loaded job script");
        dispatcher = dispatcher.with_builder(Arc::new(merger));
    }
    let dispatcher = Arc::new(dispatcher);

    // --- Channel sweeper ---
    let sweeper_cancel = CancellationToken::new();
    let sweeper_handle = sweeper::start_channel_sweeper(
        Arc::clone(&dispatcher),
        Duration::from_secs(config.channel_sweep_secs),
        sweeper_cancel.clone(),
    );

    // --- CORS ---
    let cors = build_cors_layer(&config);

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        dispatcher: Arc::clone(&dispatcher),
        store,
    };

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        // Health check at root level (not under the base path).
        .merge(routes::health::router())
        // Application routes; the timeout applies to all but the status stream.
        .merge(routes::app_routes(&config))
        // -- Middleware stack (applied bottom-up) --
        // Panic recovery: catch panics and return 500 JSON.
        .layer(CatchPanicLayer::new())
        // Propagate request ID to response.
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        // Structured request/response tracing.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Set request ID on incoming requests.
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        // CORS.
        .layer(cors)
        // Shared state.
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    let shutdown_dispatcher = Arc::clone(&dispatcher);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open status streams would otherwise hold the server open.
            shutdown_dispatcher.close_all_channels().await;
        })
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Reports already acknowledged to agents must still be persisted.
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    if dispatcher.drain_processing(shutdown_timeout).await {
        tracing::info!("Report processing drained");
    } else {
        tracing::warn!(
            timeout_secs = config.shutdown_timeout_secs,
            "Report processing still running at shutdown timeout",
        );
    }

    sweeper_cancel.cancel();
    let _ = tokio::time::timeout(shutdown_timeout, sweeper_handle).await;
    tracing::info!("Channel sweeper stopped");

    let stats = dispatcher.stats().await;
    tracing::info!(
        pending = stats.pending,
        assigned = stats.assigned,
        "Jobs left unfinished at shutdown",
    );

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid, so
/// misconfiguration fails fast.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}
