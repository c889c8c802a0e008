use std::path::PathBuf;

use testu_core::agents::DEFAULT_AGENTS;

/// Default report body limit: 256 MiB.
pub const DEFAULT_MAX_REPORT_BYTES: usize = 256 * 1024 * 1024;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3008`).
    pub port: u16,
    /// Public URL of the application, used to build links handed to
    /// agents and submitters. Never ends with `/`.
    pub app_url: String,
    /// Path prefix for every application route (default: `/testu`).
    /// Empty means the routes are mounted at the root.
    pub base_path: String,
    /// Directory where reports and digests are written.
    pub report_dir: PathBuf,
    /// Agent names allowed to poll for jobs.
    pub agents: Vec<String>,
    /// Optional JSON script every submission is merged into.
    pub script_path: Option<PathBuf>,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`). Status streams are
    /// exempt.
    pub request_timeout_secs: u64,
    /// How long to wait for background tasks at shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Interval between sweeps for disconnected status streams
    /// (default: `30`).
    pub channel_sweep_secs: u64,
    /// Largest agent report accepted, in bytes (default: 256 MiB). Reports
    /// carry the full output of every act and routinely exceed the default
    /// request body limit.
    pub max_report_bytes: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                        |
    /// |------------------------|--------------------------------|
    /// | `HOST`                 | `0.0.0.0`                      |
    /// | `PORT`                 | `3008`                         |
    /// | `APP_URL`              | `http://localhost:3008/testu`  |
    /// | `BASE_PATH`            | `/testu`                       |
    /// | `REPORT_DIR`           | `reports`                      |
    /// | `AGENTS`               | `TXRIWin,RIWSMac,PoolMac`      |
    /// | `SCRIPT_PATH`          | (built-in script)              |
    /// | `CORS_ORIGINS`         | `http://localhost:3008`        |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                           |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                           |
    /// | `CHANNEL_SWEEP_SECS`   | `30`                           |
    /// | `MAX_REPORT_BYTES`     | `268435456` (256 MiB)          |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3008".into())
            .parse()
            .expect("PORT must be a valid u16");

        let app_url = std::env::var("APP_URL")
            .unwrap_or_else(|_| "http://localhost:3008/testu".into())
            .trim_end_matches('/')
            .to_string();

        let base_path =
            normalize_base_path(&std::env::var("BASE_PATH").unwrap_or_else(|_| "/testu".into()));

        let report_dir = std::env::var("REPORT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("reports"));

        let agents = match std::env::var("AGENTS") {
            Ok(list) => split_list(&list),
            Err(_) => DEFAULT_AGENTS.iter().map(|a| a.to_string()).collect(),
        };

        let script_path = std::env::var("SCRIPT_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let cors_origins =
            split_list(&std::env::var("CORS_ORIGINS").unwrap_or_else(|_| "http://localhost:3008".into()));

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let channel_sweep_secs: u64 = std::env::var("CHANNEL_SWEEP_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("CHANNEL_SWEEP_SECS must be a valid u64");

        let max_report_bytes: usize = std::env::var("MAX_REPORT_BYTES")
            .map(|v| v.parse().expect("MAX_REPORT_BYTES must be a valid usize"))
            .unwrap_or(DEFAULT_MAX_REPORT_BYTES);

        Self {
            host,
            port,
            app_url,
            base_path,
            report_dir,
            agents,
            script_path,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            channel_sweep_secs,
            max_report_bytes,
        }
    }

    /// URL agents send their reports to.
    pub fn report_url(&self) -> String {
        format!("{}/api/report", self.app_url)
    }
}

/// Ensure a leading `/` and no trailing `/`; `/` alone becomes empty.
pub fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
