use std::path::PathBuf;

use anyhow::Context;
use testu_pipeline::{SummaryDigester, TallyScorer};
use testu_rescore::{rescore_all, RESCORED_DIR};
use testu_store::FsReportStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "testu_rescore=info,testu_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let report_dir = std::env::var("REPORT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("reports"));
    let source = FsReportStore::new(report_dir.clone());
    let target = FsReportStore::new(report_dir.join(RESCORED_DIR));

    let summary = rescore_all(&source, &target, &TallyScorer, &SummaryDigester)
        .await
        .with_context(|| format!("rescoring {} failed", report_dir.display()))?;

    tracing::info!(
        rescored = summary.rescored,
        failed = summary.failed.len(),
        target = %target.root().display(),
        "Rescore complete",
    );
    if !summary.failed.is_empty() {
        anyhow::bail!("{} report(s) could not be rescored", summary.failed.len());
    }
    Ok(())
}
