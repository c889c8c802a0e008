//! Offline re-scoring of persisted reports.
//!
//! Every report in the source store is scored again with the current scorer
//! and digester, and the results are written to the target store. The
//! source files are left untouched.

use anyhow::Context;
use testu_core::collaborators::{Digester, Scorer};
use testu_store::ReportStore;

/// Name of the directory, under the report directory, that receives the
/// rescored files.
pub const RESCORED_DIR: &str = "rescored";

/// Outcome of a rescore run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RescoreSummary {
    pub rescored: usize,
    pub failed: Vec<String>,
}

/// Rescore every report in `source` into `target`.
///
/// A report that cannot be loaded, scored or digested is logged and listed
/// in [`RescoreSummary::failed`]; the run continues with the next one.
/// Only listing the source or preparing the target aborts the run.
pub async fn rescore_all(
    source: &dyn ReportStore,
    target: &dyn ReportStore,
    scorer: &dyn Scorer,
    digester: &dyn Digester,
) -> anyhow::Result<RescoreSummary> {
    target
        .ensure_root()
        .await
        .context("failed to create the rescored directory")?;
    let ids = source
        .list_report_ids()
        .await
        .context("failed to list reports")?;
    tracing::info!(count = ids.len(), "Rescoring reports");

    let mut summary = RescoreSummary::default();
    for id in ids {
        match rescore_one(&id, source, target, scorer, digester).await {
            Ok(()) => {
                tracing::debug!(%id, "Report rescored");
                summary.rescored += 1;
            }
            Err(e) => {
                tracing::error!(%id, error = ?e, "Rescoring failed");
                summary.failed.push(id);
            }
        }
    }
    Ok(summary)
}

async fn rescore_one(
    id: &str,
    source: &dyn ReportStore,
    target: &dyn ReportStore,
    scorer: &dyn Scorer,
    digester: &dyn Digester,
) -> anyhow::Result<()> {
    let mut report = source
        .load_report(id)
        .await?
        .with_context(|| format!("report {id} disappeared"))?;
    scorer.score(&mut report)?;
    target.save_report(&report).await?;
    let digest = digester.digest(&report).await?;
    target.save_digest(id, &digest).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
