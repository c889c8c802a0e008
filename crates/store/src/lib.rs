//! Persistence for scored reports and rendered digests.
//!
//! [`ReportStore`] is the seam the dispatcher writes through;
//! [`FsReportStore`] keeps one `<id>.json` and one `<id>.html` file per
//! report in a single directory.

pub mod error;
pub mod fs;

use async_trait::async_trait;
use testu_core::report::Report;

pub use error::StoreError;
pub use fs::FsReportStore;

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Create the backing location if it does not exist yet.
    async fn ensure_root(&self) -> Result<(), StoreError>;

    async fn save_report(&self, report: &Report) -> Result<(), StoreError>;

    async fn load_report(&self, id: &str) -> Result<Option<Report>, StoreError>;

    async fn save_digest(&self, id: &str, digest: &str) -> Result<(), StoreError>;

    async fn load_digest(&self, id: &str) -> Result<Option<String>, StoreError>;

    /// Ids of every saved report, sorted ascending.
    async fn list_report_ids(&self) -> Result<Vec<String>, StoreError>;
}
