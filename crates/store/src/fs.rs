use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use testu_core::report::Report;

use crate::{ReportStore, StoreError};

/// Maximum accepted length of a report id used as a file stem.
const MAX_ID_LEN: usize = 128;

/// Directory-backed [`ReportStore`].
#[derive(Debug, Clone)]
pub struct FsReportStore {
    root: PathBuf,
}

impl FsReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str, extension: &str) -> Result<PathBuf, StoreError> {
        validate_id(id)?;
        Ok(self.root.join(format!("{id}.{extension}")))
    }
}

/// Only ASCII alphanumerics, `-` and `_` may appear in an id.
fn validate_id(id: &str) -> Result<(), StoreError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

/// Read a file, mapping "not found" to `None`.
async fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl ReportStore for FsReportStore {
    async fn ensure_root(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn save_report(&self, report: &Report) -> Result<(), StoreError> {
        let path = self.path_for(&report.id(), "json")?;
        let mut json = serde_json::to_string_pretty(report)?;
        json.push('\n');
        tokio::fs::write(&path, json).await?;
        tracing::debug!(path = %path.display(), "Report saved");
        Ok(())
    }

    async fn load_report(&self, id: &str) -> Result<Option<Report>, StoreError> {
        let path = self.path_for(id, "json")?;
        let Some(json) = read_optional(&path).await? else {
            return Ok(None);
        };
        let value: serde_json::Value = serde_json::from_str(&json)?;
        Ok(Some(Report::from_value(value)?))
    }

    async fn save_digest(&self, id: &str, digest: &str) -> Result<(), StoreError> {
        let path = self.path_for(id, "html")?;
        tokio::fs::write(&path, digest).await?;
        tracing::debug!(path = %path.display(), "Digest saved");
        Ok(())
    }

    async fn load_digest(&self, id: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(id, "html")?;
        read_optional(&path).await
    }

    async fn list_report_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if validate_id(id).is_ok() {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
