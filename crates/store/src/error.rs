use testu_core::error::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The id would escape the store directory or is otherwise unusable as a
    /// file name.
    #[error("Invalid report id: {0:?}")]
    InvalidId(String),

    /// A stored file did not contain a valid report.
    #[error(transparent)]
    Corrupt(#[from] CoreError),
}
