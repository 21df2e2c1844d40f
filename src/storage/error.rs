use tantivy::TantivyError;
use tantivy::directory::error::OpenDirectoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] TantivyError),

    #[error("Invalid argument for {argument}: {reason}")]
    InvalidArgument { argument: String, reason: String },

    #[error("Invalid field value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory error: {0}")]
    Directory(#[from] OpenDirectoryError),
}

impl StorageError {
    /// Reject blank path arguments instead of treating them as "not found".
    pub(crate) fn blank_path(argument: &str) -> Self {
        StorageError::InvalidArgument {
            argument: argument.to_string(),
            reason: "path must not be empty or whitespace".to_string(),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
