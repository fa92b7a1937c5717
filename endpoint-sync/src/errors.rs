use crate::config::ValidationError;
use directory::{ClientBuildError, DirectoryError};
use thiserror::Error;

/// Failure of a single record. Always converted into an error outcome, never
/// propagated out of a batch.
#[derive(Error, Debug, PartialEq)]
pub enum RecordError {
    #[error("failed to parse message body: {0}")]
    Parse(String),

    #[error("invalid message: {0}")]
    Validation(String),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("batch deadline exceeded before the record was processed")]
    DeadlineExceeded,

    #[error("record processing task failed")]
    TaskFailed,
}

impl RecordError {
    pub const fn kind(&self) -> &'static str {
        match self {
            RecordError::Parse(_) => "parse",
            RecordError::Validation(_) => "validation",
            RecordError::Directory(e) => e.kind(),
            RecordError::DeadlineExceeded => "deadline_exceeded",
            RecordError::TaskFailed => "task_failed",
        }
    }
}

/// Failure that aborts a whole batch before any record is processed. No report
/// exists when this is returned; the transport should retry the batch.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("could not resolve application {name}: {source}")]
    ApplicationResolution {
        name: String,
        #[source]
        source: DirectoryError,
    },
}

/// Errors that stop the endpoint-sync service itself.
#[derive(Error, Debug)]
pub enum EndpointSyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ValidationError),

    #[error("could not build directory client: {0}")]
    DirectoryClient(#[from] ClientBuildError),
}
