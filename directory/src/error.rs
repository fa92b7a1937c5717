/// Errors returned by directory operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The named application, or the application an endpoint was written to, does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The directory could not be reached or failed transiently (network, auth, throttling).
    #[error("directory unavailable: {0}")]
    RemoteUnavailable(String),

    /// The directory refused the write as invalid, e.g. a malformed address.
    #[error("directory rejected request: {0}")]
    RemoteRejected(String),
}

impl DirectoryError {
    pub const fn kind(&self) -> &'static str {
        match self {
            DirectoryError::NotFound(_) => "not_found",
            DirectoryError::RemoteUnavailable(_) => "remote_unavailable",
            DirectoryError::RemoteRejected(_) => "remote_rejected",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ClientBuildError {
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("invalid directory URL: {0}")]
    InvalidUrl(String),
}
