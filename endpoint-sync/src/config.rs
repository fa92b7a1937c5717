use directory::config::{DirectoryConfig, HttpDirectoryConfig};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("max_concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("max_body_bytes must be greater than 0")]
    InvalidBodyLimit,

    #[error("Empty application name")]
    EmptyApplicationName,

    #[error("batch_timeout_secs must be greater than 0")]
    InvalidBatchTimeout,

    #[error("directory request_timeout_secs must be greater than 0")]
    InvalidRequestTimeout,
}

fn default_application_name() -> String {
    "fdr".into()
}

fn default_max_concurrency() -> usize {
    8
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_admin_listener() -> Listener {
    Listener {
        host: "127.0.0.1".into(),
        port: 3001,
    }
}

/// Endpoint sync configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener accepting batches
    #[serde(default)]
    pub listener: Listener,
    /// Listener for health and readiness probes
    #[serde(default = "default_admin_listener")]
    pub admin_listener: Listener,
    /// Directory application every endpoint in a batch is written to
    #[serde(default = "default_application_name")]
    pub application_name: String,
    /// Upper bound on directory writes in flight for one batch
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Records still pending when this elapses are reported as failed
    #[serde(default)]
    pub batch_timeout_secs: Option<u64>,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    pub directory: DirectoryConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.max_concurrency == 0 {
            return Err(ValidationError::InvalidConcurrency);
        }

        if self.max_body_bytes == 0 {
            return Err(ValidationError::InvalidBodyLimit);
        }

        if self.application_name.trim().is_empty() {
            return Err(ValidationError::EmptyApplicationName);
        }

        if self.batch_timeout_secs == Some(0) {
            return Err(ValidationError::InvalidBatchTimeout);
        }

        if let DirectoryConfig::Http(HttpDirectoryConfig {
            request_timeout_secs: 0,
            ..
        }) = self.directory
        {
            return Err(ValidationError::InvalidRequestTimeout);
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}
