use crate::error::DirectoryError;
use crate::types::{Application, EndpointRequest};
use async_trait::async_trait;

/// Remote capability exposed by an audience directory.
///
/// Implementations hold no per-call session state, so a single instance can be
/// shared across concurrently processed records.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Lists every registered application.
    async fn list_applications(&self) -> Result<Vec<Application>, DirectoryError>;

    /// Creates or fully replaces the endpoint `endpoint_id` under `application_id`.
    /// Idempotent on the `(application_id, endpoint_id)` pair.
    async fn upsert_endpoint(
        &self,
        application_id: &str,
        endpoint_id: &str,
        request: &EndpointRequest,
    ) -> Result<(), DirectoryError>;
}
