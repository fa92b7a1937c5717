use crate::config::DirectoryConfig;
use crate::error::{ClientBuildError, DirectoryError};
use crate::http::HttpDirectory;
use crate::memory::InMemoryDirectory;
use crate::metrics_defs::{LIST_APPLICATIONS_DURATION, UPSERT_DURATION};
use crate::service::DirectoryService;
use crate::types::{ApplicationId, DeliveryEvent, EndpointRequest};
use shared::histogram;
use std::sync::Arc;
use std::time::Instant;

/// Resolves application names and writes endpoint records through a
/// [`DirectoryService`] backend. Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct DirectoryClient {
    service: Arc<dyn DirectoryService>,
}

impl DirectoryClient {
    pub fn new(service: Arc<dyn DirectoryService>) -> Self {
        DirectoryClient { service }
    }

    pub fn from_config(config: &DirectoryConfig) -> Result<Self, ClientBuildError> {
        let service: Arc<dyn DirectoryService> = match config {
            DirectoryConfig::Http(http_config) => Arc::new(HttpDirectory::new(http_config)?),
            DirectoryConfig::InMemory { applications } => {
                Arc::new(InMemoryDirectory::new(applications.clone()))
            }
        };

        Ok(DirectoryClient::new(service))
    }

    /// Returns the id of the application registered under exactly `name`.
    pub async fn resolve_application_id(&self, name: &str) -> Result<ApplicationId, DirectoryError> {
        let started = Instant::now();
        let applications = self.service.list_applications().await;
        histogram!(LIST_APPLICATIONS_DURATION).record(started.elapsed().as_secs_f64());
        let applications = applications?;

        if applications.is_empty() {
            return Err(DirectoryError::NotFound(
                "no applications registered in directory".to_string(),
            ));
        }

        applications
            .into_iter()
            .find(|app| app.name == name)
            .map(|app| app.id)
            .ok_or_else(|| DirectoryError::NotFound(format!("application with name {name} not found")))
    }

    /// Writes the endpoint for `event` in a single unconditional upsert. A `deleted`
    /// event opts the endpoint out of all channels, any other type opts it back in.
    pub async fn upsert_endpoint(
        &self,
        application_id: &str,
        endpoint_key: &str,
        event: &DeliveryEvent,
    ) -> Result<(), DirectoryError> {
        let request = EndpointRequest::from(event);

        let started = Instant::now();
        let result = self
            .service
            .upsert_endpoint(application_id, endpoint_key, &request)
            .await;
        let outcome = match &result {
            Ok(()) => "success",
            Err(e) => e.kind(),
        };
        histogram!(UPSERT_DURATION, "result" => outcome).record(started.elapsed().as_secs_f64());

        match &result {
            Ok(()) => tracing::debug!(
                endpoint_key,
                event_type = %event.event_type,
                "Endpoint upserted"
            ),
            Err(e) => tracing::warn!(endpoint_key, error = %e, "Endpoint upsert failed"),
        }

        result
    }
}
