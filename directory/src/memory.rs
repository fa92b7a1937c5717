use crate::error::DirectoryError;
use crate::service::DirectoryService;
use crate::types::{Application, EndpointRequest};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Process-local directory. Applications are fixed at construction; endpoint
/// records live for the lifetime of the process.
pub struct InMemoryDirectory {
    applications: Vec<Application>,
    endpoints: RwLock<HashMap<(String, String), EndpointRequest>>,
}

impl InMemoryDirectory {
    /// `applications` maps application names to ids.
    pub fn new(applications: HashMap<String, String>) -> Self {
        let mut applications: Vec<Application> = applications
            .into_iter()
            .map(|(name, id)| Application::new(id, name))
            .collect();
        applications.sort_by(|a, b| a.name.cmp(&b.name));

        InMemoryDirectory {
            applications,
            endpoints: RwLock::new(HashMap::new()),
        }
    }

    pub fn endpoint(&self, application_id: &str, endpoint_id: &str) -> Option<EndpointRequest> {
        self.endpoints
            .read()
            .get(&(application_id.to_string(), endpoint_id.to_string()))
            .cloned()
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.read().len()
    }
}

#[async_trait]
impl DirectoryService for InMemoryDirectory {
    async fn list_applications(&self) -> Result<Vec<Application>, DirectoryError> {
        Ok(self.applications.clone())
    }

    async fn upsert_endpoint(
        &self,
        application_id: &str,
        endpoint_id: &str,
        request: &EndpointRequest,
    ) -> Result<(), DirectoryError> {
        if !self.applications.iter().any(|app| app.id == application_id) {
            return Err(DirectoryError::NotFound(format!(
                "application {application_id} not found"
            )));
        }

        if !request.address.contains('@') {
            return Err(DirectoryError::RemoteRejected(format!(
                "invalid email address: {}",
                request.address
            )));
        }

        let previous = self.endpoints.write().insert(
            (application_id.to_string(), endpoint_id.to_string()),
            request.clone(),
        );

        match previous {
            Some(_) => tracing::debug!(endpoint_id, "Endpoint updated"),
            None => tracing::debug!(endpoint_id, "Endpoint created"),
        }

        Ok(())
    }
}
