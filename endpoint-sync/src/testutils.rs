use async_trait::async_trait;
use directory::types::{Application, EndpointRequest};
use directory::{DirectoryClient, DirectoryError, DirectoryService};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub struct Upsert {
    pub application_id: String,
    pub endpoint_id: String,
    pub request: EndpointRequest,
}

/// Directory double recording every call. Failures and delays are keyed by endpoint id.
pub struct FakeDirectory {
    applications: Result<Vec<Application>, DirectoryError>,
    failures: HashMap<String, DirectoryError>,
    delays: HashMap<String, Duration>,
    panics: Vec<String>,
    list_calls: Mutex<usize>,
    upserts: Mutex<Vec<Upsert>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Decrements the in-flight count when an upsert finishes, panics or is aborted.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeDirectory {
    pub fn with_application(name: &str, id: &str) -> Self {
        Self::with_applications(Ok(vec![Application::new(id, name)]))
    }

    pub fn with_applications(applications: Result<Vec<Application>, DirectoryError>) -> Self {
        FakeDirectory {
            applications,
            failures: HashMap::new(),
            delays: HashMap::new(),
            panics: Vec::new(),
            list_calls: Mutex::new(0),
            upserts: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self, endpoint_id: &str, error: DirectoryError) -> Self {
        self.failures.insert(endpoint_id.into(), error);
        self
    }

    pub fn delayed(mut self, endpoint_id: &str, delay: Duration) -> Self {
        self.delays.insert(endpoint_id.into(), delay);
        self
    }

    pub fn panicking(mut self, endpoint_id: &str) -> Self {
        self.panics.push(endpoint_id.into());
        self
    }

    pub fn into_client(self) -> (Arc<Self>, DirectoryClient) {
        let fake = Arc::new(self);
        let client = DirectoryClient::new(fake.clone());
        (fake, client)
    }

    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock()
    }

    pub fn upserts(&self) -> Vec<Upsert> {
        self.upserts.lock().clone()
    }

    /// Highest number of upserts that were running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn upserted_endpoint_ids(&self) -> Vec<String> {
        self.upserts().into_iter().map(|u| u.endpoint_id).collect()
    }
}

#[async_trait]
impl DirectoryService for FakeDirectory {
    async fn list_applications(&self) -> Result<Vec<Application>, DirectoryError> {
        *self.list_calls.lock() += 1;
        self.applications.clone()
    }

    async fn upsert_endpoint(
        &self,
        application_id: &str,
        endpoint_id: &str,
        request: &EndpointRequest,
    ) -> Result<(), DirectoryError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        if let Some(delay) = self.delays.get(endpoint_id) {
            tokio::time::sleep(*delay).await;
        }

        if self.panics.iter().any(|id| id == endpoint_id) {
            panic!("directory double panicked for {endpoint_id}");
        }

        self.upserts.lock().push(Upsert {
            application_id: application_id.into(),
            endpoint_id: endpoint_id.into(),
            request: request.clone(),
        });

        match self.failures.get(endpoint_id) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
