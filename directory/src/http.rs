use crate::config::HttpDirectoryConfig;
use crate::error::{ClientBuildError, DirectoryError};
use crate::service::DirectoryService;
use crate::types::{Application, EndpointRequest};
use async_trait::async_trait;
use http::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

// Guards against a directory that keeps handing back continuation tokens.
const MAX_PAGES: usize = 1000;

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApplicationsPage {
    #[serde(default)]
    item: Vec<Application>,
    next_token: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "Message", alias = "message")]
    message: Option<String>,
}

/// Directory backend speaking the REST binding:
/// `GET /v1/apps` and `PUT /v1/apps/{application}/endpoints/{endpoint}`.
pub struct HttpDirectory {
    client: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpDirectory {
    pub fn new(config: &HttpDirectoryConfig) -> Result<Self, ClientBuildError> {
        if config.url.cannot_be_a_base() {
            return Err(ClientBuildError::InvalidUrl(config.url.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(HttpDirectory {
            client,
            base_url: config.url.clone(),
            auth_token: config.auth_token.clone(),
        })
    }

    // Each segment is percent-encoded, so endpoint keys may contain '/' or '?'.
    fn url_for(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

fn unavailable(e: reqwest::Error) -> DirectoryError {
    DirectoryError::RemoteUnavailable(e.to_string())
}

fn classify_write_failure(status: StatusCode, message: String) -> DirectoryError {
    match status {
        StatusCode::NOT_FOUND => DirectoryError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => DirectoryError::RemoteUnavailable(message),
        s if s.is_client_error() => DirectoryError::RemoteRejected(message),
        _ => DirectoryError::RemoteUnavailable(message),
    }
}

#[async_trait]
impl DirectoryService for HttpDirectory {
    async fn list_applications(&self) -> Result<Vec<Application>, DirectoryError> {
        let mut applications = Vec::new();
        let mut next_token: Option<String> = None;
        let mut page_fetches = 0;

        loop {
            if page_fetches == MAX_PAGES {
                return Err(DirectoryError::RemoteUnavailable(format!(
                    "application listing exceeded {MAX_PAGES} pages"
                )));
            }

            let mut url = self.url_for(&["v1", "apps"]);
            if let Some(ref token) = next_token {
                url.query_pairs_mut().append_pair("token", token);
            }

            let response = self
                .authorized(self.client.get(url))
                .send()
                .await
                .map_err(unavailable)?;

            let status = response.status();
            if !status.is_success() {
                return Err(DirectoryError::RemoteUnavailable(format!(
                    "listing applications returned {status}"
                )));
            }

            let page = response.json::<ApplicationsPage>().await.map_err(|e| {
                DirectoryError::RemoteUnavailable(format!(
                    "could not decode applications response: {e}"
                ))
            })?;

            applications.extend(page.item);
            page_fetches += 1;

            match page.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(
            page_fetches,
            applications = applications.len(),
            "Listed applications from directory"
        );

        Ok(applications)
    }

    async fn upsert_endpoint(
        &self,
        application_id: &str,
        endpoint_id: &str,
        request: &EndpointRequest,
    ) -> Result<(), DirectoryError> {
        let url = self.url_for(&["v1", "apps", application_id, "endpoints", endpoint_id]);

        let response = self
            .authorized(self.client.put(url).json(request))
            .send()
            .await
            .map_err(unavailable)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.message)
            .unwrap_or_else(|| format!("upsert of endpoint {endpoint_id} returned {status}"));

        Err(classify_write_failure(status, message))
    }
}
