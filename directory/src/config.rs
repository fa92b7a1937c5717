use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

fn default_request_timeout_secs() -> u64 {
    10
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct HttpDirectoryConfig {
    pub url: Url,
    /// Sent as a bearer token on every request when set.
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum DirectoryConfig {
    Http(HttpDirectoryConfig),
    /// Process-local directory. `applications` maps application names to ids.
    InMemory {
        #[serde(default)]
        applications: HashMap<String, String>,
    },
}
