//! PyPI JSON API client (`https://pypi.org/pypi/<package>/json`).

use std::time::Duration;

use serde_json::Value;
use url::Url;

use super::{sort_versions_descending, RegistryClient, RegistryError};

pub const DEFAULT_BASE_URL: &str = "https://pypi.org/pypi";

pub struct PypiClient {
    base_url: Url,
    client: reqwest::blocking::Client,
}

impl PypiClient {
    pub fn new(timeout: Duration) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
            .expect("default PyPI base URL is well-formed")
    }

    /// Point the client at a different index (mirrors, test servers).
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, RegistryError> {
        let base_url = Url::parse(base_url).map_err(|e| RegistryError::Http {
            package: String::new(),
            message: format!("invalid base URL {base_url}: {e}"),
        })?;
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("pkgshield/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Http {
                package: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { base_url, client })
    }

    fn get_json(&self, name: &str, path: &str) -> Result<Value, RegistryError> {
        let url = format!("{}/{}", self.base_url, path);
        tracing::debug!(%url, "fetching PyPI metadata");

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| RegistryError::Http {
                package: name.to_string(),
                message: e.to_string(),
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        if !response.status().is_success() {
            return Err(RegistryError::Http {
                package: name.to_string(),
                message: format!("HTTP {}", response.status()),
            });
        }

        response.json().map_err(|e| RegistryError::Decode {
            package: name.to_string(),
            message: e.to_string(),
        })
    }
}

impl RegistryClient for PypiClient {
    fn versions(&self, name: &str) -> Result<Vec<String>, RegistryError> {
        let body = self.get_json(name, &format!("{name}/json"))?;
        let releases = body
            .get("releases")
            .and_then(Value::as_object)
            .ok_or_else(|| RegistryError::Decode {
                package: name.to_string(),
                message: "missing releases object".into(),
            })?;
        Ok(sort_versions_descending(
            releases.keys().cloned().collect(),
        ))
    }

    fn metadata(&self, name: &str, version: &str) -> Result<Value, RegistryError> {
        self.get_json(name, &format!("{name}/{version}/json"))
    }
}
