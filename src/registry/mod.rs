//! Package registry access.
//!
//! The resolver and scanners depend only on the [`RegistryClient`] trait;
//! `pypi` and `npm` provide the concrete HTTP clients. Version lists are
//! always returned in descending version order.

pub mod artifact;
pub mod npm;
pub mod pypi;

use serde_json::Value;
use thiserror::Error;

use crate::ecosystem::Ecosystem;

pub use artifact::{ArtifactFetcher, FetchedSource};
pub use npm::NpmClient;
pub use pypi::PypiClient;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Package {0} not found on the registry")]
    NotFound(String),

    #[error("Registry request for {package} failed: {message}")]
    Http { package: String, message: String },

    #[error("Unexpected registry response for {package}: {message}")]
    Decode { package: String, message: String },

    #[error("Artifact for {package} {version} failed verification: {message}")]
    Artifact {
        package: String,
        version: String,
        message: String,
    },
}

/// Read-only view of a package index.
pub trait RegistryClient: Send + Sync {
    /// All published versions of a package, newest first.
    fn versions(&self, name: &str) -> Result<Vec<String>, RegistryError>;

    /// Registry metadata for one published version. The schema is
    /// ecosystem-specific; detectors consume it as raw JSON.
    fn metadata(&self, name: &str, version: &str) -> Result<Value, RegistryError>;
}

/// Obtains one package version's source tree for analysis.
pub trait SourceFetcher: Send + Sync {
    fn fetch(
        &self,
        ecosystem: Ecosystem,
        name: &str,
        version: &str,
        metadata: &Value,
    ) -> Result<FetchedSource, RegistryError>;
}

impl SourceFetcher for ArtifactFetcher {
    fn fetch(
        &self,
        ecosystem: Ecosystem,
        name: &str,
        version: &str,
        metadata: &Value,
    ) -> Result<FetchedSource, RegistryError> {
        ArtifactFetcher::fetch(self, ecosystem, name, version, metadata)
    }
}

pub(crate) fn sort_versions_descending(mut versions: Vec<String>) -> Vec<String> {
    versions.sort_by(|a, b| crate::resolver::version::cmp(b, a));
    versions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descending_sort_uses_version_ordering() {
        let sorted = sort_versions_descending(vec![
            "1.9".into(),
            "1.10".into(),
            "0.4".into(),
            "2.0".into(),
        ]);
        assert_eq!(sorted, vec!["2.0", "1.10", "1.9", "0.4"]);
    }
}
