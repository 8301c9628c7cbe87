//! Package artifact download and extraction.
//!
//! Fetches the published archive for one (package, version), verifies the
//! registry-advertised sha256 digest when one exists, and unpacks it into a
//! temporary directory for sourcecode analysis.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use super::RegistryError;
use crate::ecosystem::Ecosystem;

/// An extracted package source tree. The backing temp directory (when one
/// exists) is removed when this is dropped.
pub struct FetchedSource {
    _dir: Option<TempDir>,
    root: PathBuf,
}

impl FetchedSource {
    /// Wrap an existing directory that is not managed by the fetcher.
    /// Used by custom [`super::SourceFetcher`] implementations.
    pub fn pinned(root: PathBuf) -> Self {
        Self { _dir: None, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

pub struct ArtifactFetcher {
    client: reqwest::blocking::Client,
}

impl ArtifactFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("pkgshield/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .expect("HTTP client construction cannot fail with static options");
        Self { client }
    }

    /// Download and unpack the artifact described by a version's registry
    /// metadata.
    pub fn fetch(
        &self,
        ecosystem: Ecosystem,
        name: &str,
        version: &str,
        metadata: &Value,
    ) -> Result<FetchedSource, RegistryError> {
        let (url, expected_sha256) = artifact_location(ecosystem, metadata).ok_or_else(|| {
            RegistryError::Decode {
                package: name.to_string(),
                message: format!("no downloadable artifact listed for version {version}"),
            }
        })?;

        let dir = TempDir::new().map_err(|e| artifact_err(name, version, &e.to_string()))?;
        let archive_name = url.rsplit('/').next().unwrap_or("artifact");
        let archive_path = dir.path().join(archive_name);

        let digest = self.download(&url, name, &archive_path)?;
        match expected_sha256 {
            Some(expected) if !expected.eq_ignore_ascii_case(&digest) => {
                return Err(artifact_err(
                    name,
                    version,
                    &format!("sha256 mismatch: expected {expected}, got {digest}"),
                ));
            }
            Some(_) => tracing::debug!(package = name, version, "sha256 digest verified"),
            None => tracing::debug!(package = name, version, sha256 = %digest, "no digest published"),
        }

        let extract_root = dir.path().join("src");
        extract(&archive_path, &extract_root)
            .map_err(|e| artifact_err(name, version, &e.to_string()))?;
        let root = collapse_single_dir(&extract_root);

        Ok(FetchedSource {
            _dir: Some(dir),
            root,
        })
    }

    fn download(&self, url: &str, name: &str, dest: &Path) -> Result<String, RegistryError> {
        tracing::debug!(%url, "downloading artifact");
        let mut response =
            self.client
                .get(url)
                .send()
                .and_then(|r| r.error_for_status())
                .map_err(|e| RegistryError::Http {
                    package: name.to_string(),
                    message: e.to_string(),
                })?;

        let mut file = File::create(dest).map_err(|e| RegistryError::Http {
            package: name.to_string(),
            message: e.to_string(),
        })?;

        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = response.read(&mut buf).map_err(|e| RegistryError::Http {
                package: name.to_string(),
                message: e.to_string(),
            })?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n]).map_err(|e| RegistryError::Http {
                package: name.to_string(),
                message: e.to_string(),
            })?;
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

fn artifact_err(name: &str, version: &str, message: &str) -> RegistryError {
    RegistryError::Artifact {
        package: name.to_string(),
        version: version.to_string(),
        message: message.to_string(),
    }
}

/// Pick the downloadable archive out of a version's metadata.
///
/// PyPI lists one entry per uploaded file under `urls`, each with a sha256
/// digest; the sdist is preferred over wheels. npm exposes a single tarball
/// under `dist.tarball` (its `shasum` is sha1, so no sha256 to verify).
fn artifact_location(ecosystem: Ecosystem, metadata: &Value) -> Option<(String, Option<String>)> {
    match ecosystem {
        Ecosystem::PyPi => {
            let files = metadata.get("urls")?.as_array()?;
            let chosen = files
                .iter()
                .find(|f| f.get("packagetype").and_then(Value::as_str) == Some("sdist"))
                .or_else(|| files.first())?;
            let url = chosen.get("url")?.as_str()?.to_string();
            let sha256 = chosen
                .pointer("/digests/sha256")
                .and_then(Value::as_str)
                .map(str::to_string);
            Some((url, sha256))
        }
        Ecosystem::Npm => {
            let url = metadata.pointer("/dist/tarball")?.as_str()?.to_string();
            Some((url, None))
        }
    }
}

fn extract(archive: &Path, out_dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(out_dir)?;
    let file_name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if file_name.ends_with(".tar.gz") || file_name.ends_with(".tgz") {
        extract_tar_gz(archive, out_dir)
    } else if file_name.ends_with(".zip") || file_name.ends_with(".whl") {
        extract_zip(archive, out_dir)
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unsupported archive format: {file_name}"),
        ))
    }
}

fn extract_tar_gz(archive: &Path, out_dir: &Path) -> std::io::Result<()> {
    let file = File::open(archive)?;
    let gz = GzDecoder::new(file);
    let mut ar = tar::Archive::new(gz);
    for entry in ar.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.to_path_buf();
        let rel = sanitize_rel_path(&entry_path)?;
        let out_path = out_dir.join(rel);
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry.unpack(&out_path)?;
    }
    Ok(())
}

fn extract_zip(archive: &Path, out_dir: &Path) -> std::io::Result<()> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        let Some(enclosed) = entry.enclosed_name() else {
            continue;
        };
        let out_path = out_dir.join(enclosed);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

/// Reject absolute paths and parent-directory traversal in archive entries.
fn sanitize_rel_path(path: &Path) -> std::io::Result<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("unsafe archive entry path: {}", path.display()),
                ));
            }
        }
    }
    Ok(clean)
}

/// Archives usually wrap everything in a single `<name>-<version>/` directory;
/// scanning starts below it when that is the case.
fn collapse_single_dir(root: &Path) -> PathBuf {
    let entries: Vec<_> = match std::fs::read_dir(root) {
        Ok(rd) => rd.filter_map(|e| e.ok()).collect(),
        Err(_) => return root.to_path_buf(),
    };
    if entries.len() == 1 && entries[0].path().is_dir() {
        return entries[0].path();
    }
    root.to_path_buf()
}
