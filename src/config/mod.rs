use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::resolver::ResolutionMode;

/// Top-level configuration from `.pkgshield.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Scan every version satisfying a constraint instead of only the
    /// newest one.
    #[serde(default)]
    pub exhaustive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Concurrent package scans during a manifest verify. 0 means one per
    /// CPU core.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Timeout for each registry HTTP request.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Directory of rule definition files replacing the built-in set.
    #[serde(default)]
    pub rules_dir: Option<PathBuf>,
}

fn default_workers() -> usize {
    4
}

fn default_timeout_seconds() -> u64 {
    30
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout_seconds: default_timeout_seconds(),
            rules_dir: None,
        }
    }
}

impl Config {
    /// Load config from a TOML file. Returns default if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn mode(&self) -> ResolutionMode {
        if self.resolution.exhaustive {
            ResolutionMode::Exhaustive
        } else {
            ResolutionMode::BestMatch
        }
    }

    pub fn worker_count(&self) -> usize {
        if self.scan.workers == 0 {
            num_cpus::get()
        } else {
            self.scan.workers
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.scan.timeout_seconds)
    }

    /// Generate a starter config file.
    pub fn starter_toml() -> &'static str {
        r#"# pkgshield configuration
# See https://github.com/limaronaldo/pkgshield for documentation.

[resolution]
# Scan every version satisfying a constraint, not just the newest match.
exhaustive = false

[scan]
# Concurrent package scans during a manifest verify (0 = one per CPU core).
workers = 4

# Registry HTTP timeout in seconds.
timeout_seconds = 30

# Replace the built-in sourcecode rules with a directory of .toml files.
# rules_dir = "./my-rules"
"#
    }
}
