//! pkgshield — malicious package scanner for PyPI and npm.
//!
//! Combines registry-metadata heuristics with static pattern matches over
//! package source. Scans a single published package, a local source tree,
//! or every dependency resolved from a requirements-style manifest.
//!
//! # Quick Start
//!
//! ```no_run
//! use pkgshield::{scan_package, Ecosystem, ScanOptions};
//!
//! let options = ScanOptions::default();
//! let (identifier, report) =
//!     scan_package(Ecosystem::PyPi, "requests", None, &options).unwrap();
//! println!("{identifier}: {} indicator(s)", report.issues);
//! ```

pub mod analyzer;
pub mod config;
pub mod ecosystem;
pub mod engine;
pub mod error;
pub mod output;
pub mod registry;
pub mod resolver;
pub mod rules;
pub mod scanner;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use analyzer::{Analyzer, PackageReport};
use config::Config;
use engine::RegexEngine;
use registry::{ArtifactFetcher, NpmClient, PypiClient, RegistryClient, SourceFetcher};
use rules::RuleSelection;
use scanner::{PackageScanner, ProjectScanner, VerifyOutcome};

pub use ecosystem::Ecosystem;
pub use error::{Result, ShieldError};

/// Options for a scan invocation.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Path to config file (defaults to `.pkgshield.toml` in the working
    /// directory).
    pub config_path: Option<PathBuf>,
    /// Rules to run; empty means the full catalog.
    pub rules: BTreeSet<String>,
    /// Rules to skip; mutually exclusive with `rules`.
    pub exclude_rules: BTreeSet<String>,
}

/// The available rule names for an ecosystem: `(sourcecode, metadata)`.
pub fn list_rules(ecosystem: Ecosystem) -> (BTreeSet<String>, BTreeSet<String>) {
    (
        rules::sourcecode::rule_names(ecosystem),
        rules::metadata::rule_names(ecosystem),
    )
}

/// Scan one package: a published (package, version) when `target` names a
/// registry package, or a local source tree when it names a directory.
pub fn scan_package(
    ecosystem: Ecosystem,
    target: &str,
    version: Option<&str>,
    options: &ScanOptions,
) -> Result<(String, PackageReport)> {
    let (scanner, selection) = build_scanner(ecosystem, options)?;
    let package_scanner = scanner.package_scanner();

    if Path::new(target).exists() {
        let report = package_scanner.scan_local(Path::new(target), &selection)?;
        Ok((target.to_string(), report))
    } else {
        let (version, report) = package_scanner.scan_remote(target, version, &selection)?;
        Ok((format!("{target}/{version}"), report))
    }
}

/// Scan every dependency resolved from a manifest file.
pub fn verify_manifest(
    ecosystem: Ecosystem,
    manifest: &Path,
    options: &ScanOptions,
) -> Result<VerifyOutcome> {
    let (scanner, selection) = build_scanner(ecosystem, options)?;
    scanner.verify_manifest(manifest, &selection, None)
}

fn build_scanner(
    ecosystem: Ecosystem,
    options: &ScanOptions,
) -> Result<(ProjectScanner, RuleSelection)> {
    let config_path = options
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(".pkgshield.toml"));
    let config = Config::load(&config_path)?;

    let registry: Box<dyn RegistryClient> = match ecosystem {
        Ecosystem::PyPi => Box::new(PypiClient::new(config.timeout())),
        Ecosystem::Npm => Box::new(NpmClient::new(config.timeout())),
    };
    let fetcher: Box<dyn SourceFetcher> = Box::new(ArtifactFetcher::new(config.timeout()));

    let analyzer = match &config.scan.rules_dir {
        Some(dir) => Analyzer::with_ruleset_dir(ecosystem, Box::new(RegexEngine), dir.clone())?,
        None => Analyzer::new(ecosystem, Box::new(RegexEngine))?,
    };

    // Selection conflicts and unknown rule names abort here, before any
    // registry traffic or scanning.
    let selection = analyzer
        .catalog()
        .resolve_selection(&options.rules, &options.exclude_rules)?;

    let package_scanner = PackageScanner::new(ecosystem, registry, fetcher, analyzer);
    let scanner = ProjectScanner::new(package_scanner, config.mode(), config.worker_count());
    Ok((scanner, selection))
}
