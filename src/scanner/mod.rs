//! Scan drivers.
//!
//! [`PackageScanner`] owns the lifetime of one (package, version) scan:
//! metadata fetch, artifact fetch, rule dispatch. [`ProjectScanner`] drives
//! a manifest scan: constraints are resolved into a worklist and the items
//! run on a bounded worker pool, since each one is independent and the
//! registry rate-limits aggressive clients. Per-item failures become
//! diagnostics; a single writer merges completed reports afterwards, so the
//! project report holds exactly one entry per resolved pair regardless of
//! completion order.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::analyzer::{Analyzer, PackageReport, ProjectReport};
use crate::ecosystem::Ecosystem;
use crate::error::{Result, ShieldError};
use crate::registry::{RegistryClient, RegistryError, SourceFetcher};
use crate::resolver::{Diagnostic, ResolutionMode, Resolver};
use crate::rules::RuleSelection;

pub struct PackageScanner {
    ecosystem: Ecosystem,
    registry: Box<dyn RegistryClient>,
    fetcher: Box<dyn SourceFetcher>,
    analyzer: Analyzer,
}

impl PackageScanner {
    pub fn new(
        ecosystem: Ecosystem,
        registry: Box<dyn RegistryClient>,
        fetcher: Box<dyn SourceFetcher>,
        analyzer: Analyzer,
    ) -> Self {
        Self {
            ecosystem,
            registry,
            fetcher,
            analyzer,
        }
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn registry(&self) -> &dyn RegistryClient {
        self.registry.as_ref()
    }

    /// Scan a published package. Without an explicit version, the newest
    /// published version is scanned.
    pub fn scan_remote(
        &self,
        name: &str,
        version: Option<&str>,
        selection: &RuleSelection,
    ) -> Result<(String, PackageReport)> {
        let version = match version {
            Some(v) => v.to_string(),
            None => self
                .registry
                .versions(name)?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    ShieldError::Registry(RegistryError::NotFound(name.to_string()))
                })?,
        };
        let report = self.scan_version(name, &version, selection)?;
        Ok((version, report))
    }

    /// Scan one specific (package, version) pair.
    pub fn scan_version(
        &self,
        name: &str,
        version: &str,
        selection: &RuleSelection,
    ) -> Result<PackageReport> {
        let metadata = self.registry.metadata(name, version)?;
        let source = self
            .fetcher
            .fetch(self.ecosystem, name, version, &metadata)?;
        self.analyzer
            .analyze(source.root(), Some(&metadata), selection)
    }

    /// Scan an already-extracted local tree. There is no registry snapshot,
    /// so only sourcecode rules run.
    pub fn scan_local(&self, path: &Path, selection: &RuleSelection) -> Result<PackageReport> {
        self.analyzer.analyze(path, None, selection)
    }
}

/// Outcome of a manifest scan: the per-package reports plus every contained
/// failure collected along the way.
#[derive(Debug)]
pub struct VerifyOutcome {
    pub report: ProjectReport,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ProjectScanner {
    package_scanner: PackageScanner,
    mode: ResolutionMode,
    workers: usize,
}

impl ProjectScanner {
    pub fn new(package_scanner: PackageScanner, mode: ResolutionMode, workers: usize) -> Self {
        Self {
            package_scanner,
            mode,
            workers: workers.max(1),
        }
    }

    pub fn package_scanner(&self) -> &PackageScanner {
        &self.package_scanner
    }

    /// Scan every dependency of a manifest file. Failing to read the
    /// manifest itself is the only fatal error.
    pub fn verify_manifest(
        &self,
        manifest: &Path,
        selection: &RuleSelection,
        cancel: Option<&AtomicBool>,
    ) -> Result<VerifyOutcome> {
        let raw = std::fs::read_to_string(manifest).map_err(|source| ShieldError::Manifest {
            file: manifest.display().to_string(),
            source,
        })?;
        Ok(self.verify_requirements(&raw, selection, cancel))
    }

    /// Scan every dependency named by raw manifest text.
    pub fn verify_requirements(
        &self,
        raw: &str,
        selection: &RuleSelection,
        cancel: Option<&AtomicBool>,
    ) -> VerifyOutcome {
        let resolver = Resolver::new(self.package_scanner.registry(), self.mode);
        let resolution = resolver.resolve_manifest(raw);

        let work: Vec<(String, String)> = resolution
            .dependencies
            .iter()
            .flat_map(|(name, versions)| {
                versions.iter().map(move |v| (name.clone(), v.clone()))
            })
            .collect();
        let total = work.len();
        let completed = AtomicUsize::new(0);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .unwrap_or_else(|_| rayon::ThreadPoolBuilder::new().build().unwrap());

        type WorkResult = (String, String, Result<PackageReport>);
        let scanned: Vec<Option<WorkResult>> = pool.install(|| {
            work.par_iter()
                .map(|(name, version)| {
                    if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                        tracing::info!(package = %name, version = %version, "abandoning work item, scan cancelled");
                        return None;
                    }
                    let result = self.package_scanner.scan_version(name, version, selection);
                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::info!(done, total, package = %name, version = %version, "work item finished");
                    Some((name.clone(), version.clone(), result))
                })
                .collect()
        });

        // Single writer: merge completed items in order.
        let mut report = ProjectReport::default();
        let mut diagnostics = resolution.diagnostics;
        for (name, version, result) in scanned.into_iter().flatten() {
            match result {
                Ok(package_report) => report.insert(&name, &version, package_report),
                Err(e) => diagnostics.push(Diagnostic {
                    context: format!("{name}/{version}"),
                    message: e.to_string(),
                }),
            }
        }

        VerifyOutcome {
            report,
            diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RegexEngine;
    use crate::registry::FetchedSource;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::collections::BTreeSet;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct StubRegistry {
        versions: BTreeMap<String, Vec<String>>,
    }

    impl RegistryClient for StubRegistry {
        fn versions(&self, name: &str) -> std::result::Result<Vec<String>, RegistryError> {
            let mut versions = self
                .versions
                .get(name)
                .cloned()
                .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
            versions.sort_by(|a, b| crate::resolver::version::cmp(b, a));
            Ok(versions)
        }

        fn metadata(&self, name: &str, version: &str) -> std::result::Result<Value, RegistryError> {
            if !self.versions.contains_key(name) {
                return Err(RegistryError::NotFound(name.to_string()));
            }
            Ok(json!({"info": {
                "name": name,
                "version": version,
                "description": "Stub package.",
                "author_email": "dev@example.org"
            }}))
        }
    }

    struct StubFetcher {
        root: PathBuf,
    }

    impl SourceFetcher for StubFetcher {
        fn fetch(
            &self,
            _ecosystem: Ecosystem,
            _name: &str,
            _version: &str,
            _metadata: &Value,
        ) -> std::result::Result<FetchedSource, RegistryError> {
            Ok(FetchedSource::pinned(self.root.clone()))
        }
    }

    fn source_tree() -> TempDir {
        let tree = TempDir::new().unwrap();
        let pkg = tree.path().join("pkg");
        std::fs::create_dir_all(&pkg).unwrap();
        std::fs::write(
            pkg.join("main.py"),
            "import base64\nexec(base64.b64decode(blob))\n",
        )
        .unwrap();
        tree
    }

    fn scanner(tree: &TempDir, versions: &[(&str, &[&str])], mode: ResolutionMode) -> ProjectScanner {
        let registry = StubRegistry {
            versions: versions
                .iter()
                .map(|(n, vs)| (n.to_string(), vs.iter().map(|v| v.to_string()).collect()))
                .collect(),
        };
        let analyzer = Analyzer::new(Ecosystem::PyPi, Box::new(RegexEngine)).unwrap();
        let package_scanner = PackageScanner::new(
            Ecosystem::PyPi,
            Box::new(registry),
            Box::new(StubFetcher {
                root: tree.path().to_path_buf(),
            }),
            analyzer,
        );
        ProjectScanner::new(package_scanner, mode, 2)
    }

    fn full_selection(scanner: &ProjectScanner) -> RuleSelection {
        scanner
            .package_scanner()
            .analyzer()
            .catalog()
            .resolve_selection(&BTreeSet::new(), &BTreeSet::new())
            .unwrap()
    }

    #[test]
    fn one_report_entry_per_resolved_pair() {
        let tree = source_tree();
        let scanner = scanner(
            &tree,
            &[("alpha", &["1.0", "1.5"]), ("beta", &["0.3"])],
            ResolutionMode::Exhaustive,
        );
        let selection = full_selection(&scanner);

        let outcome =
            scanner.verify_requirements("alpha>=1.0\nbeta\n", &selection, None);
        let keys: Vec<&String> = outcome.report.packages().keys().collect();
        assert_eq!(keys, vec!["alpha/1.0", "alpha/1.5", "beta/0.3"]);
        assert!(outcome.diagnostics.is_empty());

        for report in outcome.report.packages().values() {
            assert!(report.issues >= 1, "exec-base64 should have matched");
        }
    }

    #[test]
    fn best_match_scans_only_the_newest_version() {
        let tree = source_tree();
        let scanner = scanner(
            &tree,
            &[("alpha", &["1.0", "1.5", "1.10"])],
            ResolutionMode::BestMatch,
        );
        let selection = full_selection(&scanner);

        let outcome = scanner.verify_requirements("alpha>=1.0", &selection, None);
        assert_eq!(outcome.report.len(), 1);
        assert!(outcome.report.packages().contains_key("alpha/1.10"));
    }

    #[test]
    fn missing_package_becomes_a_diagnostic_not_a_failure() {
        let tree = source_tree();
        let scanner = scanner(&tree, &[("alpha", &["1.0"])], ResolutionMode::Exhaustive);
        let selection = full_selection(&scanner);

        let outcome = scanner.verify_requirements("ghost==1.0\nalpha\n", &selection, None);
        assert_eq!(outcome.report.len(), 1);
        assert!(outcome.report.packages().contains_key("alpha/1.0"));
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].context, "ghost");
    }

    #[test]
    fn cancellation_abandons_remaining_items() {
        let tree = source_tree();
        let scanner = scanner(
            &tree,
            &[("alpha", &["1.0", "1.5", "2.0"])],
            ResolutionMode::Exhaustive,
        );
        let selection = full_selection(&scanner);

        let cancel = AtomicBool::new(true);
        let outcome =
            scanner.verify_requirements("alpha>=1.0", &selection, Some(&cancel));
        assert!(outcome.report.is_empty());
    }

    #[test]
    fn repeated_scans_are_idempotent() {
        let tree = source_tree();
        let scanner = scanner(
            &tree,
            &[("alpha", &["1.0", "1.5"]), ("beta", &["0.3"])],
            ResolutionMode::Exhaustive,
        );
        let selection = full_selection(&scanner);
        let manifest = "alpha>=1.0\nbeta\n";

        let first = scanner.verify_requirements(manifest, &selection, None);
        let second = scanner.verify_requirements(manifest, &selection, None);
        assert_eq!(
            serde_json::to_string(&first.report).unwrap(),
            serde_json::to_string(&second.report).unwrap()
        );
    }

    #[test]
    fn scan_remote_defaults_to_latest_version() {
        let tree = source_tree();
        let scanner = scanner(
            &tree,
            &[("alpha", &["1.0", "1.9", "1.10"])],
            ResolutionMode::BestMatch,
        );
        let selection = full_selection(&scanner);

        let (version, report) = scanner
            .package_scanner()
            .scan_remote("alpha", None, &selection)
            .unwrap();
        assert_eq!(version, "1.10");
        assert!(report.issues >= 1);
    }

    #[test]
    fn local_scan_reports_sourcecode_rules_only() {
        let tree = source_tree();
        let scanner = scanner(&tree, &[], ResolutionMode::BestMatch);
        let selection = full_selection(&scanner);

        let report = scanner
            .package_scanner()
            .scan_local(tree.path(), &selection)
            .unwrap();
        assert_eq!(report.results.len(), selection.sourcecode.len());
    }
}
