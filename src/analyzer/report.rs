//! Report aggregation.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::rules::RuleResult;

/// One package version's scan outcome.
#[derive(Debug, Clone, Serialize)]
pub struct PackageReport {
    /// Number of rules whose result is an indicator: a true flag, a
    /// non-empty description, or a non-empty location map.
    pub issues: usize,
    pub results: BTreeMap<String, RuleResult>,
}

impl PackageReport {
    pub fn from_results(results: BTreeMap<String, RuleResult>) -> Self {
        let issues = results.values().filter(|r| r.is_issue()).count();
        Self { issues, results }
    }
}

/// Disjoint union of the metadata and sourcecode result maps. The two
/// namespaces cannot collide by construction; a collision here is a
/// programming error.
pub fn merge_namespaces(
    metadata: BTreeMap<String, RuleResult>,
    sourcecode: BTreeMap<String, RuleResult>,
) -> BTreeMap<String, RuleResult> {
    let mut merged = metadata;
    for (rule, result) in sourcecode {
        let previous = merged.insert(rule, result);
        debug_assert!(previous.is_none(), "rule namespaces must be disjoint");
    }
    merged
}

/// All package reports from one manifest scan, keyed `"<package>/<version>"`.
/// Each key is written exactly once.
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct ProjectReport {
    packages: BTreeMap<String, PackageReport>,
}

impl ProjectReport {
    pub fn insert(&mut self, package: &str, version: &str, report: PackageReport) {
        let previous = self.packages.insert(format!("{package}/{version}"), report);
        debug_assert!(
            previous.is_none(),
            "each resolved (package, version) pair is written once"
        );
    }

    pub fn packages(&self) -> &BTreeMap<String, PackageReport> {
        &self.packages
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn total_issues(&self) -> usize {
        self.packages.values().map(|r| r.issues).sum()
    }
}
