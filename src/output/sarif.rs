use std::collections::BTreeSet;

use serde_json::{json, Value};

use crate::analyzer::{PackageReport, ProjectReport};
use crate::error::Result;
use crate::rules::RuleResult;

/// Render one package scan as SARIF 2.1.0.
///
/// Produces a self-contained SARIF log compatible with GitHub Code Scanning
/// and other SARIF consumers.
pub fn render_package(identifier: &str, report: &PackageReport) -> Result<String> {
    render(identifier, results_for(identifier, report), rule_ids(report))
}

/// Render a manifest scan as SARIF 2.1.0, one result stream across all
/// scanned package versions.
pub fn render_project(manifest: &str, report: &ProjectReport) -> Result<String> {
    let mut results = Vec::new();
    let mut rules = BTreeSet::new();
    for (identifier, package_report) in report.packages() {
        results.extend(results_for(identifier, package_report));
        rules.extend(rule_ids(package_report));
    }
    render(manifest, results, rules)
}

fn rule_ids(report: &PackageReport) -> BTreeSet<String> {
    report
        .results
        .iter()
        .filter(|(_, result)| result.is_issue())
        .map(|(rule, _)| rule.clone())
        .collect()
}

fn results_for(identifier: &str, report: &PackageReport) -> Vec<Value> {
    let mut results = Vec::new();
    for (rule, result) in &report.results {
        if !result.is_issue() {
            continue;
        }
        match result {
            RuleResult::Bool(_) => results.push(json!({
                "ruleId": rule,
                "level": "warning",
                "message": { "text": format!("{rule} triggered for {identifier}") },
            })),
            RuleResult::Description(text) => results.push(json!({
                "ruleId": rule,
                "level": "warning",
                "message": { "text": format!("{identifier}: {text}") },
            })),
            RuleResult::Locations(map) => {
                for (location, code) in map {
                    let (file, line) = split_location(location);
                    results.push(json!({
                        "ruleId": rule,
                        "level": "warning",
                        "message": { "text": format!("{rule} matched in {identifier}: {code}") },
                        "locations": [{
                            "physicalLocation": {
                                "artifactLocation": { "uri": file },
                                "region": { "startLine": line },
                            },
                        }],
                    }));
                }
            }
        }
    }
    results
}

/// Location keys are `"<relative_path>:<line>"`.
fn split_location(location: &str) -> (&str, usize) {
    match location.rsplit_once(':') {
        Some((file, line)) => (file, line.parse().unwrap_or(1)),
        None => (location, 1),
    }
}

fn render(target: &str, results: Vec<Value>, rules: BTreeSet<String>) -> Result<String> {
    let rules: Vec<Value> = rules
        .into_iter()
        .map(|id| {
            json!({
                "id": id,
                "name": id,
                "shortDescription": { "text": id },
                "defaultConfiguration": { "level": "warning" },
            })
        })
        .collect();

    let sarif = json!({
        "$schema": "https://docs.oasis-open.org/sarif/sarif/v2.1.0/errata01/os/schemas/sarif-schema-2.1.0.json",
        "version": "2.1.0",
        "runs": [{
            "tool": {
                "driver": {
                    "name": "pkgshield",
                    "informationUri": "https://github.com/limaronaldo/pkgshield",
                    "version": env!("CARGO_PKG_VERSION"),
                    "semanticVersion": env!("CARGO_PKG_VERSION"),
                    "rules": rules,
                },
            },
            "results": results,
            "automationDetails": {
                "id": format!("pkgshield/{}", target),
                "guid": uuid::Uuid::new_v4().to_string(),
            },
            "invocations": [{
                "executionSuccessful": true,
                "endTimeUtc": chrono::Utc::now().to_rfc3339(),
            }],
        }],
    });

    let output = serde_json::to_string_pretty(&sarif)?;
    Ok(output)
}
