use crate::analyzer::{PackageReport, ProjectReport};
use crate::rules::RuleResult;

/// Render one package scan as human-readable console output.
pub fn render_package(identifier: &str, report: &PackageReport) -> String {
    let mut output = String::new();

    if report.issues == 0 {
        output.push_str(&format!(
            "Found 0 potentially malicious indicators scanning {identifier}\n\n"
        ));
        return output;
    }

    output.push_str(&format!(
        "Found {} potentially malicious indicator(s) in {identifier}\n\n",
        report.issues
    ));

    for (rule, result) in &report.results {
        if !result.is_issue() {
            continue;
        }
        match result {
            RuleResult::Bool(_) => {
                output.push_str(&format!("  {rule}: triggered\n\n"));
            }
            RuleResult::Description(text) => {
                output.push_str(&format!("  {rule}: {text}\n\n"));
            }
            RuleResult::Locations(map) => {
                output.push_str(&format!(
                    "  {rule}: found {} source code match(es)\n",
                    map.len()
                ));
                for (location, code) in map {
                    output.push_str(&format!("    * at {location}\n"));
                    output.push_str(&format!("      {}\n", code.trim()));
                }
                output.push('\n');
            }
        }
    }

    output
}

/// Render a manifest scan: one section per scanned package version.
pub fn render_project(report: &ProjectReport) -> String {
    if report.is_empty() {
        return "No dependencies were resolved from the manifest.\n".to_string();
    }

    let mut output = String::new();
    for (identifier, package_report) in report.packages() {
        output.push_str(&render_package(identifier, package_report));
    }
    output.push_str(&format!(
        "Scanned {} package version(s), {} with indicator(s).\n",
        report.len(),
        report
            .packages()
            .values()
            .filter(|r| r.issues > 0)
            .count()
    ));
    output
}
