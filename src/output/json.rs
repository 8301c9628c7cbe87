use serde::Serialize;

use crate::analyzer::{PackageReport, ProjectReport};
use crate::error::Result;

#[derive(Serialize)]
struct PackageJson<'a> {
    package: &'a str,
    #[serde(flatten)]
    report: &'a PackageReport,
}

#[derive(Serialize)]
struct ProjectJson<'a> {
    manifest: &'a str,
    packages: &'a ProjectReport,
}

/// Render one package scan as a JSON report.
pub fn render_package(identifier: &str, report: &PackageReport) -> Result<String> {
    let json = serde_json::to_string_pretty(&PackageJson {
        package: identifier,
        report,
    })?;
    Ok(json)
}

/// Render a manifest scan as a JSON report.
pub fn render_project(manifest: &str, report: &ProjectReport) -> Result<String> {
    let json = serde_json::to_string_pretty(&ProjectJson { manifest, packages: report })?;
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleResult;
    use std::collections::BTreeMap;

    #[test]
    fn package_json_shape() {
        let mut results = BTreeMap::new();
        results.insert("empty_information".to_string(), RuleResult::Bool(true));
        let rendered =
            render_package("pkg/1.0", &PackageReport::from_results(results)).unwrap();

        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["package"], "pkg/1.0");
        assert_eq!(value["issues"], 1);
        assert_eq!(value["results"]["empty_information"], true);
    }

    #[test]
    fn untagged_results_serialize_naturally() {
        let mut results = BTreeMap::new();
        let mut locations = BTreeMap::new();
        locations.insert("f.py:1".to_string(), "code".to_string());
        results.insert("exec-base64".to_string(), RuleResult::Locations(locations));
        results.insert(
            "typosquatting".to_string(),
            RuleResult::Description("close to requests".to_string()),
        );

        let rendered = render_package("pkg/1.0", &PackageReport::from_results(results)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["results"]["exec-base64"]["f.py:1"], "code");
        assert_eq!(value["results"]["typosquatting"], "close to requests");
    }
}
