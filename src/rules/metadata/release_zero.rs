use serde_json::Value;

use super::{required_str, MetadataDetector};
use crate::error::Result;
use crate::rules::RuleResult;

/// Flags versions published as `0.0.0` or `0.0`. Dependency-confusion
/// placeholders are typically uploaded under these versions.
pub struct ReleaseZeroDetector;

impl MetadataDetector for ReleaseZeroDetector {
    fn name(&self) -> &'static str {
        "release_zero"
    }

    fn detect(&self, metadata: &Value) -> Result<RuleResult> {
        let version = required_str(metadata, "/info/version")?;
        Ok(RuleResult::Bool(version == "0.0.0" || version == "0.0"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn zero_versions_are_flagged() {
        let metadata = json!({"info": {"version": "0.0.0"}});
        assert_eq!(
            ReleaseZeroDetector.detect(&metadata).unwrap(),
            RuleResult::Bool(true)
        );
    }

    #[test]
    fn ordinary_versions_pass() {
        let metadata = json!({"info": {"version": "0.0.1"}});
        assert_eq!(
            ReleaseZeroDetector.detect(&metadata).unwrap(),
            RuleResult::Bool(false)
        );
    }
}
