use serde_json::Value;

use super::{required_str, MetadataDetector};
use crate::ecosystem::Ecosystem;
use crate::error::Result;
use crate::rules::RuleResult;

/// Flags packages published with an empty description. Legitimate packages
/// almost always carry one; throwaway malware rarely bothers.
pub struct EmptyInfoDetector {
    ecosystem: Ecosystem,
}

impl EmptyInfoDetector {
    pub fn new(ecosystem: Ecosystem) -> Self {
        Self { ecosystem }
    }
}

impl MetadataDetector for EmptyInfoDetector {
    fn name(&self) -> &'static str {
        "empty_information"
    }

    fn detect(&self, metadata: &Value) -> Result<RuleResult> {
        let description = match self.ecosystem {
            Ecosystem::PyPi => required_str(metadata, "/info/description")?,
            Ecosystem::Npm => metadata
                .pointer("/description")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        };
        Ok(RuleResult::Bool(
            description.split_whitespace().next().is_none(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_description_is_flagged() {
        let detector = EmptyInfoDetector::new(Ecosystem::PyPi);
        let metadata = json!({"info": {"description": "  \n "}});
        assert_eq!(detector.detect(&metadata).unwrap(), RuleResult::Bool(true));
    }

    #[test]
    fn real_description_passes() {
        let detector = EmptyInfoDetector::new(Ecosystem::PyPi);
        let metadata = json!({"info": {"description": "An HTTP library."}});
        assert_eq!(detector.detect(&metadata).unwrap(), RuleResult::Bool(false));
    }

    #[test]
    fn missing_field_is_an_error() {
        let detector = EmptyInfoDetector::new(Ecosystem::PyPi);
        assert!(detector.detect(&json!({})).is_err());
    }

    #[test]
    fn npm_missing_description_counts_as_empty() {
        let detector = EmptyInfoDetector::new(Ecosystem::Npm);
        assert_eq!(detector.detect(&json!({})).unwrap(), RuleResult::Bool(true));
    }
}
