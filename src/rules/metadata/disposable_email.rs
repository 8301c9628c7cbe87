use serde_json::Value;

use super::MetadataDetector;
use crate::ecosystem::Ecosystem;
use crate::error::Result;
use crate::rules::RuleResult;

/// Throwaway mail providers. A maintainer address on one of these domains
/// cannot be tied to a stable identity.
const DISPOSABLE_DOMAINS: &[&str] = &[
    "10minutemail.com",
    "dispostable.com",
    "fakeinbox.com",
    "getnada.com",
    "guerrillamail.com",
    "mailinator.com",
    "maildrop.cc",
    "mintemail.com",
    "mohmal.com",
    "sharklasers.com",
    "temp-mail.org",
    "tempail.com",
    "throwawaymail.com",
    "trashmail.com",
    "yopmail.com",
];

/// Flags maintainer emails hosted on disposable-mail domains.
pub struct DisposableEmailDetector {
    ecosystem: Ecosystem,
}

impl DisposableEmailDetector {
    pub fn new(ecosystem: Ecosystem) -> Self {
        Self { ecosystem }
    }

    fn emails(&self, metadata: &Value) -> Vec<String> {
        match self.ecosystem {
            Ecosystem::PyPi => ["/info/author_email", "/info/maintainer_email"]
                .iter()
                .filter_map(|pointer| metadata.pointer(pointer))
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Ecosystem::Npm => metadata
                .pointer("/maintainers")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|m| m.get("email"))
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        }
    }
}

impl MetadataDetector for DisposableEmailDetector {
    fn name(&self) -> &'static str {
        "disposable_email"
    }

    fn detect(&self, metadata: &Value) -> Result<RuleResult> {
        for email in self.emails(metadata) {
            let Some(domain) = email.rsplit('@').next().filter(|d| *d != email) else {
                continue;
            };
            let domain = domain.trim().to_lowercase();
            if DISPOSABLE_DOMAINS.contains(&domain.as_str()) {
                return Ok(RuleResult::Description(format!(
                    "maintainer email {email} uses disposable mail domain {domain}"
                )));
            }
        }
        Ok(RuleResult::Description(String::new()))
    }
}
