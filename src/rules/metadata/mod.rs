//! Metadata heuristics.
//!
//! Each rule is a single-purpose detector over a package's registry
//! metadata snapshot (raw JSON; the schema differs per ecosystem). A
//! detector that cannot read the fields it needs returns an error, which
//! the dispatch engine isolates to that rule.

mod disposable_email;
mod empty_information;
mod release_zero;
mod typosquatting;

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::RuleResult;
use crate::ecosystem::Ecosystem;
use crate::error::Result;

pub use disposable_email::DisposableEmailDetector;
pub use empty_information::EmptyInfoDetector;
pub use release_zero::ReleaseZeroDetector;
pub use typosquatting::TyposquatDetector;

/// A detector checks one package's registry metadata and produces a result.
pub trait MetadataDetector: Send + Sync {
    /// Rule name this detector is registered under.
    fn name(&self) -> &'static str;

    /// Run the heuristic against a metadata snapshot.
    fn detect(&self, metadata: &Value) -> Result<RuleResult>;
}

/// All detectors registered for an ecosystem, keyed by rule name.
pub fn detectors(ecosystem: Ecosystem) -> BTreeMap<String, Box<dyn MetadataDetector>> {
    let mut all: Vec<Box<dyn MetadataDetector>> = vec![
        Box::new(EmptyInfoDetector::new(ecosystem)),
        Box::new(TyposquatDetector::new(ecosystem)),
        Box::new(DisposableEmailDetector::new(ecosystem)),
    ];
    if ecosystem == Ecosystem::PyPi {
        all.push(Box::new(ReleaseZeroDetector));
    }

    all.into_iter()
        .map(|detector| (detector.name().to_string(), detector))
        .collect()
}

/// The metadata rule names for an ecosystem.
pub fn rule_names(ecosystem: Ecosystem) -> BTreeSet<String> {
    detectors(ecosystem).into_keys().collect()
}

/// Read a string field, erroring when the snapshot lacks it.
fn required_str<'v>(metadata: &'v Value, pointer: &str) -> Result<&'v str> {
    metadata
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            crate::error::ShieldError::Internal(format!("metadata field {pointer} missing"))
        })
}
