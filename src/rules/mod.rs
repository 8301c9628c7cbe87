//! Rule catalog and selection.
//!
//! Rules live in two disjoint namespaces: `metadata` heuristics (one
//! detector instance per rule) and `sourcecode` pattern rules (one
//! definition file per rule). Both catalogs vary per ecosystem.

pub mod metadata;
pub mod sourcecode;

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::ecosystem::Ecosystem;
use crate::error::{Result, ShieldError};

/// Outcome of one rule against one package.
///
/// Metadata rules yield a flag or a descriptive string; sourcecode rules
/// yield matched source keyed by `"<relative_path>:<line>"`. Aggregation
/// switches on this tag, never on a runtime type check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RuleResult {
    Bool(bool),
    Description(String),
    Locations(BTreeMap<String, String>),
}

impl RuleResult {
    /// Whether this result counts as a potentially malicious indicator.
    pub fn is_issue(&self) -> bool {
        match self {
            Self::Bool(flag) => *flag,
            Self::Description(text) => !text.is_empty(),
            Self::Locations(map) => !map.is_empty(),
        }
    }
}

/// Rules chosen for one scan, split by namespace.
#[derive(Debug, Clone)]
pub struct RuleSelection {
    pub metadata: BTreeSet<String>,
    pub sourcecode: BTreeSet<String>,
    /// True when the sourcecode selection is the entire catalog; the
    /// dispatch engine then makes one batched invocation over the whole
    /// ruleset directory instead of one per rule.
    pub batched_sourcecode: bool,
}

/// The rule namespaces available for one ecosystem.
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    ecosystem: Ecosystem,
    metadata_rules: BTreeSet<String>,
    sourcecode_rules: BTreeSet<String>,
}

impl RuleCatalog {
    /// Catalog backed by the built-in detectors and embedded rule files.
    pub fn for_ecosystem(ecosystem: Ecosystem) -> Self {
        Self {
            ecosystem,
            metadata_rules: metadata::rule_names(ecosystem),
            sourcecode_rules: sourcecode::rule_names(ecosystem),
        }
    }

    /// Catalog whose sourcecode namespace comes from an external ruleset
    /// directory instead of the embedded definitions.
    pub fn with_sourcecode_rules(ecosystem: Ecosystem, sourcecode_rules: BTreeSet<String>) -> Self {
        Self {
            ecosystem,
            metadata_rules: metadata::rule_names(ecosystem),
            sourcecode_rules,
        }
    }

    pub fn ecosystem(&self) -> Ecosystem {
        self.ecosystem
    }

    pub fn metadata_rules(&self) -> &BTreeSet<String> {
        &self.metadata_rules
    }

    pub fn sourcecode_rules(&self) -> &BTreeSet<String> {
        &self.sourcecode_rules
    }

    fn contains(&self, rule: &str) -> bool {
        self.metadata_rules.contains(rule) || self.sourcecode_rules.contains(rule)
    }

    /// Apply the selection contract.
    ///
    /// An explicit `requested` set is used verbatim after validation;
    /// otherwise the full catalog minus `excluded` applies. Supplying both
    /// is a configuration conflict rejected before any scanning starts.
    pub fn resolve_selection(
        &self,
        requested: &BTreeSet<String>,
        excluded: &BTreeSet<String>,
    ) -> Result<RuleSelection> {
        if !requested.is_empty() && !excluded.is_empty() {
            return Err(ShieldError::RuleSelectionConflict);
        }

        for rule in requested.iter().chain(excluded.iter()) {
            if !self.contains(rule) {
                return Err(ShieldError::UnknownRule(rule.clone()));
            }
        }

        let (metadata, sourcecode) = if requested.is_empty() {
            (
                self.metadata_rules
                    .difference(excluded)
                    .cloned()
                    .collect::<BTreeSet<_>>(),
                self.sourcecode_rules
                    .difference(excluded)
                    .cloned()
                    .collect::<BTreeSet<_>>(),
            )
        } else {
            (
                requested
                    .intersection(&self.metadata_rules)
                    .cloned()
                    .collect(),
                requested
                    .intersection(&self.sourcecode_rules)
                    .cloned()
                    .collect(),
            )
        };

        let batched_sourcecode = sourcecode == self.sourcecode_rules;
        Ok(RuleSelection {
            metadata,
            sourcecode,
            batched_sourcecode,
        })
    }
}
