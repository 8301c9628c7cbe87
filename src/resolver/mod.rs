//! Dependency version-constraint resolution.
//!
//! Turns raw manifest text (a requirements-style dependency list) into a
//! mapping of package name to the set of published versions satisfying that
//! package's constraints. Every failure below the manifest itself — a line
//! that does not parse, a package missing from the registry, an operator we
//! do not know — is collected as a diagnostic and never aborts the rest of
//! the resolution.

pub mod version;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::registry::{RegistryClient, RegistryError};

static REQUIREMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)(?:\[[^\]]*\])?\s*(.*)$").unwrap()
});

static SPEC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([<>=!~^]+)\s*(\S+)$").unwrap());

/// Version-comparison operator in a dependency constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Compatible,
}

impl Qualifier {
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            ">=" => Some(Self::Ge),
            "<=" => Some(Self::Le),
            "==" => Some(Self::Eq),
            "~=" => Some(Self::Compatible),
            _ => None,
        }
    }
}

/// One parsed requirement line: a package plus its raw `(operator, version)`
/// constraint pairs. Operators stay raw strings here so an unknown operator
/// can be diagnosed at resolution time without dropping the whole line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub specs: Vec<(String, String)>,
}

/// Whether a manifest scan covers every satisfying version or only the
/// newest one per package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResolutionMode {
    #[default]
    BestMatch,
    Exhaustive,
}

/// A contained, user-visible resolution problem.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub context: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.context, self.message)
    }
}

/// Result of resolving one manifest.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Package name to the set of versions to scan. An empty set means no
    /// published version satisfied the constraints.
    pub dependencies: BTreeMap<String, BTreeSet<String>>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct Resolver<'a> {
    registry: &'a dyn RegistryClient,
    mode: ResolutionMode,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a dyn RegistryClient, mode: ResolutionMode) -> Self {
        Self { registry, mode }
    }

    /// Resolve raw manifest text into versions to scan.
    pub fn resolve_manifest(&self, raw: &str) -> Resolution {
        let mut resolution = Resolution::default();
        let mut full_sets: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for line in sanitize_lines(raw) {
            let requirement = match parse_requirement(&line) {
                Ok(req) => req,
                Err(message) => {
                    tracing::warn!(line = %line, %message, "dropping unparseable requirement line");
                    resolution.diagnostics.push(Diagnostic {
                        context: line.clone(),
                        message,
                    });
                    continue;
                }
            };

            let Some(versions) = self.resolve_requirement(&requirement, &mut resolution.diagnostics)
            else {
                continue;
            };

            // Duplicate lines for one package intersect, same as multiple
            // constraints on one line.
            match full_sets.entry(requirement.name.clone()) {
                std::collections::btree_map::Entry::Vacant(e) => {
                    e.insert(versions);
                }
                std::collections::btree_map::Entry::Occupied(mut e) => {
                    let merged = e.get().intersection(&versions).cloned().collect();
                    *e.get_mut() = merged;
                }
            }
        }

        resolution.dependencies = full_sets
            .into_iter()
            .map(|(name, set)| (name, self.collapse(set)))
            .collect();
        resolution
    }

    fn resolve_requirement(
        &self,
        requirement: &Requirement,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<BTreeSet<String>> {
        let available = match self.registry.versions(&requirement.name) {
            Ok(versions) => versions,
            Err(RegistryError::NotFound(_)) => {
                tracing::warn!(package = %requirement.name, "package not on the registry");
                diagnostics.push(Diagnostic {
                    context: requirement.name.clone(),
                    message: "not found on the registry".into(),
                });
                return None;
            }
            Err(e) => {
                tracing::warn!(package = %requirement.name, error = %e, "version list fetch failed");
                diagnostics.push(Diagnostic {
                    context: requirement.name.clone(),
                    message: e.to_string(),
                });
                return None;
            }
        };

        if requirement.specs.is_empty() {
            // Bare package name: latest version only.
            return Some(available.first().cloned().into_iter().collect());
        }

        let mut valid: Option<BTreeSet<String>> = None;
        for (op, bound) in &requirement.specs {
            let qualifier = match Qualifier::parse(op) {
                Some(q) => q,
                None => {
                    diagnostics.push(Diagnostic {
                        context: requirement.name.clone(),
                        message: format!("unknown qualifier: {op}"),
                    });
                    continue;
                }
            };

            let candidates = filter_candidates(&available, qualifier, bound);
            valid = Some(match valid {
                None => candidates,
                Some(previous) => previous.intersection(&candidates).cloned().collect(),
            });
        }

        Some(valid.unwrap_or_default())
    }

    fn collapse(&self, set: BTreeSet<String>) -> BTreeSet<String> {
        match self.mode {
            ResolutionMode::Exhaustive => set,
            ResolutionMode::BestMatch => set
                .iter()
                .max_by(|a, b| version::cmp(a, b))
                .cloned()
                .into_iter()
                .collect(),
        }
    }
}

/// Keep only lines that look like requirements: joins backslash
/// continuations, then drops blank lines and lines not opening with a word
/// character (comments, pip flags).
fn sanitize_lines(raw: &str) -> Vec<String> {
    let joined = raw.replace("\\\r\n", " ").replace("\\\n", " ");

    joined
        .lines()
        .filter_map(|line| {
            let line = line.split('#').next().unwrap_or_default();
            let line = line.split(';').next().unwrap_or_default().trim();
            let starts_requirement = line
                .chars()
                .next()
                .map(|c| c.is_ascii_alphanumeric() || c == '_')
                .unwrap_or(false);
            if starts_requirement {
                Some(line.to_string())
            } else {
                None
            }
        })
        .collect()
}

/// Parse one sanitized line: `<name>[<op><version>][,<op><version>...]`.
pub fn parse_requirement(line: &str) -> Result<Requirement, String> {
    let captures = REQUIREMENT_RE
        .captures(line)
        .ok_or_else(|| "not a requirement expression".to_string())?;
    let name = captures[1].to_string();
    let rest = captures[2].trim();

    if rest.is_empty() {
        return Ok(Requirement {
            name,
            specs: Vec::new(),
        });
    }

    let mut specs = Vec::new();
    for part in rest.split(',') {
        let part = part.trim();
        let spec = SPEC_RE
            .captures(part)
            .ok_or_else(|| format!("malformed constraint: {part}"))?;
        specs.push((spec[1].to_string(), spec[2].to_string()));
    }

    Ok(Requirement { name, specs })
}

fn filter_candidates(
    available: &[String],
    qualifier: Qualifier,
    bound: &str,
) -> BTreeSet<String> {
    match qualifier {
        Qualifier::Gt => by_ordering(available, bound, |o| o == Ordering::Greater),
        Qualifier::Lt => by_ordering(available, bound, |o| o == Ordering::Less),
        Qualifier::Ge => by_ordering(available, bound, |o| o != Ordering::Less),
        Qualifier::Le => by_ordering(available, bound, |o| o != Ordering::Greater),
        Qualifier::Eq => {
            let Some(pattern) = eq_pattern(bound) else {
                return BTreeSet::new();
            };
            available
                .iter()
                .filter(|v| pattern.is_match(v))
                .cloned()
                .collect()
        }
        Qualifier::Compatible => available
            .iter()
            .filter(|v| version::is_compatible(v, bound))
            .cloned()
            .collect(),
    }
}

fn by_ordering(
    available: &[String],
    bound: &str,
    keep: impl Fn(Ordering) -> bool,
) -> BTreeSet<String> {
    available
        .iter()
        .filter(|v| keep(version::cmp(v, bound)))
        .cloned()
        .collect()
}

/// `==` treats its version as an exact-or-wildcard pattern: `*` matches any
/// run of characters, everything else is literal, anchored at both ends.
fn eq_pattern(bound: &str) -> Option<Regex> {
    let mut pattern = String::from("^");
    for ch in bound.chars() {
        if ch == '*' {
            pattern.push_str(".*");
        } else {
            pattern.push_str(&regex::escape(&ch.to_string()));
        }
    }
    pattern.push('$');
    Regex::new(&pattern).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    struct StubRegistry(BTreeMap<String, Vec<String>>);

    impl StubRegistry {
        fn with(entries: &[(&str, &[&str])]) -> Self {
            Self(
                entries
                    .iter()
                    .map(|(name, versions)| {
                        (
                            name.to_string(),
                            versions.iter().map(|v| v.to_string()).collect(),
                        )
                    })
                    .collect(),
            )
        }
    }

    impl RegistryClient for StubRegistry {
        fn versions(&self, name: &str) -> Result<Vec<String>, RegistryError> {
            let mut versions = self
                .0
                .get(name)
                .cloned()
                .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
            versions.sort_by(|a, b| version::cmp(b, a));
            Ok(versions)
        }

        fn metadata(&self, _name: &str, _version: &str) -> Result<serde_json::Value, RegistryError> {
            Ok(json!({}))
        }
    }

    fn set(versions: &[&str]) -> BTreeSet<String> {
        versions.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn range_constraints_intersect() {
        let registry =
            StubRegistry::with(&[("pkg", &["0.9", "1.0", "1.5", "1.9", "2.0", "2.1"])]);
        let resolver = Resolver::new(&registry, ResolutionMode::Exhaustive);
        let resolution = resolver.resolve_manifest("pkg>=1.0,<2.0\n");
        assert_eq!(resolution.dependencies["pkg"], set(&["1.0", "1.5", "1.9"]));
        assert!(resolution.diagnostics.is_empty());
    }

    #[test]
    fn compatible_release_keeps_bound_prefix() {
        let registry = StubRegistry::with(&[("pkg", &["1.3", "1.4", "1.4.2", "1.5", "2.0"])]);
        let resolver = Resolver::new(&registry, ResolutionMode::Exhaustive);
        let resolution = resolver.resolve_manifest("pkg~=1.4");
        assert_eq!(resolution.dependencies["pkg"], set(&["1.4", "1.4.2"]));
    }

    #[test]
    fn unsatisfiable_constraints_yield_empty_set() {
        let registry = StubRegistry::with(&[("pkg", &["1.0", "2.0"])]);
        let resolver = Resolver::new(&registry, ResolutionMode::Exhaustive);
        let resolution = resolver.resolve_manifest("pkg>3.0");
        assert_eq!(resolution.dependencies["pkg"], BTreeSet::new());
    }

    #[test]
    fn best_match_collapses_to_maximum() {
        let registry =
            StubRegistry::with(&[("pkg", &["0.9", "1.0", "1.5", "1.9", "1.10", "2.0"])]);
        let resolver = Resolver::new(&registry, ResolutionMode::BestMatch);
        let resolution = resolver.resolve_manifest("pkg>=1.0,<2.0");
        assert_eq!(resolution.dependencies["pkg"], set(&["1.10"]));
    }

    #[test]
    fn bare_name_resolves_to_latest_only() {
        let registry = StubRegistry::with(&[("pkg", &["1.0", "1.2", "1.1"])]);
        let resolver = Resolver::new(&registry, ResolutionMode::Exhaustive);
        let resolution = resolver.resolve_manifest("pkg");
        assert_eq!(resolution.dependencies["pkg"], set(&["1.2"]));
    }

    #[test]
    fn exact_and_wildcard_matching() {
        let registry = StubRegistry::with(&[("pkg", &["1.4", "1.4.2", "1.40", "11.4"])]);
        let resolver = Resolver::new(&registry, ResolutionMode::Exhaustive);

        let exact = resolver.resolve_manifest("pkg==1.4");
        assert_eq!(exact.dependencies["pkg"], set(&["1.4"]));

        let wildcard = resolver.resolve_manifest("pkg==1.4.*");
        assert_eq!(wildcard.dependencies["pkg"], set(&["1.4.2"]));
    }

    #[test]
    fn missing_package_is_skipped_with_diagnostic() {
        let registry = StubRegistry::with(&[("present", &["1.0"])]);
        let resolver = Resolver::new(&registry, ResolutionMode::Exhaustive);
        let resolution = resolver.resolve_manifest("ghost==1.0\npresent\n");
        assert!(!resolution.dependencies.contains_key("ghost"));
        assert_eq!(resolution.dependencies["present"], set(&["1.0"]));
        assert_eq!(resolution.diagnostics.len(), 1);
        assert_eq!(resolution.diagnostics[0].context, "ghost");
    }

    #[test]
    fn unknown_qualifier_contributes_no_candidates() {
        let registry = StubRegistry::with(&[("pkg", &["1.0", "1.5", "2.0"])]);
        let resolver = Resolver::new(&registry, ResolutionMode::Exhaustive);
        let resolution = resolver.resolve_manifest("pkg>=1.5,^2.0");
        assert_eq!(resolution.dependencies["pkg"], set(&["1.5", "2.0"]));
        assert_eq!(resolution.diagnostics.len(), 1);
        assert!(resolution.diagnostics[0].message.contains('^'));
    }

    #[test]
    fn duplicate_lines_merge_by_intersection() {
        let registry = StubRegistry::with(&[("pkg", &["1.0", "1.5", "2.0"])]);
        let resolver = Resolver::new(&registry, ResolutionMode::Exhaustive);
        let resolution = resolver.resolve_manifest("pkg>=1.0\npkg<2.0\n");
        assert_eq!(resolution.dependencies["pkg"], set(&["1.0", "1.5"]));
    }

    #[test]
    fn comments_blanks_and_flags_are_ignored() {
        let registry = StubRegistry::with(&[("pkg", &["1.0"])]);
        let resolver = Resolver::new(&registry, ResolutionMode::Exhaustive);
        let manifest = "# a comment\n\n-r other.txt\npkg==1.0  # pinned\n";
        let resolution = resolver.resolve_manifest(manifest);
        assert_eq!(resolution.dependencies.len(), 1);
        assert_eq!(resolution.dependencies["pkg"], set(&["1.0"]));
        assert!(resolution.diagnostics.is_empty());
    }

    #[test]
    fn backslash_continuation_joins_lines() {
        let registry = StubRegistry::with(&[("pkg", &["1.0", "1.5", "2.0"])]);
        let resolver = Resolver::new(&registry, ResolutionMode::Exhaustive);
        let resolution = resolver.resolve_manifest("pkg>=1.0,\\\n<2.0\n");
        assert_eq!(resolution.dependencies["pkg"], set(&["1.0", "1.5"]));
    }

    #[test]
    fn unparseable_manifest_collects_diagnostics() {
        let registry = StubRegistry::with(&[]);
        let resolver = Resolver::new(&registry, ResolutionMode::Exhaustive);
        let resolution = resolver.resolve_manifest("pkg === what even\nother ==");
        assert!(resolution.dependencies.is_empty());
        assert_eq!(resolution.diagnostics.len(), 2);
    }

    #[test]
    fn extras_and_markers_are_stripped() {
        let registry = StubRegistry::with(&[("pkg", &["1.0", "2.0"])]);
        let resolver = Resolver::new(&registry, ResolutionMode::Exhaustive);
        let resolution = resolver.resolve_manifest("pkg[extra1,extra2]>=1.0; python_version > '3.8'");
        assert_eq!(resolution.dependencies["pkg"], set(&["1.0", "2.0"]));
    }

    proptest! {
        #[test]
        fn best_match_is_singleton_maximum(versions in proptest::collection::btree_set("[0-9]{1,2}\\.[0-9]{1,2}", 1..8)) {
            let list: Vec<&str> = versions.iter().map(String::as_str).collect();
            let registry = StubRegistry::with(&[("pkg", list.as_slice())]);
            let resolver = Resolver::new(&registry, ResolutionMode::BestMatch);
            let resolution = resolver.resolve_manifest("pkg>=0");

            let resolved = &resolution.dependencies["pkg"];
            prop_assert_eq!(resolved.len(), 1);
            let best = resolved.iter().next().unwrap();
            for v in &versions {
                prop_assert!(version::cmp(best, v) != std::cmp::Ordering::Less);
            }
        }
    }
}
