//! Sourcecode pattern rules.
//!
//! Each rule is a TOML definition file consumed by the pattern-matching
//! engine. The built-in definitions are embedded in the binary and
//! materialized into a ruleset directory at scan time, because the engine
//! contract is path-based; a user-supplied ruleset directory replaces them
//! wholesale.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::ecosystem::Ecosystem;
use crate::error::Result;

/// Built-in rule definitions, shipped inside the binary.
const EMBEDDED_RULES: &[(&str, &str)] = &[
    ("code-execution", include_str!("defs/code-execution.toml")),
    (
        "download-executable",
        include_str!("defs/download-executable.toml"),
    ),
    ("exec-base64", include_str!("defs/exec-base64.toml")),
    (
        "exfiltrate-sensitive-data",
        include_str!("defs/exfiltrate-sensitive-data.toml"),
    ),
    ("npm-exec-base64", include_str!("defs/npm-exec-base64.toml")),
    (
        "npm-install-script",
        include_str!("defs/npm-install-script.toml"),
    ),
    ("shady-links", include_str!("defs/shady-links.toml")),
];

const PYPI_RULES: &[&str] = &[
    "code-execution",
    "download-executable",
    "exec-base64",
    "exfiltrate-sensitive-data",
    "shady-links",
];

const NPM_RULES: &[&str] = &["npm-exec-base64", "npm-install-script", "shady-links"];

/// The built-in sourcecode rule names for an ecosystem.
pub fn rule_names(ecosystem: Ecosystem) -> BTreeSet<String> {
    let names = match ecosystem {
        Ecosystem::PyPi => PYPI_RULES,
        Ecosystem::Npm => NPM_RULES,
    };
    names.iter().map(|n| n.to_string()).collect()
}

/// A ruleset directory handed to the pattern-matching engine: either the
/// embedded definitions written to a temp directory, or an external
/// directory of `<rule>.toml` files.
pub enum RulesetDir {
    Materialized(TempDir),
    External(PathBuf),
}

impl RulesetDir {
    /// Write the embedded definitions for one ecosystem to a fresh
    /// directory.
    pub fn embedded(ecosystem: Ecosystem) -> Result<Self> {
        let names = rule_names(ecosystem);
        let dir = TempDir::new()?;
        for (name, content) in EMBEDDED_RULES {
            if names.contains(*name) {
                std::fs::write(dir.path().join(format!("{name}.toml")), content)?;
            }
        }
        Ok(Self::Materialized(dir))
    }

    pub fn external(path: PathBuf) -> Self {
        Self::External(path)
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Materialized(dir) => dir.path(),
            Self::External(path) => path,
        }
    }

    /// Definition file for one rule name; the file may not exist.
    pub fn rule_file(&self, rule: &str) -> PathBuf {
        self.path().join(format!("{rule}.toml"))
    }
}

/// Rule names found in an external ruleset directory (`*.toml` stems).
pub fn list_rules_in_dir(dir: &Path) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("toml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.insert(stem.to_string());
            }
        }
    }
    Ok(names)
}
