//! Pattern-matching engine boundary.
//!
//! The dispatch engine treats pattern matching as an external collaborator:
//! given a rule definition file (or a directory of them) and target paths,
//! it returns raw findings. [`regex_engine::RegexEngine`] is the built-in
//! implementation; tests substitute their own.

pub mod regex_engine;

use std::path::{Path, PathBuf};

use crate::error::Result;

pub use regex_engine::RegexEngine;

/// One concrete match produced by the engine. Paths are absolute; callers
/// normalize them relative to the scanned root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFinding {
    /// Identifier of the rule that matched (definition file stem).
    pub rule_id: String,
    pub file: PathBuf,
    /// 1-based line number of the match.
    pub line: usize,
    /// The matched source line.
    pub matched: String,
}

/// A static pattern matcher. Read-only and deterministic: identical rule
/// definitions and targets produce identical findings.
pub trait PatternEngine: Send + Sync {
    /// Run the rules at `rule_path` (one definition file, or a directory of
    /// them) over `targets`, skipping anything matching `exclude` patterns.
    fn invoke(
        &self,
        rule_path: &Path,
        targets: &[PathBuf],
        exclude: &[String],
    ) -> Result<Vec<RawFinding>>;
}
