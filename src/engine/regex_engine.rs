//! Built-in pattern engine: line-oriented regex matching driven by TOML
//! rule definition files.
//!
//! A definition file looks like:
//!
//! ```toml
//! description = "Execution of base64-decoded data"
//! extensions = ["py"]
//! patterns = ['(?:exec|eval)\s*\(.*b64decode']
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use regex::Regex;
use serde::Deserialize;

use super::{PatternEngine, RawFinding};
use crate::error::{Result, ShieldError};

#[derive(Debug, Deserialize)]
struct RuleDef {
    /// File extensions the rule applies to; empty means every file.
    #[serde(default)]
    extensions: Vec<String>,
    patterns: Vec<String>,
}

struct CompiledRule {
    id: String,
    extensions: BTreeSet<String>,
    patterns: Vec<Regex>,
}

impl CompiledRule {
    fn applies_to(&self, extension: Option<&str>) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        extension.is_some_and(|ext| self.extensions.contains(ext))
    }
}

#[derive(Default)]
pub struct RegexEngine;

impl RegexEngine {
    fn load_rules(rule_path: &Path) -> Result<Vec<CompiledRule>> {
        if rule_path.is_dir() {
            let mut rules = Vec::new();
            for entry in walkdir::WalkDir::new(rule_path)
                .max_depth(1)
                .sort_by_file_name()
            {
                let entry = entry.map_err(|e| ShieldError::Engine(e.to_string()))?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("toml") {
                    rules.push(Self::compile(path)?);
                }
            }
            Ok(rules)
        } else if rule_path.is_file() {
            Ok(vec![Self::compile(rule_path)?])
        } else {
            Err(ShieldError::Engine(format!(
                "rule definition path {} does not exist",
                rule_path.display()
            )))
        }
    }

    fn compile(path: &Path) -> Result<CompiledRule> {
        let definition_error = |message: String| ShieldError::RuleDefinition {
            file: path.display().to_string(),
            message,
        };

        let content =
            std::fs::read_to_string(path).map_err(|e| definition_error(e.to_string()))?;
        let def: RuleDef =
            toml::from_str(&content).map_err(|e| definition_error(e.to_string()))?;

        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| definition_error("definition file has no usable name".into()))?
            .to_string();

        let patterns = def
            .patterns
            .iter()
            .map(|p| Regex::new(p).map_err(|e| definition_error(e.to_string())))
            .collect::<Result<Vec<_>>>()?;

        Ok(CompiledRule {
            id,
            extensions: def.extensions.into_iter().collect(),
            patterns,
        })
    }

    fn walk(target: &Path, exclude: &[String]) -> Result<Vec<PathBuf>> {
        let mut overrides = OverrideBuilder::new(target);
        for pattern in exclude {
            overrides
                .add(&format!("!{pattern}"))
                .map_err(|e| ShieldError::Engine(e.to_string()))?;
        }
        let overrides = overrides
            .build()
            .map_err(|e| ShieldError::Engine(e.to_string()))?;

        let walker = WalkBuilder::new(target)
            .hidden(false)
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .overrides(overrides)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| ShieldError::Engine(e.to_string()))?;
            if entry.file_type().is_some_and(|t| t.is_file()) {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }
}

impl PatternEngine for RegexEngine {
    fn invoke(
        &self,
        rule_path: &Path,
        targets: &[PathBuf],
        exclude: &[String],
    ) -> Result<Vec<RawFinding>> {
        let rules = Self::load_rules(rule_path)?;
        let mut findings = Vec::new();

        for target in targets {
            for file in Self::walk(target, exclude)? {
                let extension = file.extension().and_then(|e| e.to_str());
                let applicable: Vec<&CompiledRule> = rules
                    .iter()
                    .filter(|rule| rule.applies_to(extension))
                    .collect();
                if applicable.is_empty() {
                    continue;
                }

                // Binary or non-UTF-8 content is skipped, not fatal.
                let Ok(content) = std::fs::read_to_string(&file) else {
                    tracing::debug!(file = %file.display(), "skipping unreadable file");
                    continue;
                };

                for (index, line) in content.lines().enumerate() {
                    for rule in &applicable {
                        if rule.patterns.iter().any(|p| p.is_match(line)) {
                            findings.push(RawFinding {
                                rule_id: rule.id.clone(),
                                file: file.clone(),
                                line: index + 1,
                                matched: line.trim_end().to_string(),
                            });
                        }
                    }
                }
            }
        }

        findings.sort_by(|a, b| {
            (&a.rule_id, &a.file, a.line).cmp(&(&b.rule_id, &b.file, b.line))
        });
        Ok(findings)
    }
}
