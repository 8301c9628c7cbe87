pub mod console;
pub mod json;
pub mod sarif;

use serde::{Deserialize, Serialize};

use crate::analyzer::{PackageReport, ProjectReport};
use crate::error::Result;

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Console,
    Json,
    Sarif,
}

impl OutputFormat {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "console" | "text" => Some(Self::Console),
            "json" => Some(Self::Json),
            "sarif" => Some(Self::Sarif),
            _ => None,
        }
    }
}

/// Render a single package scan in the specified format.
pub fn render_package(
    identifier: &str,
    report: &PackageReport,
    format: OutputFormat,
) -> Result<String> {
    match format {
        OutputFormat::Console => Ok(console::render_package(identifier, report)),
        OutputFormat::Json => json::render_package(identifier, report),
        OutputFormat::Sarif => sarif::render_package(identifier, report),
    }
}

/// Render a manifest scan in the specified format.
pub fn render_project(
    manifest: &str,
    report: &ProjectReport,
    format: OutputFormat,
) -> Result<String> {
    match format {
        OutputFormat::Console => Ok(console::render_project(report)),
        OutputFormat::Json => json::render_project(manifest, report),
        OutputFormat::Sarif => sarif::render_project(manifest, report),
    }
}
