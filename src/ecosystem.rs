use serde::{Deserialize, Serialize};

/// Which package index a package belongs to. Each ecosystem carries its own
/// rule catalog and registry client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    PyPi,
    Npm,
}

impl Ecosystem {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pypi" | "pip" | "python" => Some(Self::PyPi),
            "npm" | "node" => Some(Self::Npm),
            _ => None,
        }
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PyPi => write!(f, "pypi"),
            Self::Npm => write!(f, "npm"),
        }
    }
}
