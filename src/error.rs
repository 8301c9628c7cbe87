use thiserror::Error;

use crate::registry::RegistryError;

pub type Result<T> = std::result::Result<T, ShieldError>;

#[derive(Error, Debug)]
pub enum ShieldError {
    #[error("Cannot read manifest {file}: {source}")]
    Manifest {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("--rules and --exclude-rules cannot be used together")]
    RuleSelectionConflict,

    #[error("{0} is not a valid rule")]
    UnknownRule(String),

    #[error("{0} is not an existing rule")]
    MissingRuleDefinition(String),

    #[error("Rule definition error in {file}: {message}")]
    RuleDefinition { file: String, message: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Pattern engine error: {0}")]
    Engine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShieldError {
    pub fn exit_code(&self) -> i32 {
        2
    }
}
