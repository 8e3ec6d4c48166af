use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error(
        "Config file not found. Looked in:\n\
        - current directory: siteflow.local.yaml, .siteflow.local.yaml, siteflow.yaml, .siteflow.yaml\n\
        - ./.siteflow/\n\
        - ~/.config/siteflow/siteflow.yaml\n\
        Set SITEFLOW_CONFIG_PATH to point at a file directly"
    )]
    ConfigFileNotFound,

    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Unknown environment `{name}` (available: {})", .available.join(", "))]
    UnknownEnvironment { name: String, available: Vec<String> },

    #[error(
        "Environment not specified. Pass it as an argument or set SITEFLOW_ENV (available: {})",
        .available.join(", ")
    )]
    EnvironmentRequired { available: Vec<String> },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
