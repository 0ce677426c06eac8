use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "build file not found. Looked in:\n\
        - current directory: vmflow.local.yaml, .vmflow.local.yaml, vmflow.yaml, .vmflow.yaml\n\
        - ./.vmflow/ directory\n\
        - ~/.config/vmflow/vmflow.yaml\n\
        Set VMFLOW_CONFIG_PATH or pass --config to point at one directly"
    )]
    BuildFileNotFound,

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid build file:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),

    #[error("cloud-init file '{name}': cannot read {path}: {source}")]
    CloudInitRead {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cloud-init file '{0}' resolved to empty contents")]
    CloudInitEmpty(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
