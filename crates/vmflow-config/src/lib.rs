//! Build file handling for vmflow
//!
//! A build is described by one YAML file. [`find_build_file`] locates it,
//! [`load`] parses it, applies environment overrides, reads cloud-init
//! payloads from disk and validates the result into a [`BuildConfig`].

pub mod error;
pub mod file;
pub mod loader;

pub use error::*;
pub use file::{BuildFile, ClusterSection, CloudInitEntry, CommunicatorConfig, CommunicatorKind, VmSection};
pub use loader::{BuildConfig, load, load_str};

use std::path::PathBuf;

pub const CONFIG_PATH_ENV: &str = "VMFLOW_CONFIG_PATH";

const CANDIDATES: [&str; 4] = [
    "vmflow.local.yaml",
    ".vmflow.local.yaml",
    "vmflow.yaml",
    ".vmflow.yaml",
];

/// Locate the build file
///
/// Search order:
/// 1. `VMFLOW_CONFIG_PATH`
/// 2. current directory: vmflow.local.yaml, .vmflow.local.yaml, vmflow.yaml, .vmflow.yaml
/// 3. the same names under `./.vmflow/`
/// 4. `~/.config/vmflow/vmflow.yaml`
pub fn find_build_file() -> Result<PathBuf> {
    // 1. explicit path
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::debug!(path = %path.display(), "VMFLOW_CONFIG_PATH does not exist, searching");
    }

    let current_dir = std::env::current_dir()?;

    // 2. current directory
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    // 3. ./.vmflow/
    let local_dir = current_dir.join(".vmflow");
    if local_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = local_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    // 4. global
    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("vmflow").join("vmflow.yaml");
        if global.exists() {
            return Ok(global);
        }
    }

    Err(ConfigError::BuildFileNotFound)
}
