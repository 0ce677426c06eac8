pub mod build;
pub mod networks;
pub mod validate;
pub mod vms;

use colored::Colorize;
use std::path::{Path, PathBuf};
use vmflow_api::VergeGateway;
use vmflow_config::BuildConfig;

/// `--config` if given, otherwise the discovered build file
pub fn resolve_config_path(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(vmflow_config::find_build_file()?),
    }
}

pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<BuildConfig> {
    let path = resolve_config_path(explicit)?;
    eprintln!("build file: {}", path.display().to_string().cyan());
    Ok(vmflow_config::load(&path)?)
}

pub fn gateway(config: &BuildConfig) -> anyhow::Result<VergeGateway> {
    Ok(VergeGateway::new(&config.connection)?)
}
