//! Turning a build file into a ready-to-run configuration

use crate::error::{ConfigError, Result};
use crate::file::{BuildFile, CloudInitEntry, CommunicatorConfig, CommunicatorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vmflow_api::{CloudInitFile, ClusterConnection, VmSpec, gb_to_bytes};
use vmflow_builder::BuildSettings;

pub const ENDPOINT_ENV: &str = "VMFLOW_ENDPOINT";
pub const USERNAME_ENV: &str = "VMFLOW_USERNAME";
pub const PASSWORD_ENV: &str = "VMFLOW_PASSWORD";

const OS_FAMILIES: [&str; 4] = ["linux", "windows", "freebsd", "other"];

/// A validated build file
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub connection: ClusterConnection,
    /// Cloud-init payloads already read from disk
    pub vm: VmSpec,
    pub communicator: CommunicatorConfig,
    pub provision: Vec<String>,
    pub shutdown_command: Option<String>,
    pub settings: BuildSettings,
    /// Non-fatal findings of validation
    pub warnings: Vec<String>,
    pub source: Option<PathBuf>,
}

impl BuildConfig {
    pub fn uses_ssh(&self) -> bool {
        self.communicator.kind() == CommunicatorKind::Ssh
    }
}

/// Load and validate the build file at `path`
pub fn load(path: &Path) -> Result<BuildConfig> {
    let contents = std::fs::read_to_string(path)?;
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let file: BuildFile = serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let mut config = resolve(file, &base_dir)?;
    config.source = Some(path.to_path_buf());
    tracing::debug!(path = %path.display(), vm = %config.vm.name, "build file loaded");
    Ok(config)
}

/// Load from YAML text; cloud-init files resolve against `base_dir`
pub fn load_str(contents: &str, base_dir: &Path) -> Result<BuildConfig> {
    let file: BuildFile = serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: PathBuf::from("<inline>"),
        source,
    })?;
    resolve(file, base_dir)
}

fn resolve(mut file: BuildFile, base_dir: &Path) -> Result<BuildConfig> {
    apply_env_overrides(&mut file);

    let mut warnings = Vec::new();
    validate(&file, &mut warnings)?;

    let cluster = &file.cluster;
    let mut connection = ClusterConnection::new(
        cluster.endpoint.clone().unwrap_or_default(),
        cluster.username.clone().unwrap_or_default(),
        cluster.password.clone().unwrap_or_default(),
    )
    .with_insecure(cluster.insecure);
    if let Some(port) = cluster.port {
        connection = connection.with_port(port);
    }
    if let Some(secs) = cluster.request_timeout_secs {
        connection.request_timeout_secs = secs;
    }

    let settings = BuildSettings {
        power_on_timeout: Duration::from_secs(file.power_on_timeout_secs),
        ip_wait_timeout: Duration::from_secs(file.ip_wait_timeout_secs),
        ip_settle_window: Duration::from_secs(file.ip_settle_timeout_secs),
        shutdown_timeout: Duration::from_secs(file.shutdown_timeout_secs),
        ..BuildSettings::default()
    };

    let mut vm = file.vm.spec;
    vm.cloud_init_files = load_cloud_init(&file.vm.cloud_init_files, base_dir)?;

    for warning in &warnings {
        tracing::warn!("{}", warning);
    }

    Ok(BuildConfig {
        connection,
        vm,
        communicator: file.communicator,
        provision: file.provision,
        shutdown_command: file.shutdown_command,
        settings,
        warnings,
        source: None,
    })
}

fn apply_env_overrides(file: &mut BuildFile) {
    let env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

    if let Some(endpoint) = env(ENDPOINT_ENV) {
        file.cluster.endpoint = Some(endpoint);
    }
    if let Some(username) = env(USERNAME_ENV) {
        file.cluster.username = Some(username);
    }
    if let Some(password) = env(PASSWORD_ENV) {
        file.cluster.password = Some(password);
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

fn validate(file: &BuildFile, warnings: &mut Vec<String>) -> Result<()> {
    let mut errors = Vec::new();

    if is_blank(&file.cluster.endpoint) {
        errors.push(format!("cluster.endpoint is required (or set {})", ENDPOINT_ENV));
    }
    if is_blank(&file.cluster.username) {
        errors.push(format!("cluster.username is required (or set {})", USERNAME_ENV));
    }
    if is_blank(&file.cluster.password) {
        errors.push(format!("cluster.password is required (or set {})", PASSWORD_ENV));
    }

    let vm = &file.vm.spec;
    if vm.name.trim().is_empty() {
        errors.push("vm.name is required".to_string());
    }
    if let Some(family) = &vm.os_family {
        if !OS_FAMILIES.contains(&family.to_lowercase().as_str()) {
            errors.push(format!(
                "vm.os_family '{}' must be one of {}",
                family,
                OS_FAMILIES.join(", ")
            ));
        }
    }
    for disk in &vm.disks {
        if disk.is_import() && disk.media_source.is_none() {
            errors.push(format!("disk '{}': import media requires media_source", disk.name));
        }
        if let Some(gb) = disk.size_gb {
            if gb_to_bytes(gb).is_none() {
                errors.push(format!("disk '{}': disksize {}GB is out of range", disk.name, gb));
            }
        }
    }
    if vm.nics.is_empty() {
        warnings.push("no NICs configured; the VM will have no network".to_string());
    }

    for entry in &file.vm.cloud_init_files {
        if entry.contents.is_some() && entry.files.is_some() {
            errors.push(format!(
                "cloud-init file '{}': contents and files are mutually exclusive",
                entry.name
            ));
        }
    }

    if file.communicator.kind() == CommunicatorKind::Ssh && is_blank(&file.communicator.username) {
        errors.push("communicator.username is required for ssh".to_string());
    }

    let timeouts = [
        ("power_on_timeout_secs", file.power_on_timeout_secs),
        ("ip_wait_timeout_secs", file.ip_wait_timeout_secs),
        ("ip_settle_timeout_secs", file.ip_settle_timeout_secs),
        ("shutdown_timeout_secs", file.shutdown_timeout_secs),
        ("communicator.connect_timeout_secs", file.communicator.connect_timeout_secs),
    ];
    for (name, value) in timeouts {
        if value == 0 {
            errors.push(format!("{} must be greater than zero", name));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(errors))
    }
}

fn load_cloud_init(entries: &[CloudInitEntry], base_dir: &Path) -> Result<Vec<CloudInitFile>> {
    let mut loaded = Vec::new();

    for entry in entries {
        let contents = match (&entry.contents, &entry.files) {
            (Some(contents), _) => contents.clone(),
            (None, Some(files)) => {
                let mut parts = Vec::with_capacity(files.len());
                for file in files {
                    let path = if file.is_absolute() {
                        file.clone()
                    } else {
                        base_dir.join(file)
                    };
                    let part = std::fs::read_to_string(&path).map_err(|source| {
                        ConfigError::CloudInitRead {
                            name: entry.name.clone(),
                            path: path.clone(),
                            source,
                        }
                    })?;
                    parts.push(part);
                }
                parts.join("\n")
            }
            (None, None) => {
                tracing::debug!(name = %entry.name, "cloud-init entry has no contents, skipped");
                continue;
            }
        };

        if contents.trim().is_empty() {
            return Err(ConfigError::CloudInitEmpty(entry.name.clone()));
        }
        loaded.push(CloudInitFile::new(entry.name.clone(), contents));
    }

    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    const CLUSTER: &str = r#"
cluster:
  endpoint: verge.example.com
  username: admin
  password: secret
"#;

    fn without_env<T>(f: impl FnOnce() -> T) -> T {
        temp_env::with_vars_unset([ENDPOINT_ENV, USERNAME_ENV, PASSWORD_ENV], f)
    }

    fn validation_errors(result: Result<BuildConfig>) -> Vec<String> {
        match result {
            Err(ConfigError::Validation(errors)) => errors,
            other => panic!("expected validation error, got {:?}", other.map(|c| c.vm.name)),
        }
    }

    #[test]
    #[serial]
    fn test_minimal_file() {
        let yaml = format!("{}vm:\n  name: web\n  nics:\n    - name: lan0\n      vnet: 1\n", CLUSTER);
        let config = without_env(|| load_str(&yaml, Path::new("."))).unwrap();

        assert_eq!(config.vm.name, "web");
        assert_eq!(config.connection.endpoint, "verge.example.com");
        assert_eq!(config.connection.port, 443);
        assert_eq!(config.connection.request_timeout_secs, 5);
        assert_eq!(config.settings.power_on_timeout, Duration::from_secs(120));
        assert_eq!(config.settings.ip_settle_window, Duration::from_secs(30));
        assert!(!config.uses_ssh());
        assert!(config.warnings.is_empty());
    }

    #[test]
    #[serial]
    fn test_env_overrides_credentials() {
        let yaml = "cluster:\n  endpoint: file.example.com\nvm:\n  name: web\n";
        let config = temp_env::with_vars(
            [
                (ENDPOINT_ENV, Some("env.example.com")),
                (USERNAME_ENV, Some("ops")),
                (PASSWORD_ENV, Some("hunter2")),
            ],
            || load_str(yaml, Path::new(".")),
        )
        .unwrap();

        assert_eq!(config.connection.endpoint, "env.example.com");
        assert_eq!(config.connection.username, "ops");
        assert_eq!(config.connection.password, "hunter2");
    }

    #[test]
    #[serial]
    fn test_validation_aggregates_errors() {
        let yaml = r#"
vm:
  os_family: beos
  disks:
    - name: root
      media: import
communicator:
  type: ssh
shutdown_timeout_secs: 0
"#;
        let errors = validation_errors(without_env(|| load_str(yaml, Path::new("."))));

        assert_eq!(errors.len(), 8, "{:#?}", errors);
        assert!(errors.iter().any(|e| e.contains("cluster.endpoint")));
        assert!(errors.iter().any(|e| e.contains("vm.name")));
        assert!(errors.iter().any(|e| e.contains("beos")));
        assert!(errors.iter().any(|e| e.contains("media_source")));
        assert!(errors.iter().any(|e| e.contains("communicator.username")));
        assert!(errors.iter().any(|e| e.contains("shutdown_timeout_secs")));
    }

    #[test]
    #[serial]
    fn test_oversized_disk_is_rejected() {
        let yaml = format!(
            "{}vm:\n  name: web\n  disks:\n    - name: data\n      media: disk\n      disksize: 20000000000\n",
            CLUSTER
        );
        let errors = validation_errors(without_env(|| load_str(&yaml, Path::new("."))));
        assert_eq!(errors.len(), 1, "{:#?}", errors);
        assert!(errors[0].contains("disk 'data'"));
        assert!(errors[0].contains("out of range"));
    }

    #[test]
    #[serial]
    fn test_unknown_media_is_a_parse_error() {
        let yaml = format!("{}vm:\n  name: web\n  disks:\n    - name: a\n      media: floppy\n", CLUSTER);
        let err = without_env(|| load_str(&yaml, Path::new("."))).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    #[serial]
    fn test_missing_nics_is_a_warning() {
        let yaml = format!("{}vm:\n  name: web\n", CLUSTER);
        let config = without_env(|| load_str(&yaml, Path::new("."))).unwrap();
        assert_eq!(config.warnings.len(), 1);
        assert!(config.warnings[0].contains("no NICs"));
    }

    #[test]
    #[serial]
    fn test_cloud_init_files_are_joined() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir(temp.path().join("ci")).unwrap();
        fs::write(temp.path().join("ci/base.yaml"), "#cloud-config").unwrap();
        fs::write(temp.path().join("ci/users.yaml"), "users: []").unwrap();
        let path = temp.path().join("vmflow.yaml");
        fs::write(
            &path,
            format!(
                "{}vm:\n  name: web\n  cloud_init_files:\n    - name: user-data\n      files: [ci/base.yaml, ci/users.yaml]\n    - name: meta-data\n      contents: \"instance-id: web\"\n    - name: vendor-data\n",
                CLUSTER
            ),
        )
        .unwrap();

        let config = without_env(|| load(&path)).unwrap();

        assert_eq!(config.source.as_deref(), Some(path.as_path()));
        assert_eq!(
            config.vm.cloud_init_files,
            vec![
                CloudInitFile::new("user-data", "#cloud-config\nusers: []"),
                CloudInitFile::new("meta-data", "instance-id: web"),
            ]
        );
    }

    #[test]
    #[serial]
    fn test_cloud_init_conflict_and_empty() {
        let yaml = format!(
            "{}vm:\n  name: web\n  cloud_init_files:\n    - name: user-data\n      contents: x\n      files: [a]\n",
            CLUSTER
        );
        let errors = validation_errors(without_env(|| load_str(&yaml, Path::new("."))));
        assert!(errors[0].contains("mutually exclusive"));

        let yaml = format!(
            "{}vm:\n  name: web\n  cloud_init_files:\n    - name: user-data\n      contents: \"  \"\n",
            CLUSTER
        );
        let err = without_env(|| load_str(&yaml, Path::new("."))).unwrap_err();
        assert!(matches!(err, ConfigError::CloudInitEmpty(name) if name == "user-data"));
    }

    #[test]
    #[serial]
    fn test_missing_cloud_init_file() {
        let temp = tempfile::tempdir().unwrap();
        let yaml = format!(
            "{}vm:\n  name: web\n  cloud_init_files:\n    - name: user-data\n      files: [missing.yaml]\n",
            CLUSTER
        );
        let err = without_env(|| load_str(&yaml, temp.path())).unwrap_err();
        match err {
            ConfigError::CloudInitRead { name, path, .. } => {
                assert_eq!(name, "user-data");
                assert!(path.ends_with("missing.yaml"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
