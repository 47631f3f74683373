//! lv_config - Configuration parsing and validation for lvstat
//!
//! This crate provides:
//! - The `LvConfig` TOML schema with defaults
//! - Config file discovery
//! - Environment variable overrides
//! - Validation of collector settings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Default libvirt connection URI
pub const DEFAULT_URI: &str = "qemu:///system";

/// File name looked up in the working directory
const LOCAL_CONFIG_FILE: &str = "lvstat.toml";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LvConfig {
    pub libvirt: LibvirtConfig,

    /// Run virsh on another host over SSH instead of locally
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteConfig>,
}

/// Settings for the libvirt collector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LibvirtConfig {
    /// Connection URI passed to `virsh -c`
    pub uri: String,

    /// virsh binary name or path
    pub virsh_path: String,

    /// Subcommand used to dump per-domain statistics
    pub stats_command: String,

    /// Per-invocation timeout
    pub timeout_secs: u64,

    /// Maximum number of domains fetched concurrently
    pub max_concurrency: usize,
}

impl Default for LibvirtConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            virsh_path: "virsh".to_string(),
            stats_command: "domstats".to_string(),
            timeout_secs: 10,
            max_concurrency: 4,
        }
    }
}

impl LibvirtConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// SSH target for remote execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    pub host: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
}

impl LvConfig {
    /// Load config from an explicit path
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!(path = %path.display(), "Loading config");
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load the first config file found in `config_paths()`, or defaults
    pub fn discover() -> Result<Self, ConfigError> {
        for path in Self::config_paths() {
            if path.is_file() {
                return Self::load(&path);
            }
        }
        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load from path, then apply `LVSTAT_*` environment overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Discover config, then apply `LVSTAT_*` environment overrides
    pub fn discover_with_env() -> Result<Self, ConfigError> {
        let mut config = Self::discover()?;
        config.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Candidate config locations, in lookup order
    pub fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("lvstat").join("config.toml"));
        }
        paths
    }

    /// Apply overrides from an environment lookup function
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup("LVSTAT_URI") {
            self.libvirt.uri = uri;
        }
        if let Some(cmd) = lookup("LVSTAT_STATS_COMMAND") {
            self.libvirt.stats_command = cmd;
        }
        if let Some(raw) = lookup("LVSTAT_TIMEOUT_SECS") {
            self.libvirt.timeout_secs = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("LVSTAT_TIMEOUT_SECS is not a number: {raw}"))
            })?;
        }
        if let Some(raw) = lookup("LVSTAT_MAX_CONCURRENCY") {
            self.libvirt.max_concurrency = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("LVSTAT_MAX_CONCURRENCY is not a number: {raw}"))
            })?;
        }
        self.validate()
    }

    /// Check settings that would make collection impossible
    pub fn validate(&self) -> Result<(), ConfigError> {
        let lv = &self.libvirt;
        if lv.uri.trim().is_empty() {
            return Err(ConfigError::Invalid("libvirt.uri must not be empty".into()));
        }
        if lv.virsh_path.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "libvirt.virsh_path must not be empty".into(),
            ));
        }
        if lv.stats_command.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "libvirt.stats_command must not be empty".into(),
            ));
        }
        if lv.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "libvirt.timeout_secs must be at least 1".into(),
            ));
        }
        if lv.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "libvirt.max_concurrency must be at least 1".into(),
            ));
        }
        if let Some(remote) = &self.remote
            && (remote.host.is_empty() || remote.user.is_empty())
        {
            return Err(ConfigError::Invalid(
                "remote.host and remote.user are required".into(),
            ));
        }
        Ok(())
    }

    /// Default config rendered as commented TOML
    pub fn generate_default_toml() -> String {
        let body = toml::to_string_pretty(&Self::default()).unwrap_or_default();
        format!(
            "# lvstat configuration\n\
             # Uncomment [remote] to run virsh over SSH:\n\
             # [remote]\n\
             # host = \"hypervisor01\"\n\
             # user = \"root\"\n\n{body}"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = LvConfig::default();
        assert_eq!(config.libvirt.uri, "qemu:///system");
        assert_eq!(config.libvirt.stats_command, "domstats");
        assert_eq!(config.libvirt.timeout(), Duration::from_secs(10));
        assert!(config.remote.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[libvirt]\nuri = \"test:///default\"\nmax_concurrency = 2").unwrap();

        let config = LvConfig::load(file.path()).unwrap();
        assert_eq!(config.libvirt.uri, "test:///default");
        assert_eq!(config.libvirt.max_concurrency, 2);
        assert_eq!(config.libvirt.virsh_path, "virsh");
    }

    #[test]
    fn test_load_remote() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[remote]\nhost = \"hv1\"\nuser = \"ops\"").unwrap();

        let config = LvConfig::load(file.path()).unwrap();
        let remote = config.remote.unwrap();
        assert_eq!(remote.host, "hv1");
        assert_eq!(remote.user, "ops");
        assert!(remote.key_path.is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let err = LvConfig::load(Path::new("/nonexistent/lvstat.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[libvirt\nuri = ").unwrap();
        let err = LvConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = LvConfig::default();
        config.libvirt.max_concurrency = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = LvConfig::default();
        config
            .apply_env_from(env(&[
                ("LVSTAT_URI", "qemu+ssh://hv1/system"),
                ("LVSTAT_TIMEOUT_SECS", "30"),
                ("LVSTAT_STATS_COMMAND", "dominfo"),
            ]))
            .unwrap();
        assert_eq!(config.libvirt.uri, "qemu+ssh://hv1/system");
        assert_eq!(config.libvirt.timeout_secs, 30);
        assert_eq!(config.libvirt.stats_command, "dominfo");
        assert_eq!(config.libvirt.max_concurrency, 4);
    }

    #[test]
    fn test_env_override_not_a_number() {
        let mut config = LvConfig::default();
        let err = config
            .apply_env_from(env(&[("LVSTAT_MAX_CONCURRENCY", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("LVSTAT_MAX_CONCURRENCY"));
    }

    #[test]
    fn test_generated_toml_parses_back() {
        let content = LvConfig::generate_default_toml();
        let parsed: LvConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed, LvConfig::default());
    }

    #[test]
    fn test_config_paths_start_local() {
        let paths = LvConfig::config_paths();
        assert_eq!(paths[0], PathBuf::from("lvstat.toml"));
    }

    proptest! {
        #[test]
        fn prop_concurrency_override_validated(n in 0usize..64) {
            let mut config = LvConfig::default();
            let value = n.to_string();
            let result = config.apply_env_from(env(&[("LVSTAT_MAX_CONCURRENCY", value.as_str())]));
            prop_assert_eq!(result.is_ok(), n > 0);
            prop_assert_eq!(config.libvirt.max_concurrency, n);
        }
    }
}
