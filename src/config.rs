//! Layered runtime configuration.
//!
//! Built-in defaults, then an optional TOML file, then the environment and
//! command-line flags (applied by `cli::build_config`).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_DIR: &str = "pricing-wizard";
pub const API_KEY_ENV: &str = "PRICING_WIZARD_API_KEY";

#[derive(Debug, Clone, PartialEq)]
pub struct WizardConfig {
    /// Program used to run every computation script.
    pub interpreter: String,
    /// Directory holding the computation scripts.
    pub scripts_dir: PathBuf,
    /// Sampler reads requested from the pricing solver.
    pub num_reads: u32,
    /// Rows per page on the results table.
    pub page_size: usize,
    /// Deadline for a single computation. `None` waits indefinitely.
    pub computation_timeout: Option<Duration>,
    pub log_file: Option<PathBuf>,
    pub api_key: Option<String>,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            interpreter: "python".into(),
            scripts_dir: PathBuf::from("."),
            num_reads: 10,
            page_size: 10,
            computation_timeout: None,
            log_file: None,
            api_key: None,
        }
    }
}

/// On-disk shape; every field is optional and overrides the default when set.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub interpreter: Option<String>,
    pub scripts_dir: Option<PathBuf>,
    pub num_reads: Option<u32>,
    pub page_size: Option<usize>,
    #[serde(with = "humantime_serde")]
    pub computation_timeout: Option<Duration>,
    pub log_file: Option<PathBuf>,
    pub api_key: Option<String>,
}

impl ConfigFile {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid config file")
    }

    pub fn apply(self, cfg: &mut WizardConfig) {
        if let Some(v) = self.interpreter {
            cfg.interpreter = v;
        }
        if let Some(v) = self.scripts_dir {
            cfg.scripts_dir = v;
        }
        if let Some(v) = self.num_reads {
            cfg.num_reads = v;
        }
        if let Some(v) = self.page_size {
            cfg.page_size = v;
        }
        if self.computation_timeout.is_some() {
            cfg.computation_timeout = self.computation_timeout;
        }
        if self.log_file.is_some() {
            cfg.log_file = self.log_file;
        }
        if self.api_key.is_some() {
            cfg.api_key = self.api_key;
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}

pub fn default_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
        .join("wizard.log")
}

/// Load defaults plus the config file. An explicit path must exist; the
/// default location is optional.
pub fn load(explicit: Option<&Path>) -> Result<WizardConfig> {
    let mut cfg = WizardConfig::default();
    let file = match explicit {
        Some(path) => Some(read_file(path)?),
        None => match default_config_path() {
            Some(path) if path.exists() => Some(read_file(&path)?),
            _ => None,
        },
    };
    if let Some(file) = file {
        file.apply(&mut cfg);
    }
    if cfg.page_size == 0 {
        anyhow::bail!("page_size must be at least 1");
    }
    Ok(cfg)
}

fn read_file(path: &Path) -> Result<ConfigFile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    ConfigFile::parse(&text).with_context(|| format!("in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_overrides_only_what_it_sets() {
        let file = ConfigFile::parse(
            r#"
            interpreter = "python3"
            computation_timeout = "10m"
            "#,
        )
        .unwrap();
        let mut cfg = WizardConfig::default();
        file.apply(&mut cfg);
        assert_eq!(cfg.interpreter, "python3");
        assert_eq!(cfg.computation_timeout, Some(Duration::from_secs(600)));
        assert_eq!(cfg.num_reads, 10);
        assert_eq!(cfg.scripts_dir, PathBuf::from("."));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(ConfigFile::parse("num_read = 3").is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "scripts_dir = \"/srv/qap/scripts\"\npage_size = 25\n").unwrap();
        let cfg = load(Some(&path)).unwrap();
        assert_eq!(cfg.scripts_dir, PathBuf::from("/srv/qap/scripts"));
        assert_eq!(cfg.page_size, 25);
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "page_size = 0\n").unwrap();
        assert!(load(Some(&path)).is_err());
    }
}
