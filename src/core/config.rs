use crate::core::error::{ConfigError, ResultExt, VcsError, VcsResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for polyvcs
/// Searched in order: polyvcs.toml, .polyvcs.toml, .config/polyvcs.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VcsConfig {
  #[serde(default)]
  pub git: BackendConfig,
  #[serde(default)]
  pub hg: BackendConfig,
  #[serde(default)]
  pub exec: ExecConfig,
}

/// Which implementation strategy serves a VCS type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
  /// In-process library (gix for git, the revlog reader for hg)
  #[default]
  Native,
  /// Shell out to the command-line tool
  Cmd,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
  #[serde(default)]
  pub backend: BackendKind,

  /// Executable name or path (default: "git" / "hg")
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub binary: Option<String>,
}

impl BackendConfig {
  fn validate(&self, table: &str) -> VcsResult<()> {
    if let Some(binary) = &self.binary
      && binary.trim().is_empty()
    {
      return Err(VcsError::Config(ConfigError::Invalid {
        field: format!("{}.binary", table),
        message: "must not be empty".to_string(),
      }));
    }
    Ok(())
  }
}

/// Subprocess limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecConfig {
  /// Seconds before a subprocess is killed (0 = no limit)
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
  300
}

impl Default for ExecConfig {
  fn default() -> Self {
    Self {
      timeout_secs: default_timeout_secs(),
    }
  }
}

impl ExecConfig {
  pub fn timeout(&self) -> Option<Duration> {
    (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
  }
}

impl VcsConfig {
  /// Find config file in search order
  pub fn find_config_path(path: &Path) -> Option<PathBuf> {
    let candidates = [
      path.join("polyvcs.toml"),
      path.join(".polyvcs.toml"),
      path.join(".config").join("polyvcs.toml"),
    ];

    candidates.into_iter().find(|p| p.exists())
  }

  /// Load config from the first candidate file, or defaults when none exists
  pub fn load(path: &Path) -> VcsResult<Self> {
    let Some(config_path) = Self::find_config_path(path) else {
      return Ok(Self::default());
    };

    let content = fs::read_to_string(&config_path)
      .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
    let config: VcsConfig = toml_edit::de::from_str(&content).map_err(|e| {
      VcsError::Config(ConfigError::Parse {
        path: config_path.clone(),
        message: e.to_string(),
      })
    })?;

    config.validate()?;
    Ok(config)
  }

  /// Save config to polyvcs.toml (default location)
  pub fn save(&self, path: &Path) -> VcsResult<()> {
    let config_path = path.join("polyvcs.toml");
    let content = toml_edit::ser::to_string_pretty(self).context("Failed to serialize config to TOML")?;
    fs::write(&config_path, content).with_context(|| format!("Failed to write config to {}", config_path.display()))?;
    Ok(())
  }

  pub fn validate(&self) -> VcsResult<()> {
    self.git.validate("git")?;
    self.hg.validate("hg")?;
    Ok(())
  }

  pub fn git_binary(&self) -> &str {
    self.git.binary.as_deref().unwrap_or("git")
  }

  pub fn hg_binary(&self) -> &str {
    self.hg.binary.as_deref().unwrap_or("hg")
  }
}
