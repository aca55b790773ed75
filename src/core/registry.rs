//! VCS type name -> opener / cloner
//!
//! The registry is a plain value owned by the application. Registering a
//! second opener or cloner for the same type is an error; swapping one in
//! deliberately goes through `replace_opener` / `replace_cloner`.

use crate::core::config::VcsConfig;
use crate::core::error::{VcsError, VcsResult};
use crate::core::repository::Repository;
use crate::core::types::CloneOptions;
use crate::core::vcs;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

pub type Opener = Box<dyn Fn(&Path) -> VcsResult<Repository> + Send + Sync>;
pub type Cloner = Box<dyn Fn(&str, &Path, &CloneOptions) -> VcsResult<Repository> + Send + Sync>;

#[derive(Default)]
pub struct Registry {
  openers: HashMap<String, Opener>,
  cloners: HashMap<String, Cloner>,
}

impl Registry {
  /// Empty registry
  pub fn new() -> Self {
    Self::default()
  }

  /// Registry with "git" and "hg" wired up as `config` selects
  pub fn with_defaults(config: &VcsConfig) -> VcsResult<Self> {
    let mut registry = Self::new();
    vcs::register_git(&mut registry, config)?;
    vcs::register_hg(&mut registry, config)?;
    Ok(registry)
  }

  pub fn register_opener<F>(&mut self, vcs_type: &str, opener: F) -> VcsResult<()>
  where
    F: Fn(&Path) -> VcsResult<Repository> + Send + Sync + 'static,
  {
    if self.openers.contains_key(vcs_type) {
      return Err(VcsError::invalid_argument(format!(
        "an opener for VCS type '{}' is already registered",
        vcs_type
      )));
    }
    self.openers.insert(vcs_type.to_string(), Box::new(opener));
    Ok(())
  }

  pub fn register_cloner<F>(&mut self, vcs_type: &str, cloner: F) -> VcsResult<()>
  where
    F: Fn(&str, &Path, &CloneOptions) -> VcsResult<Repository> + Send + Sync + 'static,
  {
    if self.cloners.contains_key(vcs_type) {
      return Err(VcsError::invalid_argument(format!(
        "a cloner for VCS type '{}' is already registered",
        vcs_type
      )));
    }
    self.cloners.insert(vcs_type.to_string(), Box::new(cloner));
    Ok(())
  }

  /// Install an opener, returning the one it displaced
  pub fn replace_opener<F>(&mut self, vcs_type: &str, opener: F) -> Option<Opener>
  where
    F: Fn(&Path) -> VcsResult<Repository> + Send + Sync + 'static,
  {
    self.openers.insert(vcs_type.to_string(), Box::new(opener))
  }

  /// Install a cloner, returning the one it displaced
  pub fn replace_cloner<F>(&mut self, vcs_type: &str, cloner: F) -> Option<Cloner>
  where
    F: Fn(&str, &Path, &CloneOptions) -> VcsResult<Repository> + Send + Sync + 'static,
  {
    self.cloners.insert(vcs_type.to_string(), Box::new(cloner))
  }

  pub fn open(&self, vcs_type: &str, dir: &Path) -> VcsResult<Repository> {
    let opener = self.openers.get(vcs_type).ok_or_else(|| VcsError::UnknownVcsType {
      vcs_type: vcs_type.to_string(),
    })?;
    debug!(vcs_type, dir = %dir.display(), "opening repository");
    opener(dir)
  }

  pub fn clone_repo(&self, vcs_type: &str, url: &str, dir: &Path, opt: &CloneOptions) -> VcsResult<Repository> {
    let cloner = self.cloners.get(vcs_type).ok_or_else(|| VcsError::UnknownVcsType {
      vcs_type: vcs_type.to_string(),
    })?;
    debug!(vcs_type, url, dir = %dir.display(), "cloning repository");
    cloner(url, dir, opt)
  }

  /// Registered VCS types, sorted
  pub fn vcs_types(&self) -> Vec<&str> {
    let mut types: Vec<&str> = self.openers.keys().map(String::as_str).collect();
    types.sort_unstable();
    types
  }
}
