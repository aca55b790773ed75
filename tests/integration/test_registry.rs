//! Registry wiring, backend selection and cloning

use crate::helpers::*;
use anyhow::Result;
use polyvcs::core::vcs::open_git_cmd;
use polyvcs::types::{CloneOptions, CommitId, CommitsOptions};
use polyvcs::{BackendKind, Capabilities, ErrorKind, Registry, VcsConfig};
use std::io::Read;

#[test]
fn test_defaults_select_native_backends() -> Result<()> {
  let (repo, _, c2) = two_commit_repo(Vcs::Git)?;
  let registry = Registry::with_defaults(&VcsConfig::default())?;
  assert_eq!(registry.vcs_types(), vec!["git", "hg"]);

  let handle = registry.open("git", &repo.path)?;
  assert_eq!(handle.vcs_type(), "git");
  assert_eq!(handle.backend(), "git-native");
  assert_eq!(handle.resolve_revision("HEAD")?.as_str(), c2);
  assert!(handle.capabilities().contains(Capabilities::all()));
  Ok(())
}

#[test]
fn test_config_file_selects_cmd_backend() -> Result<()> {
  let (repo, _, _) = two_commit_repo(Vcs::Git)?;
  std::fs::write(
    repo.path.join("polyvcs.toml"),
    "[git]\nbackend = \"cmd\"\n\n[exec]\ntimeout_secs = 30\n",
  )?;
  let config = VcsConfig::load(&repo.path)?;
  assert_eq!(config.git.backend, BackendKind::Cmd);

  let registry = Registry::with_defaults(&config)?;
  assert_eq!(registry.open("git", &repo.path)?.backend(), "git-cmd");
  Ok(())
}

#[test]
fn test_unknown_type_and_duplicates() -> Result<()> {
  let mut registry = Registry::with_defaults(&VcsConfig::default())?;
  let dir = tempfile::TempDir::new()?;

  let err = registry.open("svn", dir.path()).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Unsupported);
  assert!(err.to_string().contains("svn"));

  let err = registry
    .register_opener("git", |dir| open_git_cmd(dir, &VcsConfig::default()))
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidArgument);

  let previous = registry.replace_opener("git", |dir| open_git_cmd(dir, &VcsConfig::default()));
  assert!(previous.is_some());
  Ok(())
}

#[test]
fn test_open_errors() -> Result<()> {
  let dir = tempfile::TempDir::new()?;
  let registry = Registry::with_defaults(&VcsConfig::default())?;
  assert!(registry.open("git", dir.path()).is_err());

  let mut config = VcsConfig::default();
  config.git.backend = BackendKind::Cmd;
  let registry = Registry::with_defaults(&config)?;
  assert!(registry.open("git", dir.path()).is_err());
  assert!(registry.open("git", &dir.path().join("missing")).is_err());
  Ok(())
}

#[test]
fn test_clone_commit_read_back() -> Result<()> {
  let mut kinds = vec![Vcs::Git];
  if has_hg() {
    kinds.push(Vcs::Hg);
  }

  for vcs in kinds {
    let (origin, _, _) = two_commit_repo(vcs)?;
    let vcs_type = match vcs {
      Vcs::Git => "git",
      Vcs::Hg => "hg",
    };
    let registry = Registry::with_defaults(&VcsConfig::default())?;
    let clone_dir = origin.scratch("clone");
    let url = origin.path.display().to_string();
    let cloned = registry.clone_repo(vcs_type, &url, &clone_dir, &CloneOptions::default())?;
    assert_eq!(cloned.vcs_type(), vcs_type);

    let content = "round trip\n\u{00e9}\0binary tail";
    std::fs::write(clone_dir.join("new.bin"), content)?;
    let id = match vcs {
      Vcs::Git => {
        git(&clone_dir, &["add", "new.bin"])?;
        git(&clone_dir, &["commit", "--quiet", "-m", "add new.bin"])?;
        String::from_utf8_lossy(&git(&clone_dir, &["rev-parse", "HEAD"])?.stdout).trim().to_string()
      }
      Vcs::Hg => {
        hg(&clone_dir, &["commit", "-A", "-m", "add new.bin", "-d", "0 0"])?;
        String::from_utf8_lossy(&hg(&clone_dir, &["log", "-r", ".", "--template", "{node}"])?.stdout).to_string()
      }
    };

    let reopened = registry.open(vcs_type, &clone_dir)?;
    let log = reopened.commits(&CommitsOptions::from_head(CommitId::new(&id)))?;
    assert_eq!(log.total, 3, "{}", reopened.backend());

    let mut read_back = Vec::new();
    reopened
      .file_system(&CommitId::new(&id))?
      .open("new.bin")?
      .read_to_end(&mut read_back)?;
    assert_eq!(read_back, content.as_bytes(), "{}", reopened.backend());
  }
  Ok(())
}

#[test]
fn test_clone_options() -> Result<()> {
  let (origin, _, c2) = two_commit_repo(Vcs::Git)?;
  let registry = Registry::with_defaults(&VcsConfig::default())?;
  let url = origin.path.display().to_string();

  let bare_dir = origin.scratch("bare.git");
  let bare = registry.clone_repo("git", &url, &bare_dir, &CloneOptions { bare: true, mirror: false })?;
  assert!(bare_dir.join("HEAD").exists());
  assert_eq!(bare.resolve_revision("main")?.as_str(), c2);

  let mirror_dir = origin.scratch("mirror.git");
  let mirror = registry.clone_repo("git", &url, &mirror_dir, &CloneOptions { bare: false, mirror: true })?;
  assert_eq!(mirror.resolve_branch("main")?.as_str(), c2);

  let err = registry
    .clone_repo("git", &url, &bare_dir, &CloneOptions::default())
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidArgument);

  let err = registry
    .clone_repo("git", "--upload-pack=evil", &origin.scratch("evil"), &CloneOptions::default())
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidArgument);
  Ok(())
}
