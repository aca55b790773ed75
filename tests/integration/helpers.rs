//! Test helpers for integration tests

use anyhow::{Context, Result};
use polyvcs::core::vcs::{open_git_cmd, open_git_native, open_hg_cmd, open_hg_native};
use polyvcs::{Repository, VcsConfig};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

pub const C1_DATE: &str = "2006-01-02T15:04:05Z";
pub const C2_DATE: &str = "2014-05-06T19:20:21Z";

const USER_NAME: &str = "Test User";
const USER_EMAIL: &str = "test@example.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vcs {
  Git,
  Hg,
}

/// A throwaway repository with a working copy
pub struct TestRepo {
  _root: TempDir,
  pub vcs: Vcs,
  pub path: PathBuf,
}

impl TestRepo {
  pub fn git() -> Result<Self> {
    let root = TempDir::new()?;
    let path = root.path().join("repo");
    std::fs::create_dir_all(&path)?;
    git(&path, &["init", "--quiet", "--initial-branch=main"])?;
    Ok(Self {
      _root: root,
      vcs: Vcs::Git,
      path,
    })
  }

  pub fn hg() -> Result<Self> {
    let root = TempDir::new()?;
    let path = root.path().join("repo");
    std::fs::create_dir_all(&path)?;
    hg(&path, &["init", "--config", "format.revlog-compression=zlib"])?;
    Ok(Self {
      _root: root,
      vcs: Vcs::Hg,
      path,
    })
  }

  pub fn new(vcs: Vcs) -> Result<Self> {
    match vcs {
      Vcs::Git => Self::git(),
      Vcs::Hg => Self::hg(),
    }
  }

  /// Scratch directory next to the repository (removed with it)
  pub fn scratch(&self, name: &str) -> PathBuf {
    self._root.path().join(name)
  }

  /// Write a file in the working copy, creating parent directories
  pub fn write(&self, rel: &str, content: &str) -> Result<()> {
    let file = self.path.join(rel);
    if let Some(parent) = file.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&file, content).with_context(|| format!("Failed to write {}", file.display()))?;
    Ok(())
  }

  #[cfg(unix)]
  pub fn symlink(&self, target: &str, rel: &str) -> Result<()> {
    std::os::unix::fs::symlink(target, self.path.join(rel))?;
    Ok(())
  }

  /// Commit everything in the working copy with a fixed author date (RFC 3339)
  pub fn commit(&self, message: &str, date: &str) -> Result<String> {
    match self.vcs {
      Vcs::Git => {
        git(&self.path, &["add", "-A"])?;
        git_dated(&self.path, &["commit", "--quiet", "-m", message], date)?;
        self.run_str(&["rev-parse", "HEAD"])
      }
      Vcs::Hg => {
        let stamp = chrono::DateTime::parse_from_rfc3339(date)?;
        let hg_date = format!("{} {}", stamp.timestamp(), -stamp.offset().local_minus_utc());
        let user = format!("{} <{}>", USER_NAME, USER_EMAIL);
        hg(
          &self.path,
          &["commit", "-A", "-m", message, "-u", user.as_str(), "-d", hg_date.as_str()],
        )?;
        self.run_str(&["log", "-r", ".", "--template", "{node}"])
      }
    }
  }

  /// Run the repository's own tool and return trimmed stdout
  pub fn run_str(&self, args: &[&str]) -> Result<String> {
    let output = match self.vcs {
      Vcs::Git => git(&self.path, args)?,
      Vcs::Hg => hg(&self.path, args)?,
    };
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }

  /// Open with the command-line backend
  pub fn open_cmd(&self) -> Result<Repository> {
    let config = VcsConfig::default();
    Ok(match self.vcs {
      Vcs::Git => open_git_cmd(&self.path, &config)?,
      Vcs::Hg => open_hg_cmd(&self.path, &config)?,
    })
  }

  /// Open with the in-process backend
  pub fn open_native(&self) -> Result<Repository> {
    let config = VcsConfig::default();
    Ok(match self.vcs {
      Vcs::Git => open_git_native(&self.path, &config)?,
      Vcs::Hg => open_hg_native(&self.path, &config)?,
    })
  }

  /// Both backends, command-line first
  pub fn open_all(&self) -> Result<Vec<Repository>> {
    Ok(vec![self.open_cmd()?, self.open_native()?])
  }
}

/// C1 adds `dir1/file1` = "infile1", C2 adds `file2` = "infile2" on top
pub fn two_commit_repo(vcs: Vcs) -> Result<(TestRepo, String, String)> {
  let repo = TestRepo::new(vcs)?;
  repo.write("dir1/file1", "infile1")?;
  let c1 = repo.commit("add dir1/file1", C1_DATE)?;
  repo.write("file2", "infile2")?;
  let c2 = repo.commit("add file2", C2_DATE)?;
  Ok((repo, c1, c2))
}

/// Whether the `hg` binary can run here; Mercurial tests return early without it
pub fn has_hg() -> bool {
  Command::new("hg")
    .arg("version")
    .env("HGPLAIN", "1")
    .output()
    .map(|o| o.status.success())
    .unwrap_or(false)
}

/// Run git command in a directory
pub fn git(cwd: &Path, args: &[&str]) -> Result<Output> {
  git_dated(cwd, args, C1_DATE)
}

fn git_dated(cwd: &Path, args: &[&str], date: &str) -> Result<Output> {
  let output = Command::new("git")
    .current_dir(cwd)
    .args(["-c", "commit.gpgsign=false", "-c", "tag.gpgsign=false"])
    .args(args)
    .env("GIT_CONFIG_NOSYSTEM", "1")
    .env("GIT_AUTHOR_NAME", USER_NAME)
    .env("GIT_AUTHOR_EMAIL", USER_EMAIL)
    .env("GIT_COMMITTER_NAME", USER_NAME)
    .env("GIT_COMMITTER_EMAIL", USER_EMAIL)
    .env("GIT_AUTHOR_DATE", date)
    .env("GIT_COMMITTER_DATE", date)
    .output()
    .context("Failed to run git command")?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    anyhow::bail!("Git command failed: git {}\n{}", args.join(" "), stderr);
  }

  Ok(output)
}

/// Run hg command in a directory
pub fn hg(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = Command::new("hg")
    .current_dir(cwd)
    .args(args)
    .env("HGPLAIN", "1")
    .env("HGRCPATH", "")
    .env("HGUSER", format!("{} <{}>", USER_NAME, USER_EMAIL))
    .output()
    .context("Failed to run hg command")?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    anyhow::bail!("Hg command failed: hg {}\n{}", args.join(" "), stderr);
  }

  Ok(output)
}
