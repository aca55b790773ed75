//! System git backend
//!
//! Every operation is one or two `git` plumbing invocations run through
//! [`exec::run`](crate::core::exec::run):
//! - isolated environment (PATH and HOME only)
//! - safe configuration overrides on every call
//! - literal pathspecs, so user paths are never globbed
//! - per-call timeout from `[exec] timeout_secs`

use crate::core::config::VcsConfig;
use crate::core::error::{NotFound, VcsError, VcsResult};
use crate::core::exec::{self, ToolOutput};
use crate::core::repository::{Merger, RefLister, Resolver};
use crate::core::types::{BehindAhead, Branch, BranchesOptions, CloneOptions, CommitId, Tag};
use crate::utils::check_spec_arg_safety;
use rayon::prelude::*;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::debug;

/// Output fragments meaning "no such revision"
const REVISION_NOT_FOUND: &[&str] = &[
  "unknown revision",
  "Needed a single revision",
  "bad revision",
  "not a valid object name",
];

/// Output fragments meaning "not a repository"
const REPO_NOT_FOUND: &[&str] = &["not a git repository", "cannot change to"];

const DESTINATION_EXISTS: &[&str] = &["already exists and is not an empty directory"];

/// Git backend using the system `git` binary
#[derive(Debug, Clone)]
pub struct SystemGit {
  /// Repository directory (work tree or bare repository)
  pub(crate) repo_path: PathBuf,

  binary: String,
  timeout: Option<Duration>,
}

impl SystemGit {
  /// Open a git repository
  ///
  /// This performs ONE subprocess call to check the directory is a repository.
  pub fn open(path: &Path, config: &VcsConfig) -> VcsResult<Self> {
    let git = Self::new(path, config);
    let output = git.run(["rev-parse", "--git-dir"])?;
    if !output.success() {
      if output.mentions(REPO_NOT_FOUND) {
        return Err(VcsError::NotFound(NotFound::Repository {
          path: path.to_path_buf(),
        }));
      }
      return Err(output.into_error());
    }
    Ok(git)
  }

  /// Handle for `path` without touching the disk or spawning anything
  pub fn new(path: &Path, config: &VcsConfig) -> Self {
    Self {
      repo_path: path.to_path_buf(),
      binary: config.git_binary().to_string(),
      timeout: config.exec.timeout(),
    }
  }

  /// Same binary and limits, different repository
  pub(crate) fn sibling(&self, path: &Path) -> Self {
    Self {
      repo_path: path.to_path_buf(),
      binary: self.binary.clone(),
      timeout: self.timeout,
    }
  }

  /// `git clone` into `dir`
  pub fn clone_repo(url: &str, dir: &Path, opt: &CloneOptions, config: &VcsConfig) -> VcsResult<()> {
    check_spec_arg_safety(url)?;
    let mut cmd = exec::isolated_command(config.git_binary());
    cmd.arg("clone");
    if opt.mirror {
      cmd.arg("--mirror");
    } else if opt.bare {
      cmd.arg("--bare");
    }
    cmd.arg("--").arg(url).arg(dir);

    let output = exec::run(cmd, config.exec.timeout())?;
    if !output.success() {
      if output.mentions(DESTINATION_EXISTS) {
        return Err(VcsError::DestinationExists {
          path: dir.to_path_buf(),
          output: output.combined(),
        });
      }
      return Err(output.into_error());
    }
    debug!(url, dir = %dir.display(), "cloned git repository");
    Ok(())
  }

  /// Create a safe git command with isolated environment
  ///
  /// - Sets working directory to repo path
  /// - Clears environment variables except PATH and HOME
  /// - Adds safe configuration overrides
  pub(crate) fn git_cmd(&self) -> Command {
    let mut cmd = exec::isolated_command(&self.binary);

    cmd.arg("-C").arg(&self.repo_path);

    // Paths passed after `--` are file names, never patterns
    cmd.env("GIT_LITERAL_PATHSPECS", "1");

    // Force safe behavior (override user config)
    cmd.arg("-c").arg("protocol.version=2");
    cmd.arg("-c").arg("core.quotePath=false");
    cmd.arg("-c").arg("log.showSignature=false");
    cmd.arg("-c").arg("color.ui=false");

    cmd
  }

  /// Run git with `args`; non-zero exits are returned, not raised
  pub(crate) fn run<I, S>(&self, args: I) -> VcsResult<ToolOutput>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
  {
    let mut cmd = self.git_cmd();
    cmd.args(args);
    exec::run(cmd, self.timeout)
  }

  /// Run git with `args`, turning non-zero exits into errors
  pub(crate) fn run_checked<I, S>(&self, args: I) -> VcsResult<ToolOutput>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
  {
    self.run(args)?.checked()
  }

  /// Error unless `id` names a commit in this repository
  pub(crate) fn verify_commit(&self, id: &CommitId) -> VcsResult<()> {
    check_spec_arg_safety(id.as_str())?;
    let spec = format!("{}^{{commit}}", id);
    let output = self.run(["rev-parse", "--verify", "--quiet", spec.as_str()])?;
    if output.success() {
      Ok(())
    } else {
      Err(VcsError::commit_not_found(id.as_str()))
    }
  }

  /// Whether any ref points at a commit (false for a fresh `git init`)
  pub(crate) fn has_commits(&self) -> VcsResult<bool> {
    let output = self.run_checked(["rev-list", "-n", "1", "--all"])?;
    Ok(!output.stdout.iter().all(u8::is_ascii_whitespace))
  }

  /// `name\0objectname\0peeled` for every ref under `prefix`
  fn list_refs(&self, prefix: &str) -> VcsResult<Vec<(String, CommitId)>> {
    let output = self.run_checked([
      "for-each-ref",
      "--format=%(refname:strip=2)%00%(objectname)%00%(*objectname)",
      prefix,
    ])?;

    let mut refs = Vec::new();
    for line in output.stdout_str().lines() {
      let mut fields = line.split('\0');
      let (Some(name), Some(object), peeled) = (fields.next(), fields.next(), fields.next()) else {
        return Err(VcsError::parse("git for-each-ref output", line));
      };
      // annotated tags report the tagged commit in the peeled column
      let id = match peeled {
        Some(p) if !p.is_empty() => p,
        _ => object,
      };
      refs.push((name.to_string(), CommitId::new(id)));
    }
    refs.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(refs)
  }

  /// (behind, ahead) of `head` relative to `reference`
  fn behind_ahead(&self, reference: &CommitId, head: &CommitId) -> VcsResult<BehindAhead> {
    let range = format!("{}...{}", reference, head);
    let output = self.run_checked(["rev-list", "--left-right", "--count", range.as_str()])?;
    let text = output.stdout_str();
    let mut counts = text.split_whitespace().map(str::parse::<u64>);
    match (counts.next(), counts.next()) {
      (Some(Ok(behind)), Some(Ok(ahead))) => Ok(BehindAhead { behind, ahead }),
      _ => Err(VcsError::parse("git rev-list --left-right --count output", text.trim())),
    }
  }
}

impl Resolver for SystemGit {
  fn resolve_revision(&self, spec: &str) -> VcsResult<CommitId> {
    check_spec_arg_safety(spec)?;
    let spec = if spec.is_empty() { "HEAD" } else { spec };

    let peeled = format!("{}^{{commit}}", spec);
    let output = self.run(["rev-parse", "--verify", peeled.as_str()])?;
    if !output.success() {
      if output.mentions(REVISION_NOT_FOUND) {
        return Err(VcsError::revision_not_found(spec));
      }
      return Err(output.into_error());
    }

    Ok(CommitId::new(output.stdout_str().trim()))
  }
}

impl RefLister for SystemGit {
  fn branches(&self, opt: &BranchesOptions) -> VcsResult<Vec<Branch>> {
    let refs = self.list_refs("refs/heads")?;

    let Some(reference) = &opt.behind_ahead_branch else {
      return Ok(
        refs
          .into_iter()
          .map(|(name, head)| Branch { name, head, counts: None })
          .collect(),
      );
    };

    let reference = self.resolve_branch(reference)?;
    refs
      .into_par_iter()
      .map(|(name, head)| -> VcsResult<Branch> {
        let counts = self.behind_ahead(&reference, &head)?;
        Ok(Branch {
          name,
          head,
          counts: Some(counts),
        })
      })
      .collect()
  }

  fn tags(&self) -> VcsResult<Vec<Tag>> {
    Ok(
      self
        .list_refs("refs/tags")?
        .into_iter()
        .map(|(name, commit_id)| Tag { name, commit_id })
        .collect(),
    )
  }
}

impl Merger for SystemGit {
  fn merge_base(&self, a: &CommitId, b: &CommitId) -> VcsResult<CommitId> {
    check_spec_arg_safety(a.as_str())?;
    check_spec_arg_safety(b.as_str())?;
    let output = self.run(["merge-base", a.as_str(), b.as_str()])?;
    if !output.success() {
      // exit 1 without output: no common ancestor
      if output.status.code() == Some(1) && output.stdout.is_empty() && output.stderr.is_empty() {
        return Err(VcsError::revision_not_found(format!("merge-base({}, {})", a, b)));
      }
      if output.mentions(REVISION_NOT_FOUND) {
        return Err(VcsError::revision_not_found(format!("merge-base({}, {})", a, b)));
      }
      return Err(output.into_error());
    }
    Ok(CommitId::new(output.stdout_str().trim()))
  }
}
