//! Git and Mercurial backends and the openers that assemble them
//!
//! | type | backend     | core strategy | diff / blame / merge base |
//! |------|-------------|---------------|---------------------------|
//! | git  | `git-cmd`   | SystemGit     | SystemGit                 |
//! | git  | `git-native`| GixGit        | SystemGit                 |
//! | hg   | `hg-cmd`    | SystemHg      | SystemHg (no blame)       |
//! | hg   | `hg-native` | HgNative      | SystemHg diff, native merge base (no blame) |

mod gix_fs;
pub mod gix_git;
pub mod hg_native;
pub mod system_git;
mod system_git_fs;
mod system_git_ops;
pub mod system_hg;
mod system_hg_fs;

pub use gix_git::GixGit;
pub use hg_native::HgNative;
pub use system_git::SystemGit;
pub use system_hg::SystemHg;

use crate::core::config::{BackendKind, VcsConfig};
use crate::core::error::{VcsError, VcsResult};
use crate::core::registry::Registry;
use crate::core::repository::Repository;
use chrono::{DateTime, FixedOffset, TimeZone};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub const GIT: &str = "git";
pub const HG: &str = "hg";

/// Open a git repository with the `git` binary for everything
pub fn open_git_cmd(dir: &Path, config: &VcsConfig) -> VcsResult<Repository> {
  let git = Arc::new(SystemGit::open(dir, config)?);
  Ok(
    Repository::new(GIT, "git-cmd", dir.to_path_buf(), git.clone())
      .with_differ(git.clone())
      .with_cross_repo_differ(git.clone())
      .with_blamer(git.clone())
      .with_merger(git),
  )
}

/// Open a git repository with gix for reads and the `git` binary for diff/blame
///
/// The binary is only spawned when a diff, blame or merge base is requested.
pub fn open_git_native(dir: &Path, config: &VcsConfig) -> VcsResult<Repository> {
  let native = Arc::new(GixGit::open(dir)?);
  let git = Arc::new(SystemGit::new(dir, config));
  Ok(
    Repository::new(GIT, "git-native", dir.to_path_buf(), native)
      .with_differ(git.clone())
      .with_cross_repo_differ(git.clone())
      .with_blamer(git.clone())
      .with_merger(git),
  )
}

pub fn open_hg_cmd(dir: &Path, config: &VcsConfig) -> VcsResult<Repository> {
  let hg = Arc::new(SystemHg::open(dir, config)?);
  Ok(
    Repository::new(HG, "hg-cmd", dir.to_path_buf(), hg.clone())
      .with_differ(hg.clone())
      .with_merger(hg),
  )
}

/// Open a Mercurial repository through the revlog reader
///
/// Diffs still go through the `hg` binary.
pub fn open_hg_native(dir: &Path, config: &VcsConfig) -> VcsResult<Repository> {
  let native = Arc::new(HgNative::open(dir)?);
  let hg = Arc::new(SystemHg::new(dir, config));
  Ok(
    Repository::new(HG, "hg-native", dir.to_path_buf(), native.clone())
      .with_differ(hg)
      .with_merger(native),
  )
}

fn open_git(dir: &Path, config: &VcsConfig) -> VcsResult<Repository> {
  match config.git.backend {
    BackendKind::Native => open_git_native(dir, config),
    BackendKind::Cmd => open_git_cmd(dir, config),
  }
}

fn open_hg(dir: &Path, config: &VcsConfig) -> VcsResult<Repository> {
  match config.hg.backend {
    BackendKind::Native => open_hg_native(dir, config),
    BackendKind::Cmd => open_hg_cmd(dir, config),
  }
}

pub(crate) fn register_git(registry: &mut Registry, config: &VcsConfig) -> VcsResult<()> {
  debug!(backend = ?config.git.backend, "registering git backend");
  let open_config = config.clone();
  registry.register_opener(GIT, move |dir| open_git(dir, &open_config))?;

  let clone_config = config.clone();
  registry.register_cloner(GIT, move |url, dir, opt| {
    SystemGit::clone_repo(url, dir, opt, &clone_config)?;
    open_git(dir, &clone_config)
  })
}

pub(crate) fn register_hg(registry: &mut Registry, config: &VcsConfig) -> VcsResult<()> {
  debug!(backend = ?config.hg.backend, "registering hg backend");
  let open_config = config.clone();
  registry.register_opener(HG, move |dir| open_hg(dir, &open_config))?;

  let clone_config = config.clone();
  registry.register_cloner(HG, move |url, dir, opt| {
    SystemHg::clone_repo(url, dir, opt, &clone_config)?;
    open_hg(dir, &clone_config)
  })
}

/// Parse a `+hhmm` / `-hhmm` offset
pub(crate) fn parse_git_offset(tz: &str) -> VcsResult<FixedOffset> {
  let invalid = || VcsError::parse("timezone offset", tz);
  let (sign, digits) = match tz.as_bytes().first() {
    Some(b'+') => (1, &tz[1..]),
    Some(b'-') => (-1, &tz[1..]),
    _ => return Err(invalid()),
  };
  if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
    return Err(invalid());
  }
  let hours: i32 = digits[..2].parse()?;
  let minutes: i32 = digits[2..].parse()?;
  FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Parse git's raw signature time, `"<unix seconds> <+hhmm>"`
pub(crate) fn parse_raw_git_time(raw: &str) -> VcsResult<DateTime<FixedOffset>> {
  let mut parts = raw.split_whitespace();
  let (Some(secs), Some(tz)) = (parts.next(), parts.next()) else {
    return Err(VcsError::parse("git signature time", raw));
  };
  let secs: i64 = secs.parse()?;
  parse_git_offset(tz)?
    .timestamp_opt(secs, 0)
    .single()
    .ok_or_else(|| VcsError::parse("git signature time", raw))
}
