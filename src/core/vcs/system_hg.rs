//! System Mercurial backend
//!
//! Every operation shells out to `hg -R <repo>` with `HGPLAIN=1`, which turns
//! off user aliases, localized messages and pagers so the output stays
//! parseable. History windows are expressed as revsets so Mercurial never has
//! to emit more records than the caller asked for.

use crate::core::config::VcsConfig;
use crate::core::error::{NotFound, VcsError, VcsResult};
use crate::core::exec::{self, ToolOutput};
use crate::core::repository::{Differ, LogReader, Merger, RefLister, Resolver};
use crate::core::types::{
  BehindAhead, Branch, BranchesOptions, CloneOptions, Commit, CommitId, CommitLog, CommitsOptions, Diff, DiffOptions,
  Signature, Tag,
};
use crate::utils::{check_spec_arg_safety, clean_path};
use chrono::DateTime;
use rayon::prelude::*;
use regex::Regex;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, trace};

/// Fields: node, author name, author email, date, description, p1, p2
const LOG_TEMPLATE: &str = "{node}\\0{author|person}\\0{author|email}\\0{date|rfc3339date}\\0{desc}\\0{p1node}\\0{p2node}\\0";
const FIELDS_PER_COMMIT: usize = 7;

pub(crate) const NULL_NODE: &str = "0000000000000000000000000000000000000000";

const REVISION_NOT_FOUND: &[&str] = &["unknown revision", "abort: unknown", "filtered revision", "ambiguous identifier"];
const REPO_NOT_FOUND: &[&str] = &["no repository found", "not found!"];
const DESTINATION_EXISTS: &[&str] = &["already exists"];

/// `NAME   REV:NODE` lines of `hg branches --debug` / `hg tags --debug`
const REF_LINE: &str = r"^(\S.*?)\s+(-?\d+):([0-9a-f]{40})";

/// Mercurial backend using the system `hg` binary
#[derive(Debug, Clone)]
pub struct SystemHg {
  pub(crate) repo_path: PathBuf,

  binary: String,
  timeout: Option<Duration>,
}

impl SystemHg {
  /// Open a Mercurial repository; runs `hg root` once
  pub fn open(path: &Path, config: &VcsConfig) -> VcsResult<Self> {
    let hg = Self::new(path, config);
    let output = hg.run(["root"])?;
    if !output.success() {
      if output.mentions(REPO_NOT_FOUND) {
        return Err(VcsError::NotFound(NotFound::Repository {
          path: path.to_path_buf(),
        }));
      }
      return Err(output.into_error());
    }
    Ok(hg)
  }

  /// Handle for `path` without spawning anything
  pub fn new(path: &Path, config: &VcsConfig) -> Self {
    Self {
      repo_path: path.to_path_buf(),
      binary: config.hg_binary().to_string(),
      timeout: config.exec.timeout(),
    }
  }

  /// `hg clone`; bare and mirror clones skip the working copy checkout
  pub fn clone_repo(url: &str, dir: &Path, opt: &CloneOptions, config: &VcsConfig) -> VcsResult<()> {
    check_spec_arg_safety(url)?;
    let mut cmd = Self::base_command(config.hg_binary());
    cmd.arg("clone");
    if opt.bare || opt.mirror {
      cmd.arg("--noupdate");
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
    debug!(url, dir = %dir.display(), "cloned hg repository");
    Ok(())
  }

  fn base_command(binary: &str) -> Command {
    let mut cmd = exec::isolated_command(binary);
    cmd.env("HGPLAIN", "1");
    cmd.env("HGENCODING", "UTF-8");
    cmd
  }

  pub(crate) fn hg_cmd(&self) -> Command {
    let mut cmd = Self::base_command(&self.binary);
    cmd.arg("-R").arg(&self.repo_path);
    cmd
  }

  /// Run hg with `args`; non-zero exits are returned, not raised
  pub(crate) fn run<I, S>(&self, args: I) -> VcsResult<ToolOutput>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
  {
    let mut cmd = self.hg_cmd();
    cmd.args(args);
    exec::run(cmd, self.timeout)
  }

  pub(crate) fn run_checked<I, S>(&self, args: I) -> VcsResult<ToolOutput>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
  {
    self.run(args)?.checked()
  }

  /// Full node of a revision specifier
  fn identify(&self, spec: &str) -> VcsResult<CommitId> {
    let rev = format!("--rev={}", spec);
    let output = self.run(["identify", "--debug", "-i", rev.as_str()])?;
    if !output.success() {
      if output.mentions(REVISION_NOT_FOUND) {
        return Err(VcsError::revision_not_found(spec));
      }
      return Err(output.into_error());
    }
    // a trailing '+' marks a dirty working directory
    let text = output.stdout_str();
    let node = text.trim().trim_end_matches('+');
    if node.len() != 40 {
      return Err(VcsError::parse("hg identify output", text.trim()));
    }
    Ok(CommitId::new(node))
  }

  /// Error unless `id` names a changeset in this repository
  pub(crate) fn verify_commit(&self, id: &CommitId) -> VcsResult<()> {
    check_spec_arg_safety(id.as_str())?;
    self.identify(id.as_str()).map(|_| ()).map_err(|e| {
      if e.is_not_found() {
        VcsError::commit_not_found(id.as_str())
      } else {
        e
      }
    })
  }

  /// Number of changesets in a revset, counted from one byte per changeset
  fn count(&self, revset: &str) -> VcsResult<u64> {
    let output = self.run_checked(["log", "-r", revset, "--template", "x"])?;
    Ok(output.stdout.iter().filter(|b| **b == b'x').count() as u64)
  }

  /// `NAME REV:NODE` rows of a `--debug` listing, sorted by name
  fn list_refs(&self, subcommand: &str) -> VcsResult<Vec<(String, CommitId)>> {
    let output = self.run_checked([subcommand, "--debug"])?;
    let mut refs = parse_ref_lines(&output.stdout_str())?;
    refs.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(refs)
  }

  fn behind_ahead(&self, reference: &CommitId, head: &CommitId) -> VcsResult<BehindAhead> {
    Ok(BehindAhead {
      behind: self.count(&format!("only({}, {})", reference, head))?,
      ahead: self.count(&format!("only({}, {})", head, reference))?,
    })
  }
}

/// Quote a path for a `file('path:...')` revset predicate
fn revset_path(path: &str) -> String {
  let escaped = path.replace('\\', "\\\\").replace('\'', "\\'");
  format!("file('path:{}')", escaped)
}

/// Revset of the history shown by `commits`, newest first
fn history_revset(head: &str, path: Option<&str>) -> String {
  match path {
    None => format!("reverse(::{})", head),
    Some(p) => format!("reverse((::{}) and {})", head, revset_path(p)),
  }
}

/// Apply n/skip to a revset with `limit`
fn window_revset(base: &str, n: usize, skip: usize) -> String {
  match (n, skip) {
    (0, 0) => base.to_string(),
    (0, s) => format!("{0} - limit({0}, {1})", base, s),
    (n, s) => format!("limit({}, {}, {})", base, n, s),
  }
}

impl Resolver for SystemHg {
  fn resolve_revision(&self, spec: &str) -> VcsResult<CommitId> {
    check_spec_arg_safety(spec)?;
    let spec = if spec.is_empty() { "tip" } else { spec };
    self.identify(spec)
  }
}

impl LogReader for SystemHg {
  fn commits(&self, opt: &CommitsOptions) -> VcsResult<CommitLog> {
    check_spec_arg_safety(opt.head.as_str())?;
    let head = if opt.head.as_str().is_empty() { "tip" } else { opt.head.as_str() };
    // verify first so a bad head is NotFound rather than a revset error
    let head = self.identify(head)?;
    if head.as_str() == NULL_NODE {
      debug!(repo = %self.repo_path.display(), "empty repository, no history");
      return Ok(CommitLog::default());
    }

    let path = opt.path.as_deref().map(clean_path);
    let base = history_revset(head.as_str(), path.as_deref());
    let revset = window_revset(&base, opt.n, opt.skip);

    let output = self.run_checked(["log", "-r", revset.as_str(), "--template", LOG_TEMPLATE])?;
    let commits = parse_log(&output.stdout)?;
    let total = self.count(&base)?;
    trace!(head = %head, returned = commits.len(), total, "parsed hg log");

    Ok(CommitLog { commits, total })
  }
}

impl RefLister for SystemHg {
  fn branches(&self, opt: &BranchesOptions) -> VcsResult<Vec<Branch>> {
    let refs = self.list_refs("branches")?;

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
        .list_refs("tags")?
        .into_iter()
        .map(|(name, commit_id)| Tag { name, commit_id })
        .collect(),
    )
  }
}

impl Differ for SystemHg {
  fn diff(&self, base: &CommitId, head: &CommitId, opt: &DiffOptions) -> VcsResult<Diff> {
    self.verify_commit(base)?;
    self.verify_commit(head)?;

    let mut args = vec![
      "diff".to_string(),
      "--git".to_string(),
      "-r".to_string(),
      base.to_string(),
      "-r".to_string(),
      head.to_string(),
      "--".to_string(),
    ];
    args.extend(opt.paths.iter().map(|p| format!("path:{}", clean_path(p))));

    let output = self.run_checked(&args)?;
    Ok(Diff {
      raw: output.stdout_str(),
    })
  }
}

impl Merger for SystemHg {
  fn merge_base(&self, a: &CommitId, b: &CommitId) -> VcsResult<CommitId> {
    check_spec_arg_safety(a.as_str())?;
    check_spec_arg_safety(b.as_str())?;
    let revset = format!("ancestor({}, {})", a, b);
    let output = self.run(["log", "-r", revset.as_str(), "--template", "{node}"])?;
    if !output.success() {
      if output.mentions(REVISION_NOT_FOUND) {
        return Err(VcsError::revision_not_found(revset));
      }
      return Err(output.into_error());
    }
    let text = output.stdout_str();
    let node = text.trim();
    if node.is_empty() || node == NULL_NODE {
      return Err(VcsError::revision_not_found(revset));
    }
    Ok(CommitId::new(node))
  }
}

/// Decode `hg log` records produced with [`LOG_TEMPLATE`]
pub(crate) fn parse_log(out: &[u8]) -> VcsResult<Vec<Commit>> {
  let parts: Vec<&[u8]> = out.split(|b| *b == 0).collect();
  let num_commits = parts.len() / FIELDS_PER_COMMIT;

  let mut commits = Vec::with_capacity(num_commits);
  for record in parts.chunks_exact(FIELDS_PER_COMMIT).take(num_commits) {
    let text = |i: usize| String::from_utf8_lossy(record[i]).into_owned();

    let id = text(0).trim_start_matches('\n').to_string();
    let date_text = text(3);
    let date = DateTime::parse_from_rfc3339(date_text.trim())
      .map_err(|e| VcsError::parse(format!("hg date {:?}", date_text), e))?;

    let parents = [text(5), text(6)]
      .into_iter()
      .filter(|p| !p.is_empty() && p != NULL_NODE)
      .map(CommitId::from)
      .collect();

    commits.push(Commit {
      id: CommitId::new(id),
      author: Signature {
        name: text(1),
        email: text(2),
        date,
      },
      committer: None,
      message: text(4),
      parents,
    });
  }
  Ok(commits)
}

/// Parse `NAME   REV:NODE [(inactive)]` listing lines
fn parse_ref_lines(text: &str) -> VcsResult<Vec<(String, CommitId)>> {
  let ref_line = Regex::new(REF_LINE).map_err(|e| VcsError::message(format!("Invalid ref pattern: {}", e)))?;
  let mut refs = Vec::new();
  for line in text.lines().filter(|l| !l.trim().is_empty()) {
    let caps = ref_line
      .captures(line)
      .ok_or_else(|| VcsError::parse("hg ref listing line", line))?;
    refs.push((caps[1].to_string(), CommitId::new(&caps[3])));
  }
  Ok(refs)
}
