//! Value types returned by every backend

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque commit identifier (hex content hash), copied verbatim from the VCS
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
  pub fn new(id: impl Into<String>) -> Self {
    CommitId(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CommitId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<String> for CommitId {
  fn from(id: String) -> Self {
    CommitId(id)
  }
}

impl From<&str> for CommitId {
  fn from(id: &str) -> Self {
    CommitId(id.to_string())
  }
}

impl AsRef<str> for CommitId {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
  pub name: String,
  pub email: String,
  pub date: DateTime<FixedOffset>,
}

/// Commit metadata
///
/// `parents` is empty only for root commits. Mercurial null parents are
/// dropped, so merges list exactly their real parents in order for both VCSs.
/// `committer` is only set by git backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
  pub id: CommitId,
  pub author: Signature,
  pub committer: Option<Signature>,
  pub message: String,
  pub parents: Vec<CommitId>,
}

/// One window of history plus the size of the whole history
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitLog {
  pub commits: Vec<Commit>,
  /// Commits reachable from the head (and touching the path, if any),
  /// regardless of the window
  pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
  pub name: String,
  pub head: CommitId,
  pub counts: Option<BehindAhead>,
}

/// Commit counts of a branch relative to a reference branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehindAhead {
  /// Commits on the reference branch missing from this branch
  pub behind: u64,
  /// Commits on this branch missing from the reference branch
  pub ahead: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
  pub name: String,
  pub commit_id: CommitId,
}

/// Unified diff text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
  pub raw: String,
}

/// Blame attribution for a half-open line range `[start_line, end_line)`
///
/// Lines are 1-based. Byte offsets are counted from the start of the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
  pub start_line: usize,
  pub end_line: usize,
  pub start_byte: usize,
  pub end_byte: usize,
  pub commit_id: CommitId,
  pub author: Signature,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitsOptions {
  /// Newest commit of the listing
  pub head: CommitId,
  /// Maximum commits returned (0 = no limit)
  pub n: usize,
  /// Commits skipped from the newest end
  pub skip: usize,
  /// Only commits touching this path
  pub path: Option<String>,
}

impl CommitsOptions {
  pub fn from_head(head: CommitId) -> Self {
    Self {
      head,
      ..Default::default()
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffOptions {
  /// Restrict the diff to these paths (empty = everything)
  pub paths: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlameOptions {
  /// Blame the file as of this commit (default: HEAD)
  pub newest_commit: Option<CommitId>,
  /// Stop attributing at this commit; older lines are charged to it
  pub oldest_commit: Option<CommitId>,
  /// First line to report, 1-based (0 = from the start)
  pub start_line: usize,
  /// Last line to report, inclusive (0 = to the end)
  pub end_line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchesOptions {
  /// Annotate each branch with counts relative to this branch
  pub behind_ahead_branch: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneOptions {
  /// Clone without a working copy
  pub bare: bool,
  /// Bare clone mapping every remote ref (git only)
  pub mirror: bool,
}
