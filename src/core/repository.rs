//! Capability traits and the `Repository` facade
//!
//! Each backend implements the traits it can serve. A [`Repository`] is
//! assembled from one core strategy (resolve, log, refs, tree) plus optional
//! diff/blame/merge-base strategies, so which operations are available is
//! decided when the repository is opened and can be queried through
//! [`Repository::capabilities`].

use crate::core::error::{NotFound, VcsError, VcsResult};
use crate::core::fs::FileSystem;
use crate::core::types::{
  BlameOptions, Branch, BranchesOptions, Commit, CommitId, CommitLog, CommitsOptions, Diff, DiffOptions, Hunk, Tag,
};
use bitflags::bitflags;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Turns revision specifiers into commit IDs
pub trait Resolver: Send + Sync {
  fn resolve_revision(&self, spec: &str) -> VcsResult<CommitId>;

  fn resolve_branch(&self, name: &str) -> VcsResult<CommitId> {
    self.resolve_revision(name).map_err(|e| match e {
      VcsError::NotFound(NotFound::Revision { .. }) => VcsError::NotFound(NotFound::Branch { name: name.to_string() }),
      other => other,
    })
  }

  fn resolve_tag(&self, name: &str) -> VcsResult<CommitId> {
    self.resolve_revision(name).map_err(|e| match e {
      VcsError::NotFound(NotFound::Revision { .. }) => VcsError::NotFound(NotFound::Tag { name: name.to_string() }),
      other => other,
    })
  }
}

/// Commit history
pub trait LogReader: Send + Sync {
  fn commits(&self, opt: &CommitsOptions) -> VcsResult<CommitLog>;

  fn get_commit(&self, id: &CommitId) -> VcsResult<Commit> {
    let log = self.commits(&CommitsOptions {
      head: id.clone(),
      n: 1,
      ..Default::default()
    })?;
    log
      .commits
      .into_iter()
      .next()
      .ok_or_else(|| VcsError::commit_not_found(id.as_str()))
  }
}

/// Branch and tag listings, sorted by name
pub trait RefLister: Send + Sync {
  fn branches(&self, opt: &BranchesOptions) -> VcsResult<Vec<Branch>>;
  fn tags(&self) -> VcsResult<Vec<Tag>>;
}

pub trait FileTreeReader: Send + Sync {
  fn file_system(&self, at: &CommitId) -> VcsResult<Box<dyn FileSystem>>;
}

pub trait Differ: Send + Sync {
  fn diff(&self, base: &CommitId, head: &CommitId, opt: &DiffOptions) -> VcsResult<Diff>;
}

/// Diff against a commit that lives in another on-disk repository
pub trait CrossRepoDiffer: Send + Sync {
  fn cross_repo_diff(&self, base: &CommitId, head_dir: &Path, head: &CommitId, opt: &DiffOptions) -> VcsResult<Diff>;
}

pub trait Blamer: Send + Sync {
  fn blame_file(&self, path: &str, opt: &BlameOptions) -> VcsResult<Vec<Hunk>>;
}

pub trait Merger: Send + Sync {
  fn merge_base(&self, a: &CommitId, b: &CommitId) -> VcsResult<CommitId>;
}

/// Strategies every backend must provide
pub trait CoreBackend: Resolver + LogReader + RefLister + FileTreeReader {}

impl<T: Resolver + LogReader + RefLister + FileTreeReader> CoreBackend for T {}

bitflags! {
  /// Operations a repository handle can serve
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
  pub struct Capabilities: u32 {
    const RESOLVE = 1 << 0;
    const LOG = 1 << 1;
    const REFS = 1 << 2;
    const FILE_SYSTEM = 1 << 3;
    const DIFF = 1 << 4;
    const CROSS_REPO_DIFF = 1 << 5;
    const BLAME = 1 << 6;
    const MERGE_BASE = 1 << 7;
  }
}

/// An opened repository
///
/// Cheap to clone; clones share the underlying strategies.
#[derive(Clone)]
pub struct Repository {
  vcs_type: String,
  backend: &'static str,
  dir: PathBuf,
  core: Arc<dyn CoreBackend>,
  differ: Option<Arc<dyn Differ>>,
  cross_repo: Option<Arc<dyn CrossRepoDiffer>>,
  blamer: Option<Arc<dyn Blamer>>,
  merger: Option<Arc<dyn Merger>>,
}

impl fmt::Debug for Repository {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Repository")
      .field("vcs_type", &self.vcs_type)
      .field("backend", &self.backend)
      .field("dir", &self.dir)
      .field("capabilities", &self.capabilities())
      .finish()
  }
}

impl Repository {
  /// Start from the core strategy; optional ones are added with `with_*`
  pub fn new(vcs_type: impl Into<String>, backend: &'static str, dir: PathBuf, core: Arc<dyn CoreBackend>) -> Self {
    Self {
      vcs_type: vcs_type.into(),
      backend,
      dir,
      core,
      differ: None,
      cross_repo: None,
      blamer: None,
      merger: None,
    }
  }

  pub fn with_differ(mut self, differ: Arc<dyn Differ>) -> Self {
    self.differ = Some(differ);
    self
  }

  pub fn with_cross_repo_differ(mut self, differ: Arc<dyn CrossRepoDiffer>) -> Self {
    self.cross_repo = Some(differ);
    self
  }

  pub fn with_blamer(mut self, blamer: Arc<dyn Blamer>) -> Self {
    self.blamer = Some(blamer);
    self
  }

  pub fn with_merger(mut self, merger: Arc<dyn Merger>) -> Self {
    self.merger = Some(merger);
    self
  }

  /// Registered VCS type ("git", "hg", ...)
  pub fn vcs_type(&self) -> &str {
    &self.vcs_type
  }

  /// Implementation serving this handle (e.g. "git-cmd", "hg-native")
  pub fn backend(&self) -> &'static str {
    self.backend
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn capabilities(&self) -> Capabilities {
    let mut caps = Capabilities::RESOLVE | Capabilities::LOG | Capabilities::REFS | Capabilities::FILE_SYSTEM;
    caps.set(Capabilities::DIFF, self.differ.is_some());
    caps.set(Capabilities::CROSS_REPO_DIFF, self.cross_repo.is_some());
    caps.set(Capabilities::BLAME, self.blamer.is_some());
    caps.set(Capabilities::MERGE_BASE, self.merger.is_some());
    caps
  }

  pub fn resolve_revision(&self, spec: &str) -> VcsResult<CommitId> {
    self.core.resolve_revision(spec)
  }

  pub fn resolve_branch(&self, name: &str) -> VcsResult<CommitId> {
    self.core.resolve_branch(name)
  }

  pub fn resolve_tag(&self, name: &str) -> VcsResult<CommitId> {
    self.core.resolve_tag(name)
  }

  pub fn commits(&self, opt: &CommitsOptions) -> VcsResult<CommitLog> {
    self.core.commits(opt)
  }

  pub fn get_commit(&self, id: &CommitId) -> VcsResult<Commit> {
    self.core.get_commit(id)
  }

  pub fn branches(&self, opt: &BranchesOptions) -> VcsResult<Vec<Branch>> {
    self.core.branches(opt)
  }

  pub fn tags(&self) -> VcsResult<Vec<Tag>> {
    self.core.tags()
  }

  pub fn file_system(&self, at: &CommitId) -> VcsResult<Box<dyn FileSystem>> {
    self.core.file_system(at)
  }

  pub fn diff(&self, base: &CommitId, head: &CommitId, opt: &DiffOptions) -> VcsResult<Diff> {
    match &self.differ {
      Some(d) => d.diff(base, head, opt),
      None => Err(VcsError::unsupported("diff", self.backend)),
    }
  }

  /// Diff `base` (in this repository) against `head` from `head_repo`
  ///
  /// When the repositories differ on disk the head commit is fetched into
  /// this repository first, which adds objects to its store.
  pub fn cross_repo_diff(
    &self,
    base: &CommitId,
    head_repo: &Repository,
    head: &CommitId,
    opt: &DiffOptions,
  ) -> VcsResult<Diff> {
    let Some(d) = &self.cross_repo else {
      return Err(VcsError::unsupported("cross-repo diff", self.backend));
    };
    if head_repo.vcs_type != self.vcs_type {
      return Err(VcsError::unsupported("cross-repo diff between different VCS types", self.backend));
    }
    d.cross_repo_diff(base, &head_repo.dir, head, opt)
  }

  pub fn blame_file(&self, path: &str, opt: &BlameOptions) -> VcsResult<Vec<Hunk>> {
    match &self.blamer {
      Some(b) => b.blame_file(path, opt),
      None => Err(VcsError::unsupported("blame", self.backend)),
    }
  }

  pub fn merge_base(&self, a: &CommitId, b: &CommitId) -> VcsResult<CommitId> {
    match &self.merger {
      Some(m) => m.merge_base(a, b),
      None => Err(VcsError::unsupported("merge base", self.backend)),
    }
  }
}
