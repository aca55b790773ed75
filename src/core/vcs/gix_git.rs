//! Native git backend (pure Rust gitoxide)
//!
//! Resolution, history, refs and tree reads happen in-process. The shared
//! `ThreadSafeRepository` is turned into a thread-local handle at the start of
//! every operation, so one `GixGit` can serve many threads at once.

use super::gix_fs::GixFs;
use super::parse_raw_git_time;
use crate::core::error::{VcsError, VcsResult};
use crate::core::fs::FileSystem;
use crate::core::repository::{FileTreeReader, LogReader, RefLister, Resolver};
use crate::core::types::{
  BehindAhead, Branch, BranchesOptions, Commit, CommitId, CommitLog, CommitsOptions, Signature, Tag,
};
use crate::utils::{check_spec_arg_safety, clean_path};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Library messages that mean "no such revision"
const NOT_FOUND_MESSAGES: &[&str] = &["could not be found", "not found", "does not exist", "unborn", "did not match"];

pub struct GixGit {
  repo: gix::ThreadSafeRepository,
  dir: PathBuf,
}

impl GixGit {
  pub fn open(path: &Path) -> VcsResult<Self> {
    let repo = gix::ThreadSafeRepository::open(path).map_err(|e| {
      VcsError::with_help(
        format!("Failed to open git repository at {}: {}", path.display(), e),
        "Check the path points at a work tree or a bare repository.",
      )
    })?;
    Ok(Self {
      repo,
      dir: path.to_path_buf(),
    })
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  fn local(&self) -> gix::Repository {
    self.repo.to_thread_local()
  }

  /// Peel `spec` to a commit id
  fn peel(repo: &gix::Repository, spec: &str) -> VcsResult<gix::ObjectId> {
    let id = repo.rev_parse_single(spec).map_err(|e| classify(spec, e))?;
    let commit = id
      .object()
      .map_err(VcsError::native)?
      .peel_to_commit()
      .map_err(|_| VcsError::revision_not_found(spec))?;
    Ok(commit.id)
  }

  fn is_unborn(repo: &gix::Repository) -> VcsResult<bool> {
    Ok(repo.head().map_err(VcsError::native)?.is_unborn())
  }
}

fn classify(spec: &str, err: impl std::fmt::Display) -> VcsError {
  let message = err.to_string();
  if NOT_FOUND_MESSAGES.iter().any(|m| message.contains(m)) {
    VcsError::revision_not_found(spec)
  } else {
    VcsError::native(message)
  }
}

impl Resolver for GixGit {
  fn resolve_revision(&self, spec: &str) -> VcsResult<CommitId> {
    check_spec_arg_safety(spec)?;
    let spec = if spec.is_empty() { "HEAD" } else { spec };
    let repo = self.local();
    let id = Self::peel(&repo, spec)?;
    Ok(CommitId::new(id.to_string()))
  }
}

impl LogReader for GixGit {
  fn commits(&self, opt: &CommitsOptions) -> VcsResult<CommitLog> {
    check_spec_arg_safety(opt.head.as_str())?;
    let repo = self.local();
    let head = if opt.head.as_str().is_empty() { "HEAD" } else { opt.head.as_str() };

    if head == "HEAD" && Self::is_unborn(&repo)? {
      debug!(repo = %self.dir.display(), "empty repository, no history");
      return Ok(CommitLog::default());
    }

    let tip = Self::peel(&repo, head)?;
    let path = opt.path.as_deref().map(clean_path);

    let walk = repo
      .rev_walk([tip])
      .sorting(gix::revision::walk::Sorting::ByCommitTime(Default::default()))
      .all()
      .map_err(VcsError::native)?;

    let mut commits = Vec::new();
    let mut total = 0u64;
    for info in walk {
      let info = info.map_err(VcsError::native)?;
      if let Some(path) = &path
        && !touches_path(&repo, info.id, path)?
      {
        continue;
      }

      let index = total as usize;
      total += 1;
      if index < opt.skip || (opt.n != 0 && commits.len() >= opt.n) {
        continue;
      }
      commits.push(load_commit(&repo, info.id)?);
    }

    trace!(head, returned = commits.len(), total, "walked git history");
    Ok(CommitLog { commits, total })
  }
}

/// Build a `Commit` from the object database
pub(crate) fn load_commit(repo: &gix::Repository, id: gix::ObjectId) -> VcsResult<Commit> {
  let object = repo.find_object(id).map_err(VcsError::native)?;
  let commit = object.try_into_commit().map_err(VcsError::native)?;
  let decoded = commit.decode().map_err(VcsError::native)?;

  let author = decoded.author();
  let committer = decoded.committer();

  let message = decoded.message.to_string();
  let message = message.strip_suffix('\n').unwrap_or(&message).to_string();

  Ok(Commit {
    id: CommitId::new(id.to_string()),
    author: Signature {
      name: author.name.to_string(),
      email: author.email.to_string(),
      date: parse_raw_git_time(std::str::from_utf8(author.time.as_ref())?)?,
    },
    committer: Some(Signature {
      name: committer.name.to_string(),
      email: committer.email.to_string(),
      date: parse_raw_git_time(std::str::from_utf8(committer.time.as_ref())?)?,
    }),
    message,
    parents: decoded.parents().map(|p| CommitId::new(p.to_string())).collect(),
  })
}

/// Object id of the entry at `path` in a commit's tree
pub(crate) fn entry_id(repo: &gix::Repository, commit: gix::ObjectId, path: &str) -> VcsResult<Option<gix::ObjectId>> {
  let commit = repo
    .find_object(commit)
    .map_err(VcsError::native)?
    .try_into_commit()
    .map_err(VcsError::native)?;
  let tree = commit.tree().map_err(VcsError::native)?;
  if path == "." {
    return Ok(Some(tree.id));
  }
  let entry = tree.lookup_entry_by_path(Path::new(path)).map_err(VcsError::native)?;
  Ok(entry.map(|e| e.object_id()))
}

/// Whether a commit changed `path` relative to every parent
///
/// Merges identical to one parent at `path` do not count, which matches
/// `git log -- <path>` history simplification.
fn touches_path(repo: &gix::Repository, id: gix::ObjectId, path: &str) -> VcsResult<bool> {
  let own = entry_id(repo, id, path)?;
  let commit = repo
    .find_object(id)
    .map_err(VcsError::native)?
    .try_into_commit()
    .map_err(VcsError::native)?;
  let parents: Vec<gix::ObjectId> = commit.parent_ids().map(|p| p.detach()).collect();

  if parents.is_empty() {
    return Ok(own.is_some());
  }
  for parent in parents {
    if entry_id(repo, parent, path)? == own {
      return Ok(false);
    }
  }
  Ok(true)
}

/// Every commit reachable from `tip`
fn ancestors(repo: &gix::Repository, tip: gix::ObjectId) -> VcsResult<HashSet<gix::ObjectId>> {
  let mut seen = HashSet::new();
  for info in repo.rev_walk([tip]).all().map_err(VcsError::native)? {
    seen.insert(info.map_err(VcsError::native)?.id);
  }
  Ok(seen)
}

impl RefLister for GixGit {
  fn branches(&self, opt: &BranchesOptions) -> VcsResult<Vec<Branch>> {
    let repo = self.local();
    let platform = repo.references().map_err(VcsError::native)?;

    let mut branches = Vec::new();
    for reference in platform.local_branches().map_err(VcsError::native)? {
      let mut reference = reference.map_err(VcsError::native)?;
      let name = reference.name().shorten().to_string();
      let head = reference.peel_to_id().map_err(VcsError::native)?.detach();
      branches.push((name, head));
    }
    branches.sort_by(|a, b| a.0.cmp(&b.0));

    let reference = match &opt.behind_ahead_branch {
      Some(name) => {
        let id = self.resolve_branch(name)?;
        let oid = gix::ObjectId::from_hex(id.as_str().as_bytes()).map_err(VcsError::native)?;
        Some(ancestors(&repo, oid)?)
      }
      None => None,
    };

    branches
      .into_iter()
      .map(|(name, head)| -> VcsResult<Branch> {
        let counts = match &reference {
          Some(base) => {
            let own = ancestors(&repo, head)?;
            Some(BehindAhead {
              behind: base.difference(&own).count() as u64,
              ahead: own.difference(base).count() as u64,
            })
          }
          None => None,
        };
        Ok(Branch {
          name,
          head: CommitId::new(head.to_string()),
          counts,
        })
      })
      .collect()
  }

  fn tags(&self) -> VcsResult<Vec<Tag>> {
    let repo = self.local();
    let platform = repo.references().map_err(VcsError::native)?;

    let mut tags = Vec::new();
    for reference in platform.tags().map_err(VcsError::native)? {
      let mut reference = reference.map_err(VcsError::native)?;
      let name = reference.name().shorten().to_string();
      // annotated tags peel through to the tagged commit
      let id = reference.peel_to_id().map_err(VcsError::native)?;
      tags.push(Tag {
        name,
        commit_id: CommitId::new(id.to_string()),
      });
    }
    tags.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(tags)
  }
}

impl FileTreeReader for GixGit {
  fn file_system(&self, at: &CommitId) -> VcsResult<Box<dyn FileSystem>> {
    check_spec_arg_safety(at.as_str())?;
    let repo = self.local();
    let id = Self::peel(&repo, at.as_str()).map_err(|e| {
      if e.is_not_found() {
        VcsError::commit_not_found(at.as_str())
      } else {
        e
      }
    })?;
    let commit = load_commit(&repo, id)?;
    let tree = entry_id(&repo, id, ".")?.ok_or_else(|| VcsError::commit_not_found(at.as_str()))?;
    Ok(Box::new(GixFs::new(self.repo.clone(), tree, commit.author.date)))
  }
}
