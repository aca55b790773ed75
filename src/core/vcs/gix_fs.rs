//! Tree view at a commit read straight from git objects
//!
//! Every entry reports the snapshot commit's author date as its
//! modification time; no history is walked.

use crate::core::error::{VcsError, VcsResult};
use crate::core::fs::{FileInfo, FileMode, FileReader, FileSystem};
use crate::utils::{base_name, clean_path, escapes_root};
use chrono::{DateTime, FixedOffset};
use gix::objs::tree::EntryKind;
use std::io::Cursor;
use std::path::Path;

pub(crate) struct GixFs {
  repo: gix::ThreadSafeRepository,
  tree: gix::ObjectId,
  mod_time: DateTime<FixedOffset>,
}

/// Resolved tree entry
struct Located {
  mode: FileMode,
  id: gix::ObjectId,
}

fn map_kind(kind: EntryKind) -> FileMode {
  match kind {
    EntryKind::Tree => FileMode::DIRECTORY,
    EntryKind::Blob => FileMode::FILE,
    EntryKind::BlobExecutable => FileMode::EXECUTABLE,
    EntryKind::Link => FileMode::LINK,
    EntryKind::Commit => FileMode::GITLINK,
  }
}

impl GixFs {
  pub(crate) fn new(repo: gix::ThreadSafeRepository, tree: gix::ObjectId, mod_time: DateTime<FixedOffset>) -> Self {
    Self { repo, tree, mod_time }
  }

  fn locate(&self, repo: &gix::Repository, path: &str) -> VcsResult<Located> {
    if path == "." {
      return Ok(Located {
        mode: FileMode::DIRECTORY,
        id: self.tree,
      });
    }
    if escapes_root(path) {
      return Err(VcsError::path_not_found(path));
    }
    let tree = repo
      .find_object(self.tree)
      .map_err(VcsError::native)?
      .try_into_tree()
      .map_err(VcsError::native)?;
    let entry = tree
      .lookup_entry_by_path(Path::new(path))
      .map_err(VcsError::native)?
      .ok_or_else(|| VcsError::path_not_found(path))?;
    Ok(Located {
      mode: map_kind(entry.mode().kind()),
      id: entry.object_id(),
    })
  }

  fn blob_size(repo: &gix::Repository, mode: FileMode, id: gix::ObjectId) -> VcsResult<u64> {
    if mode.is_dir() || mode.is_submodule() {
      return Ok(0);
    }
    let object = repo.find_object(id).map_err(VcsError::native)?;
    Ok(object.data.len() as u64)
  }

  fn info(&self, repo: &gix::Repository, name: &str, mode: FileMode, id: gix::ObjectId) -> VcsResult<FileInfo> {
    Ok(FileInfo {
      name: name.to_string(),
      mode,
      size: Self::blob_size(repo, mode, id)?,
      mod_time: self.mod_time,
    })
  }
}

impl FileSystem for GixFs {
  fn open(&self, path: &str) -> VcsResult<FileReader> {
    let path = clean_path(path);
    let repo = self.repo.to_thread_local();
    let located = self.locate(&repo, &path)?;
    if located.mode.is_dir() || located.mode.is_submodule() {
      return Err(VcsError::invalid_argument(format!("cannot open a directory: {}", path)));
    }
    let blob = repo.find_object(located.id).map_err(VcsError::native)?.detach();
    Ok(Cursor::new(blob.data))
  }

  fn lstat(&self, path: &str) -> VcsResult<FileInfo> {
    let path = clean_path(path);
    let repo = self.repo.to_thread_local();
    let located = self.locate(&repo, &path)?;
    self.info(&repo, base_name(&path), located.mode, located.id)
  }

  fn read_dir(&self, path: &str) -> VcsResult<Vec<FileInfo>> {
    let path = clean_path(path);
    let repo = self.repo.to_thread_local();
    let located = self.locate(&repo, &path)?;
    if !located.mode.is_dir() {
      return Err(VcsError::invalid_argument(format!("not a directory: {}", path)));
    }

    let tree = repo
      .find_object(located.id)
      .map_err(VcsError::native)?
      .try_into_tree()
      .map_err(VcsError::native)?;

    let mut infos = Vec::new();
    for entry in tree.iter() {
      let entry = entry.map_err(VcsError::native)?;
      let name = entry.filename().to_string();
      let mode = map_kind(entry.mode().kind());
      infos.push(self.info(&repo, &name, mode, entry.oid().to_owned())?);
    }
    Ok(infos)
  }
}
