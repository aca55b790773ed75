//! Tree view at a changeset read from the manifest and filelogs
//!
//! File modification times are the date of the changeset a file revision is
//! linked to (its linkrev). Synthesized directories and the root report the
//! snapshot changeset's date.

use super::changelog::Changeset;
use super::manifest::ManifestEntry;
use super::revlog::Revlog;
use super::store::Store;
use crate::core::error::{VcsError, VcsResult};
use crate::core::fs::{Child, FileInfo, FileReader, FileSystem, Lookup, ManifestDirs};
use crate::utils::{base_name, clean_path};
use chrono::{DateTime, FixedOffset};
use rayon::prelude::*;
use std::io::Cursor;
use std::sync::Arc;

pub(crate) struct HgNativeFs {
  store: Arc<Store>,
  changelog: Arc<Revlog>,
  dirs: ManifestDirs<ManifestEntry>,
  date: DateTime<FixedOffset>,
}

impl HgNativeFs {
  pub fn new(
    store: Arc<Store>,
    changelog: Arc<Revlog>,
    entries: Vec<(String, ManifestEntry)>,
    date: DateTime<FixedOffset>,
  ) -> Self {
    Self {
      store,
      changelog,
      dirs: ManifestDirs::new(entries),
      date,
    }
  }

  fn linked_date(&self, link: i32) -> VcsResult<DateTime<FixedOffset>> {
    let Ok(rev) = usize::try_from(link) else {
      return Ok(self.date);
    };
    Ok(Changeset::parse(&self.changelog.revision(rev)?)?.date)
  }

  fn file_info(&self, path: &str, entry: &ManifestEntry) -> VcsResult<FileInfo> {
    let (content, link) = self.store.read_file(path, &entry.node)?;
    Ok(FileInfo {
      name: base_name(path).to_string(),
      mode: entry.mode,
      size: content.len() as u64,
      mod_time: self.linked_date(link)?,
    })
  }
}

impl FileSystem for HgNativeFs {
  fn open(&self, path: &str) -> VcsResult<FileReader> {
    let path = clean_path(path);
    match self.dirs.lookup(&path) {
      Lookup::File(entry) => Ok(Cursor::new(self.store.read_file(&path, &entry.node)?.0)),
      Lookup::Dir => Err(VcsError::invalid_argument(format!("cannot open a directory: {}", path))),
      Lookup::Missing => Err(VcsError::path_not_found(path)),
    }
  }

  fn lstat(&self, path: &str) -> VcsResult<FileInfo> {
    let path = clean_path(path);
    match self.dirs.lookup(&path) {
      Lookup::File(entry) => self.file_info(&path, entry),
      Lookup::Dir => Ok(FileInfo::dir(base_name(&path), self.date)),
      Lookup::Missing => Err(VcsError::path_not_found(path)),
    }
  }

  fn read_dir(&self, path: &str) -> VcsResult<Vec<FileInfo>> {
    let path = clean_path(path);
    self
      .dirs
      .children(&path)?
      .par_iter()
      .map(|child| match child {
        Child::File(full, entry) => self.file_info(full, entry),
        Child::Dir(full) => Ok(FileInfo::dir(base_name(full), self.date)),
      })
      .collect()
  }
}
