//! Tree view at a commit via `git ls-tree` / `git cat-file`
//!
//! Modification times are the author date of the newest commit at or before
//! the snapshot that touched the entry, one `git log -1` per entry.

use super::system_git::SystemGit;
use super::system_git_ops::parse_iso_date;
use crate::core::error::{VcsError, VcsResult};
use crate::core::fs::{FileInfo, FileMode, FileReader, FileSystem};
use crate::core::repository::FileTreeReader;
use crate::core::types::CommitId;
use crate::utils::{base_name, check_spec_arg_safety, clean_path, escapes_root};
use chrono::{DateTime, FixedOffset};
use rayon::prelude::*;
use std::io::Cursor;

impl FileTreeReader for SystemGit {
  fn file_system(&self, at: &CommitId) -> VcsResult<Box<dyn FileSystem>> {
    check_spec_arg_safety(at.as_str())?;
    self.verify_commit(at)?;
    Ok(Box::new(GitCmdFs {
      git: self.clone(),
      at: at.clone(),
    }))
  }
}

struct GitCmdFs {
  git: SystemGit,
  at: CommitId,
}

/// One `ls-tree -l` record
#[derive(Debug, PartialEq)]
struct TreeEntry {
  mode: FileMode,
  object: String,
  size: u64,
  path: String,
}

impl GitCmdFs {
  /// `git ls-tree -z -l <at> -- <target>`
  fn ls_tree(&self, target: Option<&str>) -> VcsResult<Vec<TreeEntry>> {
    let mut args = vec!["ls-tree", "-z", "-l", "--full-tree", self.at.as_str()];
    if let Some(t) = target {
      args.push("--");
      args.push(t);
    }
    let output = self.git.run_checked(&args)?;
    parse_ls_tree(&output.stdout)
  }

  fn entry(&self, path: &str) -> VcsResult<TreeEntry> {
    if escapes_root(path) {
      return Err(VcsError::path_not_found(path));
    }
    let mut entries = self.ls_tree(Some(path))?;
    match entries.iter().position(|e| e.path == path) {
      Some(idx) => Ok(entries.swap_remove(idx)),
      None => Err(VcsError::path_not_found(path)),
    }
  }

  /// Author date of the newest commit touching `path` (the snapshot itself for ".")
  fn mod_time(&self, path: &str) -> VcsResult<DateTime<FixedOffset>> {
    let mut args = vec!["log", "-1", "--format=%aI", self.at.as_str()];
    if path != "." {
      args.push("--");
      args.push(path);
    }
    let output = self.git.run_checked(&args)?;
    let text = output.stdout_str();
    if text.trim().is_empty() {
      return Err(VcsError::path_not_found(path));
    }
    parse_iso_date(&text)
  }

  fn info(&self, entry: &TreeEntry) -> VcsResult<FileInfo> {
    Ok(FileInfo {
      name: base_name(&entry.path).to_string(),
      mode: entry.mode,
      size: entry.size,
      mod_time: self.mod_time(&entry.path)?,
    })
  }
}

impl FileSystem for GitCmdFs {
  fn open(&self, path: &str) -> VcsResult<FileReader> {
    let path = clean_path(path);
    if path == "." {
      return Err(VcsError::invalid_argument("cannot open a directory: ."));
    }
    let entry = self.entry(&path)?;
    if entry.mode.is_dir() || entry.mode.is_submodule() {
      return Err(VcsError::invalid_argument(format!("cannot open a directory: {}", path)));
    }
    let output = self.git.run_checked(["cat-file", "blob", entry.object.as_str()])?;
    Ok(Cursor::new(output.stdout))
  }

  fn lstat(&self, path: &str) -> VcsResult<FileInfo> {
    let path = clean_path(path);
    if path == "." {
      return Ok(FileInfo::dir(".", self.mod_time(".")?));
    }
    let entry = self.entry(&path)?;
    self.info(&entry)
  }

  fn read_dir(&self, path: &str) -> VcsResult<Vec<FileInfo>> {
    let path = clean_path(path);
    let entries = if path == "." {
      self.ls_tree(None)?
    } else {
      if !self.entry(&path)?.mode.is_dir() {
        return Err(VcsError::invalid_argument(format!("not a directory: {}", path)));
      }
      self.ls_tree(Some(&format!("{}/", path)))?
    };

    // one history query per entry, run concurrently
    entries.par_iter().map(|e| self.info(e)).collect()
  }
}

/// Parse `mode SP type SP object SP size TAB path NUL` records
fn parse_ls_tree(out: &[u8]) -> VcsResult<Vec<TreeEntry>> {
  let mut entries = Vec::new();
  for record in out.split(|b| *b == 0).filter(|r| !r.is_empty()) {
    let record = String::from_utf8_lossy(record);
    let Some((meta, path)) = record.split_once('\t') else {
      return Err(VcsError::parse("git ls-tree record", &record));
    };
    let fields: Vec<&str> = meta.split_whitespace().collect();
    let [mode, _kind, object, size] = fields.as_slice() else {
      return Err(VcsError::parse("git ls-tree record", &record));
    };
    let mode = FileMode::from_git_octal(mode).ok_or_else(|| VcsError::parse("git tree entry mode", mode))?;
    // "-" for trees and submodules
    let size = size.parse().unwrap_or(0);
    entries.push(TreeEntry {
      mode,
      object: object.to_string(),
      size,
      path: path.to_string(),
    });
  }
  Ok(entries)
}
