//! Tree view at a changeset via `hg manifest` / `hg cat`
//!
//! The manifest is read once when the view is created; directories are
//! synthesized from it. Modification times come from one `hg log -l 1` per
//! entry, limited to ancestors of the snapshot.

use super::system_hg::SystemHg;
use crate::core::error::{VcsError, VcsResult};
use crate::core::fs::{Child, FileInfo, FileMode, FileReader, FileSystem, Lookup, ManifestDirs};
use crate::core::repository::FileTreeReader;
use crate::core::types::CommitId;
use crate::utils::{base_name, check_spec_arg_safety, clean_path};
use chrono::{DateTime, FixedOffset};
use rayon::prelude::*;
use std::io::Cursor;
use tracing::trace;

const DATE_TEMPLATE: &str = "{date|rfc3339date}";

impl FileTreeReader for SystemHg {
  fn file_system(&self, at: &CommitId) -> VcsResult<Box<dyn FileSystem>> {
    check_spec_arg_safety(at.as_str())?;
    self.verify_commit(at)?;

    let output = self.run_checked(["manifest", "--debug", "-r", at.as_str()])?;
    let dirs = ManifestDirs::new(parse_manifest(&output.stdout_str())?);
    trace!(at = %at, files = dirs.len(), "loaded hg manifest");

    let output = self.run_checked(["log", "-r", at.as_str(), "--template", DATE_TEMPLATE])?;
    let date = parse_date(&output.stdout_str())?;

    Ok(Box::new(HgCmdFs {
      hg: self.clone(),
      at: at.clone(),
      dirs,
      date,
    }))
  }
}

struct HgCmdFs {
  hg: SystemHg,
  at: CommitId,
  dirs: ManifestDirs<FileMode>,
  /// Date of the snapshot changeset, used for the root
  date: DateTime<FixedOffset>,
}

impl HgCmdFs {
  /// Date of the newest ancestor changeset touching `path` (file or directory)
  fn mod_time(&self, path: &str) -> VcsResult<DateTime<FixedOffset>> {
    if path == "." {
      return Ok(self.date);
    }
    let revset = format!("reverse(::{})", self.at);
    let pattern = format!("path:{}", path);
    let output = self.hg.run_checked([
      "log",
      "-l",
      "1",
      "-r",
      revset.as_str(),
      "--template",
      DATE_TEMPLATE,
      "--",
      pattern.as_str(),
    ])?;
    let text = output.stdout_str();
    if text.trim().is_empty() {
      return Err(VcsError::path_not_found(path));
    }
    parse_date(&text)
  }

  fn cat(&self, path: &str) -> VcsResult<Vec<u8>> {
    let pattern = format!("path:{}", path);
    let output = self
      .hg
      .run_checked(["cat", "-r", self.at.as_str(), "--", pattern.as_str()])?;
    Ok(output.stdout)
  }

  fn file_info(&self, path: &str, mode: FileMode) -> VcsResult<FileInfo> {
    Ok(FileInfo {
      name: base_name(path).to_string(),
      mode,
      size: self.cat(path)?.len() as u64,
      mod_time: self.mod_time(path)?,
    })
  }

  fn dir_info(&self, path: &str) -> VcsResult<FileInfo> {
    Ok(FileInfo::dir(base_name(path), self.mod_time(path)?))
  }
}

impl FileSystem for HgCmdFs {
  fn open(&self, path: &str) -> VcsResult<FileReader> {
    let path = clean_path(path);
    match self.dirs.lookup(&path) {
      Lookup::File(_) => Ok(Cursor::new(self.cat(&path)?)),
      Lookup::Dir => Err(VcsError::invalid_argument(format!("cannot open a directory: {}", path))),
      Lookup::Missing => Err(VcsError::path_not_found(path)),
    }
  }

  fn lstat(&self, path: &str) -> VcsResult<FileInfo> {
    let path = clean_path(path);
    match self.dirs.lookup(&path) {
      Lookup::File(mode) => self.file_info(&path, *mode),
      Lookup::Dir => self.dir_info(&path),
      Lookup::Missing => Err(VcsError::path_not_found(path)),
    }
  }

  fn read_dir(&self, path: &str) -> VcsResult<Vec<FileInfo>> {
    let path = clean_path(path);
    let children = self.dirs.children(&path)?;
    children
      .par_iter()
      .map(|child| match child {
        Child::File(full, mode) => self.file_info(full, **mode),
        Child::Dir(full) => self.dir_info(full),
      })
      .collect()
  }
}

/// Parse `hg manifest --debug` lines: `<node> <perm> <flag> <path>`
///
/// The flag column is `*` for executables, `@` for symlinks and blank otherwise.
fn parse_manifest(text: &str) -> VcsResult<Vec<(String, FileMode)>> {
  let mut entries = Vec::new();
  for line in text.lines().filter(|l| !l.is_empty()) {
    if line.len() < 48 || !line.is_char_boundary(47) {
      return Err(VcsError::parse("hg manifest line", line));
    }
    let mode = match line.as_bytes()[45] {
      b'*' => FileMode::EXECUTABLE,
      b'@' => FileMode::LINK,
      b' ' => FileMode::FILE,
      _ => return Err(VcsError::parse("hg manifest flag", line)),
    };
    entries.push((line[47..].to_string(), mode));
  }
  Ok(entries)
}

fn parse_date(text: &str) -> VcsResult<DateTime<FixedOffset>> {
  DateTime::parse_from_rfc3339(text.trim()).map_err(|e| VcsError::parse(format!("hg date {:?}", text.trim()), e))
}
