//! Read-only view of the tree at one commit
//!
//! Paths are `/`-separated and relative to the repository root; they are
//! cleaned before lookup, so `"/dir1//file1"` and `"dir1/file1"` are the same
//! entry and `""`, `"/"` and `"."` all name the root.

mod synth;

pub(crate) use synth::{Child, Lookup, ManifestDirs};

use crate::core::error::{VcsError, VcsResult};
use crate::utils::{base_name, clean_path, dir_name, escapes_root, join_path};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;

/// Seekable reader over a file's full content
pub type FileReader = Cursor<Vec<u8>>;

/// Unix-style mode: type bits plus permission bits
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileMode(pub u32);

impl FileMode {
  pub const TYPE_MASK: u32 = 0o170_000;
  pub const REGULAR: u32 = 0o100_000;
  pub const DIR: u32 = 0o040_000;
  pub const SYMLINK: u32 = 0o120_000;
  /// Submodule (git gitlink)
  pub const SUBMODULE: u32 = 0o160_000;

  pub const FILE: FileMode = FileMode(Self::REGULAR | 0o644);
  pub const EXECUTABLE: FileMode = FileMode(Self::REGULAR | 0o755);
  pub const DIRECTORY: FileMode = FileMode(Self::DIR | 0o755);
  pub const LINK: FileMode = FileMode(Self::SYMLINK | 0o777);
  pub const GITLINK: FileMode = FileMode(Self::SUBMODULE);

  /// Map a git tree-entry mode (as octal text, e.g. `100755`)
  pub fn from_git_octal(mode: &str) -> Option<FileMode> {
    let bits = u32::from_str_radix(mode, 8).ok()?;
    Some(match bits & Self::TYPE_MASK {
      Self::DIR => Self::DIRECTORY,
      Self::SYMLINK => Self::LINK,
      Self::SUBMODULE => Self::GITLINK,
      Self::REGULAR if bits & 0o111 != 0 => Self::EXECUTABLE,
      Self::REGULAR => Self::FILE,
      _ => return None,
    })
  }

  pub fn file_type(self) -> u32 {
    self.0 & Self::TYPE_MASK
  }

  pub fn is_dir(self) -> bool {
    self.file_type() == Self::DIR
  }

  pub fn is_regular(self) -> bool {
    self.file_type() == Self::REGULAR
  }

  pub fn is_symlink(self) -> bool {
    self.file_type() == Self::SYMLINK
  }

  pub fn is_submodule(self) -> bool {
    self.file_type() == Self::SUBMODULE
  }

  pub fn is_executable(self) -> bool {
    self.is_regular() && self.0 & 0o111 != 0
  }
}

impl fmt::Debug for FileMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "FileMode({:06o})", self.0)
  }
}

/// Metadata of one tree entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
  /// Leaf name (`"."` for the root)
  pub name: String,
  pub mode: FileMode,
  /// Content length in bytes; 0 for directories and submodules
  pub size: u64,
  pub mod_time: DateTime<FixedOffset>,
}

impl FileInfo {
  pub fn is_dir(&self) -> bool {
    self.mode.is_dir()
  }

  pub(crate) fn dir(name: impl Into<String>, mod_time: DateTime<FixedOffset>) -> Self {
    FileInfo {
      name: name.into(),
      mode: FileMode::DIRECTORY,
      size: 0,
      mod_time,
    }
  }
}

/// File tree at a fixed commit
pub trait FileSystem: Send + Sync {
  /// Full content of a file (a symlink yields its target path)
  fn open(&self, path: &str) -> VcsResult<FileReader>;

  /// Entry metadata without following symlinks
  fn lstat(&self, path: &str) -> VcsResult<FileInfo>;

  /// Directory entries in tree order
  fn read_dir(&self, path: &str) -> VcsResult<Vec<FileInfo>>;

  /// Entry metadata, following one level of symlink
  ///
  /// The target is resolved relative to the link's directory and the result
  /// keeps the link's own name.
  fn stat(&self, path: &str) -> VcsResult<FileInfo> {
    let path = clean_path(path);
    let info = self.lstat(&path)?;
    if !info.mode.is_symlink() {
      return Ok(info);
    }

    let target = self.open(&path)?.into_inner();
    let target = String::from_utf8(target).map_err(|e| VcsError::parse(format!("symlink target of {}", path), e))?;
    let resolved = join_path(dir_name(&path), target.trim_end_matches('\n'));
    if escapes_root(&resolved) {
      return Err(VcsError::path_not_found(resolved));
    }

    let mut resolved_info = self.lstat(&resolved)?;
    resolved_info.name = base_name(&path).to_string();
    Ok(resolved_info)
  }
}
