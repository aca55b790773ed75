//! Repository requirements and store path encoding
//!
//! Where a file's revlog lives depends on the requirements the repository was
//! created with:
//!
//! | requires              | layout                                        |
//! |-----------------------|-----------------------------------------------|
//! | (none)                | `.hg/data/<dir-encoded path>.i`                |
//! | `store`               | `.hg/store/<filename-encoded path>.i`          |
//! | `store` + `fncache`   | hybrid encoding, hashed past 120 bytes         |
//! | `dotencode`           | hybrid encoding also escapes leading `.`/space |

use super::manifest::{self, ManifestEntry};
use super::revlog::{Node, Revlog};
use crate::core::error::{NotFound, VcsError, VcsResult};
use sha1::{Digest, Sha1};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

const MAX_STORE_PATH_LEN: usize = 120;
const DIR_PREFIX_LEN: usize = 8;
const MAX_SHORT_DIRS_LEN: usize = 8 * (DIR_PREFIX_LEN + 1) - 4;

/// Requirements this reader cannot honor
const UNSUPPORTED_REQUIREMENTS: &[&str] = &["treemanifest", "revlogv2", "changelogv2", "revlog-compression-zstd"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
  Basic,
  Encoded,
  Fncache { dotencode: bool },
}

#[derive(Debug)]
pub(crate) struct Store {
  /// `.hg` of the working copy that was opened
  pub hg_dir: PathBuf,
  root: PathBuf,
  layout: Layout,
}

fn read_requires(hg_dir: &Path) -> VcsResult<BTreeSet<String>> {
  match std::fs::read_to_string(hg_dir.join("requires")) {
    Ok(text) => Ok(text.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect()),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeSet::new()),
    Err(e) => Err(VcsError::from(e).context(format!("reading {}", hg_dir.join("requires").display()))),
  }
}

impl Store {
  pub fn open(repo_dir: &Path) -> VcsResult<Self> {
    let hg_dir = repo_dir.join(".hg");
    if !hg_dir.is_dir() {
      return Err(VcsError::NotFound(NotFound::Repository {
        path: repo_dir.to_path_buf(),
      }));
    }

    let mut requires = read_requires(&hg_dir)?;
    let mut source = hg_dir.clone();
    if requires.contains("shared") || requires.contains("relshared") {
      let shared = std::fs::read_to_string(hg_dir.join("sharedpath"))
        .map_err(|e| VcsError::from(e).context("reading .hg/sharedpath"))?;
      let shared = PathBuf::from(shared.trim_end_matches('\n'));
      source = if requires.contains("relshared") { hg_dir.join(shared) } else { shared };
      requires.extend(read_requires(&source)?);
    }
    if requires.contains("share-safe") {
      requires.extend(read_requires(&source.join("store"))?);
    }

    if let Some(req) = UNSUPPORTED_REQUIREMENTS.iter().find(|r| requires.contains(**r)) {
      return Err(VcsError::UnsupportedFormat {
        path: repo_dir.to_path_buf(),
        requirement: req.to_string(),
      });
    }

    let layout = if !requires.contains("store") {
      Layout::Basic
    } else if requires.contains("fncache") {
      Layout::Fncache {
        dotencode: requires.contains("dotencode"),
      }
    } else {
      Layout::Encoded
    };
    let root = if layout == Layout::Basic { source } else { source.join("store") };
    debug!(root = %root.display(), ?layout, "opened hg store");

    Ok(Self { hg_dir, root, layout })
  }

  /// On-disk path of a store file named like `data/<path>.i`
  fn store_path(&self, name: &str) -> PathBuf {
    let encoded = match self.layout {
      Layout::Basic => encode_dir(name),
      Layout::Encoded => encode_filename(&encode_dir(name)),
      Layout::Fncache { dotencode } => hybrid_encode(name, dotencode),
    };
    self.root.join(encoded)
  }

  pub fn changelog(&self) -> VcsResult<Revlog> {
    Revlog::open(&self.root.join("00changelog.i"), &self.root.join("00changelog.d"))
  }

  pub fn manifest_log(&self) -> VcsResult<Revlog> {
    Revlog::open(&self.root.join("00manifest.i"), &self.root.join("00manifest.d"))
  }

  pub fn filelog(&self, path: &str) -> VcsResult<Revlog> {
    Revlog::open(
      &self.store_path(&format!("data/{}.i", path)),
      &self.store_path(&format!("data/{}.d", path)),
    )
  }

  /// Manifest entries for a manifest node
  pub fn read_manifest(&self, manifests: &Revlog, node: &Node) -> VcsResult<Vec<(String, ManifestEntry)>> {
    let rev = manifests
      .rev(node)
      .ok_or_else(|| VcsError::parse("hg manifest", format!("node {} missing from the manifest log", hex::encode(node))))?;
    manifest::parse(&manifests.revision(rev)?)
  }

  /// File content at a file node plus the file revision's linkrev
  pub fn read_file(&self, path: &str, node: &Node) -> VcsResult<(Vec<u8>, i32)> {
    let filelog = self.filelog(path)?;
    let rev = filelog.rev(node).ok_or_else(|| VcsError::path_not_found(path))?;
    let text = filelog.revision(rev)?;
    Ok((manifest::strip_file_metadata(text), filelog.entry(rev)?.link))
  }
}

/// Escape path components that collide with store names
pub(crate) fn encode_dir(path: &str) -> String {
  if !path.contains(".hg/") && !path.contains(".i/") && !path.contains(".d/") {
    return path.to_string();
  }
  path
    .replace(".hg/", ".hg.hg/")
    .replace(".i/", ".i.hg/")
    .replace(".d/", ".d.hg/")
}

fn is_reserved(b: u8) -> bool {
  b < 32 || b >= 126 || b"\\:*?\"<>|".contains(&b)
}

/// Case-folding encoding: `A` → `_a`, `_` → `__`, reserved bytes → `~xx`
pub(crate) fn encode_filename(path: &str) -> String {
  let mut out = String::with_capacity(path.len());
  for &b in path.as_bytes() {
    match b {
      b'A'..=b'Z' => {
        out.push('_');
        out.push(b.to_ascii_lowercase() as char);
      }
      b'_' => out.push_str("__"),
      b if is_reserved(b) => out.push_str(&format!("~{:02x}", b)),
      b => out.push(b as char),
    }
  }
  out
}

/// Lossy variant used for hashed names: upper case folds to lower case
fn lower_encode(path: &str) -> String {
  let mut out = String::with_capacity(path.len());
  for &b in path.as_bytes() {
    match b {
      b'A'..=b'Z' => out.push(b.to_ascii_lowercase() as char),
      b if is_reserved(b) => out.push_str(&format!("~{:02x}", b)),
      b => out.push(b as char),
    }
  }
  out
}

/// Escape Windows reserved names and trailing dots/spaces per component
pub(crate) fn aux_encode(parts: &mut [String], dotencode: bool) {
  for part in parts.iter_mut() {
    if part.is_empty() {
      continue;
    }
    let bytes = part.as_bytes();
    if dotencode && (bytes[0] == b'.' || bytes[0] == b' ') {
      *part = format!("~{:02x}{}", bytes[0], &part[1..]);
    } else {
      let stem_len = part.find('.').unwrap_or(part.len());
      let reserved3 = stem_len == 3 && ["aux", "con", "prn", "nul"].contains(&&part[..3]);
      let reserved4 = stem_len == 4
        && (b'1'..=b'9').contains(&bytes[3])
        && ["com", "lpt"].contains(&&part[..3]);
      if reserved3 || reserved4 {
        *part = format!("{}~{:02x}{}", &part[..2], bytes[2], &part[3..]);
      }
    }
    let last = part.as_bytes()[part.len() - 1];
    if last == b'.' || last == b' ' {
      *part = format!("{}~{:02x}", &part[..part.len() - 1], last);
    }
  }
}

/// Extension as `os.path.splitext` sees it (leading dots belong to the stem)
fn extension(name: &str) -> &str {
  let stem_start = name.len() - name.trim_start_matches('.').len();
  match name[stem_start..].rfind('.') {
    Some(idx) => &name[stem_start + idx..],
    None => "",
  }
}

/// Fixed-length name for store paths too long to encode directly
fn hash_encode(path: &str, dotencode: bool) -> String {
  let digest = hex::encode(Sha1::digest(path.as_bytes()));
  let mut parts: Vec<String> = lower_encode(path.get(5..).unwrap_or("")).split('/').map(String::from).collect();
  aux_encode(&mut parts, dotencode);

  let basename = parts.pop().unwrap_or_default();
  let ext = extension(&basename);

  let mut short_dirs: Vec<String> = Vec::new();
  let mut short_len = 0usize;
  for part in &parts {
    let mut dir: String = part.chars().take(DIR_PREFIX_LEN).collect();
    if dir.ends_with('.') || dir.ends_with(' ') {
      dir.pop();
      dir.push('_');
    }
    let total = if short_len == 0 { dir.len() } else { short_len + 1 + dir.len() };
    if short_len != 0 && total > MAX_SHORT_DIRS_LEN {
      break;
    }
    short_len = total;
    short_dirs.push(dir);
  }

  let mut dirs = short_dirs.join("/");
  if !dirs.is_empty() {
    dirs.push('/');
  }
  let unfilled = format!("dh/{}{}{}", dirs, digest, ext);
  let space_left = MAX_STORE_PATH_LEN.saturating_sub(unfilled.len());
  if space_left == 0 {
    return unfilled;
  }
  let filler: String = basename.chars().take(space_left).collect();
  format!("dh/{}{}{}{}", dirs, filler, digest, ext)
}

/// fncache store encoding of a `data/...` name
pub(crate) fn hybrid_encode(path: &str, dotencode: bool) -> String {
  let dir_encoded = encode_dir(path);
  let mut parts: Vec<String> = encode_filename(&dir_encoded).split('/').map(String::from).collect();
  aux_encode(&mut parts, dotencode);
  let encoded = parts.join("/");
  if encoded.len() > MAX_STORE_PATH_LEN {
    hash_encode(&dir_encoded, dotencode)
  } else {
    encoded
  }
}
