//! Directory synthesis over a flat, file-only manifest
//!
//! Mercurial manifests only list files. A directory exists when at least one
//! manifest path has it as a prefix, and its listing is the set of files right
//! below it plus one entry per distinct next path segment.

use crate::core::error::{VcsError, VcsResult};

/// Manifest paths in byte order with a per-file payload
pub(crate) struct ManifestDirs<E> {
  entries: Vec<(String, E)>,
}

#[derive(Debug)]
pub(crate) enum Lookup<'a, E> {
  File(&'a E),
  Dir,
  Missing,
}

/// One entry of a synthesized listing
#[derive(Debug)]
pub(crate) enum Child<'a, E> {
  /// Full path and payload
  File(&'a str, &'a E),
  /// Full path of the synthesized directory
  Dir(String),
}

impl<E> ManifestDirs<E> {
  pub fn new(mut entries: Vec<(String, E)>) -> Self {
    entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
    Self { entries }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Index of the first entry at or after `prefix`
  fn lower_bound(&self, prefix: &str) -> usize {
    self.entries.partition_point(|(p, _)| p.as_bytes() < prefix.as_bytes())
  }

  /// Classify a cleaned path
  pub fn lookup(&self, path: &str) -> Lookup<'_, E> {
    if path == "." {
      return Lookup::Dir;
    }
    let idx = self.lower_bound(path);
    if let Some((p, e)) = self.entries.get(idx)
      && p == path
    {
      return Lookup::File(e);
    }
    let prefix = format!("{}/", path);
    match self.entries.get(self.lower_bound(&prefix)) {
      Some((p, _)) if p.starts_with(&prefix) => Lookup::Dir,
      _ => Lookup::Missing,
    }
  }

  /// Entries directly below a cleaned directory path, in manifest order
  pub fn children(&self, dir: &str) -> VcsResult<Vec<Child<'_, E>>> {
    match self.lookup(dir) {
      Lookup::Missing => return Err(VcsError::path_not_found(dir)),
      Lookup::File(_) => return Err(VcsError::invalid_argument(format!("not a directory: {}", dir))),
      Lookup::Dir => {}
    }

    let prefix = if dir == "." { String::new() } else { format!("{}/", dir) };
    let mut out = Vec::new();
    let mut last_dir: Option<&str> = None;

    for (path, entry) in &self.entries[self.lower_bound(&prefix)..] {
      let Some(rest) = path.strip_prefix(prefix.as_str()) else {
        break;
      };
      match rest.find('/') {
        None => out.push(Child::File(path.as_str(), entry)),
        Some(idx) => {
          // paths sharing a directory prefix are contiguous in byte order
          let name = &rest[..idx];
          if last_dir != Some(name) {
            last_dir = Some(name);
            out.push(Child::Dir(format!("{}{}", prefix, name)));
          }
        }
      }
    }
    Ok(out)
  }

  /// Every file path at or below a directory
  pub fn files_under<'a>(&'a self, dir: &str) -> impl Iterator<Item = (&'a str, &'a E)> + 'a {
    let prefix = if dir == "." { String::new() } else { format!("{}/", dir) };
    let start = self.lower_bound(&prefix);
    self.entries[start..]
      .iter()
      .take_while(move |(p, _)| p.starts_with(&prefix))
      .map(|(p, e)| (p.as_str(), e))
  }
}
