//! Manifest and filelog text formats

use super::revlog::Node;
use crate::core::error::{VcsError, VcsResult};
use crate::core::fs::FileMode;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ManifestEntry {
  pub node: Node,
  pub mode: FileMode,
}

/// Parse `path NUL hex-node [flag] LF` lines
///
/// Entries whose path is not UTF-8 are skipped so the rest of the tree
/// stays readable.
pub(crate) fn parse(text: &[u8]) -> VcsResult<Vec<(String, ManifestEntry)>> {
  let mut entries = Vec::new();
  for line in text.split(|b| *b == b'\n').filter(|l| !l.is_empty()) {
    let Some(sep) = line.iter().position(|b| *b == 0) else {
      return Err(VcsError::parse("hg manifest line", String::from_utf8_lossy(line)));
    };
    let Ok(path) = std::str::from_utf8(&line[..sep]) else {
      warn!(path = %String::from_utf8_lossy(&line[..sep]), "skipping hg manifest entry with non-UTF-8 path");
      continue;
    };
    let path = path.to_string();
    let rest = &line[sep + 1..];
    if rest.len() < 40 {
      return Err(VcsError::parse("hg manifest node", String::from_utf8_lossy(line)));
    }

    let mut node = [0u8; 20];
    hex::decode_to_slice(&rest[..40], &mut node).map_err(|e| VcsError::parse(format!("hg manifest node of {}", path), e))?;
    let mode = match &rest[40..] {
      b"" => FileMode::FILE,
      b"x" => FileMode::EXECUTABLE,
      b"l" => FileMode::LINK,
      b"t" => return Err(VcsError::unsupported("tree manifests", "hg-native")),
      other => {
        return Err(VcsError::parse(
          format!("hg manifest flag of {}", path),
          String::from_utf8_lossy(other),
        ));
      }
    };
    entries.push((path, ManifestEntry { node, mode }));
  }
  Ok(entries)
}

/// Drop the `\x01\n ... \x01\n` copy metadata block a filelog text may start with
pub(crate) fn strip_file_metadata(text: Vec<u8>) -> Vec<u8> {
  const MARKER: &[u8] = b"\x01\n";
  if !text.starts_with(MARKER) {
    return text;
  }
  match text[MARKER.len()..].windows(MARKER.len()).position(|w| w == MARKER) {
    Some(end) => text[MARKER.len() * 2 + end..].to_vec(),
    None => text,
  }
}
