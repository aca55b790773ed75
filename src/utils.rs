//! Path and argument helpers shared by the backends
//!
//! Repository paths are always `/`-separated and relative to the tree root,
//! independent of the host platform, so they are handled as strings rather
//! than `std::path::Path`.

use crate::core::error::{VcsError, VcsResult};

/// Reject revision specifiers that a tool would read as a flag
pub fn check_spec_arg_safety(spec: &str) -> VcsResult<()> {
  if spec.starts_with('-') {
    return Err(VcsError::invalid_argument(format!(
      "invalid revision spec '{}' (must not begin with '-')",
      spec
    )));
  }
  Ok(())
}

/// Lexically clean a tree path
///
/// Duplicate slashes and `.` segments are dropped and `..` segments folded.
/// A leading `/` anchors the path at the root, where `..` stops. Without it,
/// `..` segments that climb above the root are kept (`"a/../../x"` ->
/// `"../x"`), so such paths never alias an entry inside the tree. The root
/// is `"."`.
pub fn clean_path(path: &str) -> String {
  let rooted = path.starts_with('/');
  let mut parts: Vec<&str> = Vec::new();
  for segment in path.split('/') {
    match segment {
      "" | "." => {}
      ".." => match parts.last() {
        Some(&last) if last != ".." => {
          parts.pop();
        }
        _ if !rooted => parts.push(".."),
        _ => {}
      },
      other => parts.push(other),
    }
  }
  if parts.is_empty() { ".".to_string() } else { parts.join("/") }
}

/// Whether a cleaned path points above the tree root
pub fn escapes_root(path: &str) -> bool {
  path == ".." || path.starts_with("../")
}

/// Last path segment (`"a/b/c"` -> `"c"`, `"."` -> `"."`)
pub fn base_name(path: &str) -> &str {
  match path.rfind('/') {
    Some(idx) => &path[idx + 1..],
    None => path,
  }
}

/// Everything before the last segment; `"."` for top-level entries
pub fn dir_name(path: &str) -> &str {
  match path.rfind('/') {
    Some(idx) => &path[..idx],
    None => ".",
  }
}

/// Join a cleaned directory and a relative path, then clean the result
pub fn join_path(dir: &str, rel: &str) -> String {
  if dir == "." {
    clean_path(rel)
  } else {
    clean_path(&format!("{}/{}", dir, rel))
  }
}
