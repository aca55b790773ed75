//! Mercurial store laid out by hand, so the native reader runs without `hg`
//!
//! Revlogs are written the way Mercurial writes version 1 revlogs: real
//! SHA-1 node ids, zlib-compressed snapshots and uncompressed mpatch deltas.

use crate::helpers::{C1_DATE, C2_DATE};
use anyhow::Result;
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub type Node = [u8; 20];

const NULL_NODE: Node = [0; 20];
const VERSION_1: u32 = 1;
const FLAG_INLINE: u32 = 1 << 16;
const FLAG_GENERALDELTA: u32 = 1 << 17;

pub const C3_DATE: &str = "2015-01-01T00:00:00+02:00";
const USER: &str = "Test User <test@example.com>";

/// Revlog under construction
pub struct RevlogWriter {
  inline: bool,
  general_delta: bool,
  texts: Vec<Vec<u8>>,
  nodes: Vec<Node>,
  bases: Vec<i32>,
  index: Vec<u8>,
  data: Vec<u8>,
  offset: u64,
}

fn hash_node(p1: Node, p2: Node, text: &[u8]) -> Node {
  let (lo, hi) = if p1 <= p2 { (p1, p2) } else { (p2, p1) };
  let mut hasher = Sha1::new();
  hasher.update(lo);
  hasher.update(hi);
  hasher.update(text);
  let mut node = [0u8; 20];
  node.copy_from_slice(&hasher.finalize());
  node
}

/// One-fragment delta replacing the span between the common prefix and suffix
fn delta(old: &[u8], new: &[u8]) -> Vec<u8> {
  let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
  let room = old.len().min(new.len()) - prefix;
  let suffix = old
    .iter()
    .rev()
    .zip(new.iter().rev())
    .take(room)
    .take_while(|(a, b)| a == b)
    .count();
  let replacement = &new[prefix..new.len() - suffix];

  let mut out = Vec::new();
  out.extend_from_slice(&(prefix as u32).to_be_bytes());
  out.extend_from_slice(&((old.len() - suffix) as u32).to_be_bytes());
  out.extend_from_slice(&(replacement.len() as u32).to_be_bytes());
  out.extend_from_slice(replacement);
  out
}

impl RevlogWriter {
  pub fn new(inline: bool, general_delta: bool) -> Self {
    Self {
      inline,
      general_delta,
      texts: Vec::new(),
      nodes: Vec::new(),
      bases: Vec::new(),
      index: Vec::new(),
      data: Vec::new(),
      offset: 0,
    }
  }

  fn parent_node(&self, parent: Option<usize>) -> Node {
    parent.map(|rev| self.nodes[rev]).unwrap_or(NULL_NODE)
  }

  /// Append a revision; `delta_from` stores it as a delta against that revision
  pub fn add(&mut self, text: &[u8], delta_from: Option<usize>, link: usize, p1: Option<usize>, p2: Option<usize>) -> Node {
    let rev = self.texts.len();
    let node = hash_node(self.parent_node(p1), self.parent_node(p2), text);

    let (chunk, base) = match delta_from {
      Some(from) => {
        // without generaldelta a delta always applies to the previous revision
        assert!(self.general_delta || from + 1 == rev, "delta must follow its base");
        let base = if self.general_delta { from as i32 } else { self.bases[from] };
        (delta(&self.texts[from], text), base)
      }
      None => (miniz_oxide::deflate::compress_to_vec_zlib(text, 6), rev as i32),
    };

    let mut entry = Vec::with_capacity(64);
    if rev == 0 {
      let mut header = VERSION_1;
      if self.inline {
        header |= FLAG_INLINE;
      }
      if self.general_delta {
        header |= FLAG_GENERALDELTA;
      }
      entry.extend_from_slice(&header.to_be_bytes());
      entry.extend_from_slice(&[0, 0, 0, 0]);
    } else {
      entry.extend_from_slice(&(self.offset << 16).to_be_bytes());
    }
    entry.extend_from_slice(&(chunk.len() as i32).to_be_bytes());
    entry.extend_from_slice(&(text.len() as i32).to_be_bytes());
    entry.extend_from_slice(&base.to_be_bytes());
    entry.extend_from_slice(&(link as i32).to_be_bytes());
    for parent in [p1, p2] {
      let parent = parent.map(|p| p as i32).unwrap_or(-1);
      entry.extend_from_slice(&parent.to_be_bytes());
    }
    entry.extend_from_slice(&node);
    entry.extend_from_slice(&[0u8; 12]);

    self.index.extend(entry);
    if self.inline {
      self.index.extend_from_slice(&chunk);
    } else {
      self.data.extend_from_slice(&chunk);
    }
    self.offset += chunk.len() as u64;

    self.texts.push(text.to_vec());
    self.nodes.push(node);
    self.bases.push(base);
    node
  }

  /// Write `<stem>.i` (and `<stem>.d` when not inline)
  pub fn write(&self, dir: &Path, stem: &str) -> Result<()> {
    let index = dir.join(format!("{}.i", stem));
    if let Some(parent) = index.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&index, &self.index)?;
    if !self.inline {
      std::fs::write(dir.join(format!("{}.d", stem)), &self.data)?;
    }
    Ok(())
  }
}

fn manifest_text(entries: &[(&str, Node, &str)]) -> Vec<u8> {
  let mut sorted = entries.to_vec();
  sorted.sort_by_key(|e| e.0);
  let mut out = Vec::new();
  for (path, node, flag) in sorted {
    out.extend_from_slice(format!("{}\0{}{}\n", path, hex::encode(node), flag).as_bytes());
  }
  out
}

fn changeset_text(manifest: Node, date: &str, extra: &str, files: &[&str], message: &str) -> Result<Vec<u8>> {
  let stamp = chrono::DateTime::parse_from_rfc3339(date)?;
  let west = -stamp.offset().local_minus_utc();
  let extra = if extra.is_empty() { String::new() } else { format!(" {}", extra) };
  let mut files = files.to_vec();
  files.sort();
  Ok(
    format!(
      "{}\n{}\n{} {}{}\n{}\n\n{}",
      hex::encode(manifest),
      USER,
      stamp.timestamp(),
      west,
      extra,
      files.join("\n"),
      message
    )
    .into_bytes(),
  )
}

/// Three changesets written straight into an fncache/dotencode store
///
/// ```text
/// c1 "add dir1/file1"   README, dir1/file1
/// c2 "add file2"        + .hgtags (v1 -> c1), file2 (copied), README grows a line
/// c3 "start v1"         branch v1: + dir1/sub/deep.txt, link1 -> file2,
///                       outside -> ../file2, run.sh (executable)
/// ```
///
/// The working copy parent is c2.
pub struct HgStoreRepo {
  _root: TempDir,
  pub path: PathBuf,
  pub c1: String,
  pub c2: String,
  pub c3: String,
}

impl HgStoreRepo {
  pub fn new() -> Result<Self> {
    let root = TempDir::new()?;
    let path = root.path().join("repo");
    let hg_dir = path.join(".hg");
    let store = hg_dir.join("store");
    std::fs::create_dir_all(&store)?;
    std::fs::write(hg_dir.join("requires"), "dotencode\nfncache\ngeneraldelta\nrevlogv1\nstore\n")?;

    let mut changelog = RevlogWriter::new(true, false);
    let mut manifests = RevlogWriter::new(false, true);

    // c1
    let mut file1 = RevlogWriter::new(true, false);
    let file1_0 = file1.add(b"infile1", None, 0, None, None);
    let mut readme = RevlogWriter::new(true, false);
    let readme_0 = readme.add(b"line one\n", None, 0, None, None);
    let m1 = manifest_text(&[("README", readme_0, ""), ("dir1/file1", file1_0, "")]);
    let m1_node = manifests.add(&m1, None, 0, None, None);
    let c1 = changelog.add(
      &changeset_text(m1_node, C1_DATE, "", &["README", "dir1/file1"], "add dir1/file1")?,
      None,
      0,
      None,
      None,
    );

    // c2
    let readme_1 = readme.add(b"line one\nline two\n", Some(0), 1, Some(0), None);
    let mut tags = RevlogWriter::new(true, false);
    let tags_0 = tags.add(format!("{} v1\n", hex::encode(c1)).as_bytes(), None, 1, None, None);
    let mut file2 = RevlogWriter::new(true, false);
    let copied = format!("\x01\ncopy: dir1/file1\ncopyrev: {}\n\x01\ninfile2", hex::encode(file1_0));
    let file2_0 = file2.add(copied.as_bytes(), None, 1, None, None);
    let m2_entries = [
      (".hgtags", tags_0, ""),
      ("README", readme_1, ""),
      ("dir1/file1", file1_0, ""),
      ("file2", file2_0, ""),
    ];
    let m2_node = manifests.add(&manifest_text(&m2_entries), None, 1, Some(0), None);
    let c2 = changelog.add(
      &changeset_text(m2_node, C2_DATE, "", &[".hgtags", "README", "file2"], "add file2")?,
      None,
      1,
      Some(0),
      None,
    );

    // c3, a manifest delta against the first manifest rather than its parent
    let mut deep = RevlogWriter::new(true, false);
    let deep_0 = deep.add(b"deep\n", None, 2, None, None);
    let mut link = RevlogWriter::new(true, false);
    let link_0 = link.add(b"file2", None, 2, None, None);
    let mut outside = RevlogWriter::new(true, false);
    let outside_0 = outside.add(b"../file2", None, 2, None, None);
    let mut script = RevlogWriter::new(true, false);
    let script_0 = script.add(b"#!/bin/sh\n", None, 2, None, None);
    let mut m3_entries = m2_entries.to_vec();
    m3_entries.extend([
      ("dir1/sub/deep.txt", deep_0, ""),
      ("link1", link_0, "l"),
      ("outside", outside_0, "l"),
      ("run.sh", script_0, "x"),
    ]);
    let m3_node = manifests.add(&manifest_text(&m3_entries), Some(0), 2, Some(1), None);
    let c3 = changelog.add(
      &changeset_text(
        m3_node,
        C3_DATE,
        "branch:v1",
        &["dir1/sub/deep.txt", "link1", "outside", "run.sh"],
        "start v1",
      )?,
      None,
      2,
      Some(1),
      None,
    );

    changelog.write(&store, "00changelog")?;
    manifests.write(&store, "00manifest")?;
    // store names as the fncache/dotencode encoding spells them
    file1.write(&store, "data/dir1/file1")?;
    readme.write(&store, "data/_r_e_a_d_m_e")?;
    tags.write(&store, "data/~2ehgtags")?;
    file2.write(&store, "data/file2")?;
    deep.write(&store, "data/dir1/sub/deep.txt")?;
    link.write(&store, "data/link1")?;
    outside.write(&store, "data/outside")?;
    script.write(&store, "data/run.sh")?;
    std::fs::write(
      store.join("fncache"),
      "data/.hgtags.i\ndata/README.i\ndata/dir1/file1.i\ndata/dir1/sub/deep.txt.i\n\
data/file2.i\ndata/link1.i\ndata/outside.i\ndata/run.sh.i\n",
    )?;

    let mut dirstate = c2.to_vec();
    dirstate.extend_from_slice(&NULL_NODE);
    std::fs::write(hg_dir.join("dirstate"), dirstate)?;

    Ok(Self {
      _root: root,
      path,
      c1: hex::encode(c1),
      c2: hex::encode(c2),
      c3: hex::encode(c3),
    })
  }
}
