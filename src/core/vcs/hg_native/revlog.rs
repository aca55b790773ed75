//! Revlog (version 1) reader
//!
//! A revlog is an index of fixed 64-byte entries plus a data segment of
//! compressed chunks. Inline revlogs interleave each entry with its chunk in
//! the `.i` file; otherwise chunks live in the `.d` file. A revision's text is
//! its chain base snapshot with every later delta of the chain applied.

use super::mpatch;
use crate::core::error::{VcsError, VcsResult};
use std::collections::HashMap;
use std::path::Path;
use tracing::trace;

pub(crate) type Node = [u8; 20];

pub(crate) const NULL_NODE: Node = [0; 20];

const ENTRY_LEN: usize = 64;
const VERSION_1: u32 = 1;
const FLAG_INLINE: u32 = 1 << 16;
const FLAG_GENERALDELTA: u32 = 1 << 17;

#[derive(Debug, Clone, Copy)]
pub(crate) struct IndexEntry {
  offset: u64,
  compressed_len: usize,
  uncompressed_len: i32,
  base: i32,
  /// Changelog revision that introduced this revision
  pub link: i32,
  pub p1: i32,
  pub p2: i32,
  pub node: Node,
}

pub(crate) struct Revlog {
  entries: Vec<IndexEntry>,
  /// Start of each entry's chunk within `data`
  chunk_starts: Vec<usize>,
  data: Vec<u8>,
  general_delta: bool,
  by_node: HashMap<Node, usize>,
}

fn be_i32(bytes: &[u8]) -> i32 {
  i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn optional_rev(rev: i32) -> Option<usize> {
  usize::try_from(rev).ok()
}

impl Revlog {
  /// Read a revlog from disk; a missing index is an empty revlog
  pub fn open(index: &Path, data: &Path) -> VcsResult<Self> {
    let index_bytes = match std::fs::read(index) {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::empty()),
      Err(e) => return Err(VcsError::from(e).context(format!("reading {}", index.display()))),
    };
    let revlog = Self::parse(index_bytes, || {
      std::fs::read(data).map_err(|e| VcsError::from(e).context(format!("reading {}", data.display())))
    })?;
    trace!(index = %index.display(), revisions = revlog.len(), "opened revlog");
    Ok(revlog)
  }

  fn empty() -> Self {
    Self {
      entries: Vec::new(),
      chunk_starts: Vec::new(),
      data: Vec::new(),
      general_delta: false,
      by_node: HashMap::new(),
    }
  }

  /// Parse index bytes; `read_data` is only called for non-inline revlogs
  pub fn parse(index: Vec<u8>, read_data: impl FnOnce() -> VcsResult<Vec<u8>>) -> VcsResult<Self> {
    if index.is_empty() {
      return Ok(Self::empty());
    }
    if index.len() < ENTRY_LEN {
      return Err(VcsError::parse("revlog index", "shorter than one entry"));
    }

    let header = u32::from_be_bytes([index[0], index[1], index[2], index[3]]);
    let version = header & 0xFFFF;
    if version != VERSION_1 {
      return Err(VcsError::unsupported("revlog format other than version 1", format!("hg-native (version {})", version)));
    }
    let inline = header & FLAG_INLINE != 0;
    let general_delta = header & FLAG_GENERALDELTA != 0;

    let mut entries = Vec::new();
    let mut chunk_starts = Vec::new();
    let mut pos = 0usize;
    while pos < index.len() {
      let Some(raw) = index.get(pos..pos + ENTRY_LEN) else {
        return Err(VcsError::parse("revlog index", format!("truncated entry at byte {}", pos)));
      };
      let offset_flags = u64::from_be_bytes([raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7]]);
      let mut node = [0u8; 20];
      node.copy_from_slice(&raw[32..52]);
      let entry = IndexEntry {
        // the first entry's offset bytes hold the header instead
        offset: if entries.is_empty() { 0 } else { offset_flags >> 16 },
        compressed_len: usize::try_from(be_i32(&raw[8..12]))
          .map_err(|_| VcsError::parse("revlog index", "negative chunk length"))?,
        uncompressed_len: be_i32(&raw[12..16]),
        base: be_i32(&raw[16..20]),
        link: be_i32(&raw[20..24]),
        p1: be_i32(&raw[24..28]),
        p2: be_i32(&raw[28..32]),
        node,
      };

      pos += ENTRY_LEN;
      if inline {
        chunk_starts.push(pos);
        pos += entry.compressed_len;
      } else {
        chunk_starts.push(entry.offset as usize);
      }
      entries.push(entry);
    }

    let data = if inline { index } else { read_data()? };
    let by_node = entries.iter().enumerate().map(|(rev, e)| (e.node, rev)).collect();

    Ok(Self {
      entries,
      chunk_starts,
      data,
      general_delta,
      by_node,
    })
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn tip(&self) -> Option<usize> {
    self.entries.len().checked_sub(1)
  }

  pub fn entry(&self, rev: usize) -> VcsResult<&IndexEntry> {
    self
      .entries
      .get(rev)
      .ok_or_else(|| VcsError::parse("revlog revision", format!("{} is past the end ({} revisions)", rev, self.len())))
  }

  pub fn node(&self, rev: usize) -> VcsResult<Node> {
    Ok(self.entry(rev)?.node)
  }

  pub fn rev(&self, node: &Node) -> Option<usize> {
    self.by_node.get(node).copied()
  }

  /// Non-null parents, p1 first
  pub fn parents(&self, rev: usize) -> VcsResult<Vec<usize>> {
    let entry = self.entry(rev)?;
    Ok([entry.p1, entry.p2].into_iter().filter_map(optional_rev).collect())
  }

  /// Revisions whose hex node starts with `prefix`
  pub fn revs_with_prefix(&self, prefix: &str) -> Vec<usize> {
    self
      .entries
      .iter()
      .enumerate()
      .filter(|(_, e)| hex::encode(e.node).starts_with(prefix))
      .map(|(rev, _)| rev)
      .collect()
  }

  fn chunk(&self, rev: usize) -> VcsResult<Vec<u8>> {
    let entry = self.entry(rev)?;
    let start = self.chunk_starts[rev];
    let raw = self
      .data
      .get(start..start + entry.compressed_len)
      .ok_or_else(|| VcsError::parse("revlog data", format!("chunk of revision {} is out of bounds", rev)))?;
    decompress(raw)
  }

  /// Full text of a revision
  pub fn revision(&self, rev: usize) -> VcsResult<Vec<u8>> {
    let mut chain = vec![rev];
    let mut current = rev;
    loop {
      let base = self.entry(current)?.base;
      if optional_rev(base) == Some(current) || base < 0 {
        break;
      }
      let next = if self.general_delta { optional_rev(base) } else { current.checked_sub(1) };
      match next {
        Some(next) if next < current => {
          chain.push(next);
          current = next;
        }
        _ => return Err(VcsError::parse("revlog delta chain", format!("revision {} has a bad base", current))),
      }
    }

    let mut chain = chain.into_iter().rev();
    let Some(base) = chain.next() else {
      return Ok(Vec::new());
    };
    let mut text = self.chunk(base)?;
    for delta_rev in chain {
      text = mpatch::apply(&text, &self.chunk(delta_rev)?)?;
    }

    let expected = self.entry(rev)?.uncompressed_len;
    if expected >= 0 && text.len() != expected as usize {
      return Err(VcsError::parse(
        "revlog revision",
        format!("revision {} is {} bytes, index says {}", rev, text.len(), expected),
      ));
    }
    Ok(text)
  }
}

/// Decode one stored chunk by its type byte
fn decompress(chunk: &[u8]) -> VcsResult<Vec<u8>> {
  match chunk.first() {
    None => Ok(Vec::new()),
    Some(b'\0') => Ok(chunk.to_vec()),
    Some(b'u') => Ok(chunk[1..].to_vec()),
    Some(b'x') => miniz_oxide::inflate::decompress_to_vec_zlib(chunk)
      .map_err(|e| VcsError::parse("zlib revlog chunk", format!("{:?}", e))),
    Some(b'(') => Err(VcsError::unsupported("zstd-compressed revlogs", "hg-native")),
    Some(other) => Err(VcsError::parse("revlog chunk", format!("unknown compression header {:#04x}", other))),
  }
}
