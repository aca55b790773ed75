//! Mercurial binary deltas
//!
//! A delta is a sequence of fragments, each a big-endian `(start, end, len)`
//! header followed by `len` replacement bytes for `base[start..end]`.
//! Fragments are sorted and never overlap.

use crate::core::error::{VcsError, VcsResult};

const HEADER_LEN: usize = 12;

fn be_u32(bytes: &[u8]) -> usize {
  u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
}

/// Apply one delta to `base`
pub(crate) fn apply(base: &[u8], delta: &[u8]) -> VcsResult<Vec<u8>> {
  let mut out = Vec::with_capacity(base.len() + delta.len());
  let mut last = 0usize;
  let mut pos = 0usize;

  while pos < delta.len() {
    if delta.len() - pos < HEADER_LEN {
      return Err(VcsError::parse("revlog delta", "truncated fragment header"));
    }
    let start = be_u32(&delta[pos..]);
    let end = be_u32(&delta[pos + 4..]);
    let len = be_u32(&delta[pos + 8..]);
    pos += HEADER_LEN;

    if start < last || end < start || end > base.len() {
      return Err(VcsError::parse(
        "revlog delta",
        format!("fragment {}..{} out of order for a {} byte base", start, end, base.len()),
      ));
    }
    let Some(data) = delta.get(pos..pos + len) else {
      return Err(VcsError::parse("revlog delta", "truncated fragment data"));
    };

    out.extend_from_slice(&base[last..start]);
    out.extend_from_slice(data);
    last = end;
    pos += len;
  }

  out.extend_from_slice(&base[last..]);
  Ok(out)
}

#[cfg(test)]
pub(crate) fn fragment(start: u32, end: u32, data: &[u8]) -> Vec<u8> {
  let mut out = Vec::new();
  out.extend_from_slice(&start.to_be_bytes());
  out.extend_from_slice(&end.to_be_bytes());
  out.extend_from_slice(&(data.len() as u32).to_be_bytes());
  out.extend_from_slice(data);
  out
}
