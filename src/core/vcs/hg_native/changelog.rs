//! Changeset text format
//!
//! ```text
//! <manifest hex>
//! <user>
//! <unix time> <offset, seconds west of UTC> [extra]
//! <file>...
//!
//! <description>
//! ```

use super::revlog::Node;
use crate::core::error::{VcsError, VcsResult};
use chrono::{DateTime, FixedOffset, TimeZone};
use std::collections::BTreeMap;

pub(crate) const DEFAULT_BRANCH: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Changeset {
  pub manifest: Node,
  pub user: String,
  pub date: DateTime<FixedOffset>,
  pub extra: BTreeMap<String, String>,
  pub files: Vec<String>,
  pub description: String,
}

impl Changeset {
  pub fn parse(text: &[u8]) -> VcsResult<Self> {
    let text = String::from_utf8_lossy(text);
    let (header, description) = match text.find("\n\n") {
      Some(idx) => (&text[..idx], &text[idx + 2..]),
      None => (text.as_ref(), ""),
    };

    let mut lines = header.split('\n');
    let manifest_hex = lines.next().unwrap_or("");
    let mut manifest = [0u8; 20];
    hex::decode_to_slice(manifest_hex, &mut manifest).map_err(|e| VcsError::parse("changeset manifest node", e))?;

    let user = lines.next().ok_or_else(|| VcsError::parse("changeset", "missing user line"))?;
    let date_line = lines.next().ok_or_else(|| VcsError::parse("changeset", "missing date line"))?;
    let (date, extra) = parse_date_line(date_line)?;
    let files = lines.filter(|l| !l.is_empty()).map(String::from).collect();

    Ok(Self {
      manifest,
      user: user.to_string(),
      date,
      extra,
      files,
      description: description.to_string(),
    })
  }

  pub fn branch(&self) -> &str {
    self.extra.get("branch").map(String::as_str).unwrap_or(DEFAULT_BRANCH)
  }

  /// Whether this changeset closes its branch head
  pub fn closes_branch(&self) -> bool {
    self.extra.contains_key("close")
  }

  /// Whether this changeset touched `path` or anything below it
  pub fn touches(&self, path: &str) -> bool {
    let prefix = format!("{}/", path);
    self.files.iter().any(|f| f == path || f.starts_with(&prefix))
  }
}

fn parse_date_line(line: &str) -> VcsResult<(DateTime<FixedOffset>, BTreeMap<String, String>)> {
  let mut fields = line.splitn(3, ' ');
  let (Some(time), Some(tz)) = (fields.next(), fields.next()) else {
    return Err(VcsError::parse("changeset date", line));
  };
  let secs: f64 = time.parse().map_err(|e| VcsError::parse(format!("changeset time {:?}", time), e))?;
  let west: i32 = tz.parse()?;
  let offset = FixedOffset::west_opt(west).ok_or_else(|| VcsError::parse("changeset timezone", tz))?;
  let date = offset
    .timestamp_opt(secs.trunc() as i64, 0)
    .single()
    .ok_or_else(|| VcsError::parse("changeset date", line))?;

  let extra = fields.next().map(parse_extra).unwrap_or_default();
  Ok((date, extra))
}

/// `key:value` pairs separated by NUL, with `\\`, `\n`, `\r` and `\0` escaped
fn parse_extra(text: &str) -> BTreeMap<String, String> {
  text
    .split('\0')
    .filter(|item| !item.is_empty())
    .filter_map(|item| {
      let item = unescape(item);
      let (key, value) = item.split_once(':')?;
      Some((key.to_string(), value.to_string()))
    })
    .collect()
}

fn unescape(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut chars = text.chars();
  while let Some(c) = chars.next() {
    if c != '\\' {
      out.push(c);
      continue;
    }
    match chars.next() {
      Some('n') => out.push('\n'),
      Some('r') => out.push('\r'),
      Some('0') => out.push('\0'),
      Some('\\') => out.push('\\'),
      Some(other) => {
        out.push('\\');
        out.push(other);
      }
      None => out.push('\\'),
    }
  }
  out
}

/// Name part of a Mercurial user string, like the `person` template filter
pub(crate) fn person(user: &str) -> String {
  if !user.contains('@') {
    return user.to_string();
  }
  if let Some(lt) = user.find('<') {
    return user[..lt].trim_matches(|c| c == ' ' || c == '"').replace("\\\"", "\"");
  }
  match user.find('@') {
    Some(at) => user[..at].replace('.', " "),
    None => user.to_string(),
  }
}

/// Address part of a Mercurial user string, like the `email` template filter
pub(crate) fn email(user: &str) -> String {
  let start = user.find('<').map(|i| i + 1).unwrap_or(0);
  let end = user.find('>').unwrap_or(user.len());
  if end < start {
    return String::new();
  }
  user[start..end].to_string()
}
