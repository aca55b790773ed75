//! History, diff and blame for SystemGit

use super::parse_git_offset;
use super::system_git::SystemGit;
use crate::core::error::{VcsError, VcsResult};
use crate::core::repository::{Blamer, CrossRepoDiffer, Differ, LogReader};
use crate::core::types::{BlameOptions, Commit, CommitId, CommitLog, CommitsOptions, Diff, DiffOptions, Hunk, Signature};
use crate::utils::{check_spec_arg_safety, clean_path};
use chrono::{DateTime, FixedOffset, TimeZone};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use tracing::{debug, trace};

/// Fields: ID, author name/email/date, committer name/email/date, body, parents
const LOG_FORMAT: &str = "--format=format:%H%x00%aN%x00%aE%x00%aI%x00%cN%x00%cE%x00%cI%x00%B%x00%P%x00";
const FIELDS_PER_COMMIT: usize = 9;

const REVISION_NOT_FOUND: &[&str] = &["unknown revision", "bad revision", "bad object"];

impl LogReader for SystemGit {
  fn commits(&self, opt: &CommitsOptions) -> VcsResult<CommitLog> {
    check_spec_arg_safety(opt.head.as_str())?;
    let head = if opt.head.as_str().is_empty() { "HEAD" } else { opt.head.as_str() };

    let mut args = vec!["log".to_string(), LOG_FORMAT.to_string()];
    if opt.n != 0 {
      args.push("-n".to_string());
      args.push(opt.n.to_string());
    }
    if opt.skip != 0 {
      args.push(format!("--skip={}", opt.skip));
    }
    args.push(head.to_string());
    if let Some(path) = &opt.path {
      args.push("--".to_string());
      args.push(clean_path(path));
    }

    let output = self.run(&args)?;
    if !output.success() {
      if !self.has_commits()? {
        // only HEAD names the unborn tip; any other name does not exist yet
        if head != "HEAD" {
          return Err(VcsError::revision_not_found(head));
        }
        debug!(repo = %self.repo_path.display(), "empty repository, no history");
        return Ok(CommitLog::default());
      }
      if output.mentions(REVISION_NOT_FOUND) {
        return Err(VcsError::revision_not_found(head));
      }
      return Err(output.into_error());
    }

    let commits = parse_log(&output.stdout)?;
    let total = self.count_commits(head, opt.path.as_deref())?;
    trace!(head, returned = commits.len(), total, "parsed git log");

    Ok(CommitLog { commits, total })
  }
}

impl SystemGit {
  /// Commits reachable from `head`, optionally only those touching `path`
  fn count_commits(&self, head: &str, path: Option<&str>) -> VcsResult<u64> {
    let mut args = vec!["rev-list".to_string(), "--count".to_string(), head.to_string()];
    if let Some(path) = path {
      args.push("--".to_string());
      args.push(clean_path(path));
    }
    let output = self.run_checked(&args)?;
    let text = output.stdout_str();
    text
      .trim()
      .parse()
      .map_err(|e| VcsError::parse(format!("git rev-list --count output {:?}", text.trim()), e))
  }

  fn diff_checked(&self, base: &CommitId, head: &CommitId, opt: &DiffOptions) -> VcsResult<Diff> {
    let mut args = vec![
      "diff".to_string(),
      "--full-index".to_string(),
      "--no-color".to_string(),
      "--no-ext-diff".to_string(),
      base.to_string(),
      head.to_string(),
      "--".to_string(),
    ];
    args.extend(opt.paths.iter().map(|p| clean_path(p)));

    let output = self.run_checked(&args)?;
    Ok(Diff {
      raw: output.stdout_str(),
    })
  }

  /// Size in bytes of `path` at `rev`
  fn blob_size(&self, rev: &str, path: &str) -> VcsResult<usize> {
    let object = format!("{}:{}", rev, path);
    let output = self.run(["cat-file", "-s", object.as_str()])?;
    if !output.success() {
      return Err(VcsError::path_not_found(path));
    }
    let text = output.stdout_str();
    text.trim().parse().map_err(|e| VcsError::parse("git cat-file -s output", e))
  }
}

impl Differ for SystemGit {
  fn diff(&self, base: &CommitId, head: &CommitId, opt: &DiffOptions) -> VcsResult<Diff> {
    self.verify_commit(base)?;
    self.verify_commit(head)?;
    self.diff_checked(base, head, opt)
  }
}

impl CrossRepoDiffer for SystemGit {
  fn cross_repo_diff(&self, base: &CommitId, head_dir: &Path, head: &CommitId, opt: &DiffOptions) -> VcsResult<Diff> {
    let head_repo = self.sibling(head_dir);
    head_repo.verify_commit(head)?;
    self.verify_commit(base)?;

    if same_location(&self.repo_path, head_dir) {
      return self.diff_checked(base, head, opt);
    }

    if self.verify_commit(head).is_err() {
      // Local transport spawns upload-pack as our child, so `-c` reaches it
      // and the unadvertised commit can be requested directly.
      debug!(head = %head, from = %head_dir.display(), "fetching head commit for cross-repo diff");
      self.run_checked([
        OsStr::new("-c"),
        OsStr::new("uploadpack.allowAnySHA1InWant=true"),
        OsStr::new("fetch"),
        OsStr::new("--no-tags"),
        OsStr::new("--quiet"),
        head_dir.as_os_str(),
        OsStr::new(head.as_str()),
      ])?;
    }

    self.diff_checked(base, head, opt)
  }
}

fn same_location(a: &Path, b: &Path) -> bool {
  match (a.canonicalize(), b.canonicalize()) {
    (Ok(a), Ok(b)) => a == b,
    _ => a == b,
  }
}

impl Blamer for SystemGit {
  fn blame_file(&self, path: &str, opt: &BlameOptions) -> VcsResult<Vec<Hunk>> {
    let path = clean_path(path);
    let newest = match &opt.newest_commit {
      Some(id) => {
        check_spec_arg_safety(id.as_str())?;
        id.to_string()
      }
      None => "HEAD".to_string(),
    };

    let revision = match &opt.oldest_commit {
      Some(oldest) => {
        check_spec_arg_safety(oldest.as_str())?;
        format!("{}..{}", oldest, newest)
      }
      None => newest.clone(),
    };

    let output = self.run(["blame", "--porcelain", revision.as_str(), "--", path.as_str()])?;
    if !output.success() {
      if output.mentions(&["no such path", "no such ref"]) {
        return Err(VcsError::path_not_found(path));
      }
      return Err(output.into_error());
    }

    let file_size = self.blob_size(&newest, &path)?;
    let blame = parse_porcelain_blame(&output.stdout, file_size)?;
    Ok(select_lines(blame, opt.start_line, opt.end_line))
  }
}

/// Decode the NUL-separated `git log` records
pub(crate) fn parse_log(out: &[u8]) -> VcsResult<Vec<Commit>> {
  let parts: Vec<&[u8]> = out.split(|b| *b == 0).collect();
  let num_commits = parts.len() / FIELDS_PER_COMMIT;

  let mut commits = Vec::with_capacity(num_commits);
  for record in parts.chunks_exact(FIELDS_PER_COMMIT).take(num_commits) {
    let text = |i: usize| String::from_utf8_lossy(record[i]).into_owned();

    // records are newline-separated, so every ID after the first starts with '\n'
    let id = text(0).trim_start_matches('\n').to_string();

    let author = Signature {
      name: text(1),
      email: text(2),
      date: parse_iso_date(&text(3))?,
    };
    let committer = Signature {
      name: text(4),
      email: text(5),
      date: parse_iso_date(&text(6))?,
    };

    let body = text(7);
    let message = body.strip_suffix('\n').unwrap_or(&body).to_string();

    let parents = text(8).split(' ').filter(|p| !p.is_empty()).map(CommitId::from).collect();

    commits.push(Commit {
      id: CommitId::new(id),
      author,
      committer: Some(committer),
      message,
      parents,
    });
  }

  Ok(commits)
}

pub(crate) fn parse_iso_date(text: &str) -> VcsResult<DateTime<FixedOffset>> {
  DateTime::parse_from_rfc3339(text.trim()).map_err(|e| VcsError::parse(format!("git date {:?}", text), e))
}

#[derive(Default)]
struct BlameAuthor {
  name: String,
  email: String,
  time: i64,
  tz: String,
}

/// Blame hunks plus the byte offset where each line starts
struct BlameLines {
  hunks: Vec<Hunk>,
  /// `offsets[n - 1]` is where line `n` starts; the final entry is the file end
  offsets: Vec<usize>,
}

/// Turn `git blame --porcelain` output into line hunks
///
/// Consecutive lines from the same commit share a hunk. Byte offsets count
/// the raw bytes of each line plus its newline; the last hunk is clamped to
/// `file_size`.
fn parse_porcelain_blame(out: &[u8], file_size: usize) -> VcsResult<BlameLines> {
  let mut authors: HashMap<String, BlameAuthor> = HashMap::new();
  let mut hunks: Vec<Hunk> = Vec::new();
  let mut offsets = vec![0usize];
  let mut current: Option<(String, usize)> = None;
  let mut byte = 0usize;

  let body = out.strip_suffix(b"\n").unwrap_or(out);
  for raw in body.split(|b| *b == b'\n') {
    if let Some(content) = raw.strip_prefix(b"\t") {
      let Some((sha, line_no)) = current.take() else {
        return Err(VcsError::parse("git blame output", "content line without header"));
      };
      let start_byte = byte;
      byte += content.len() + 1;
      offsets.push(byte);

      match hunks.last_mut() {
        Some(last) if last.commit_id.as_str() == sha && last.end_line == line_no => {
          last.end_line = line_no + 1;
          last.end_byte = byte;
        }
        _ => {
          let info = authors.get(&sha).ok_or_else(|| VcsError::parse("git blame output", "commit without author"))?;
          hunks.push(Hunk {
            start_line: line_no,
            end_line: line_no + 1,
            start_byte,
            end_byte: byte,
            commit_id: CommitId::new(sha),
            author: Signature {
              name: info.name.clone(),
              email: info.email.clone(),
              date: blame_date(info)?,
            },
          });
        }
      }
      continue;
    }

    let decoded = String::from_utf8_lossy(raw);
    let line: &str = &decoded;
    let (key, value) = line.split_once(' ').unwrap_or((line, ""));
    if key.len() == 40 && key.bytes().all(|b| b.is_ascii_hexdigit()) {
      // "<sha> <orig line> <final line> [<group size>]"
      let final_line = value
        .split(' ')
        .nth(1)
        .ok_or_else(|| VcsError::parse("git blame header", line))?
        .parse::<usize>()?;
      authors.entry(key.to_string()).or_default();
      current = Some((key.to_string(), final_line));
      continue;
    }

    let Some((sha, _)) = &current else { continue };
    let Some(info) = authors.get_mut(sha) else { continue };
    match key {
      "author" => info.name = value.to_string(),
      "author-mail" => info.email = value.trim_start_matches('<').trim_end_matches('>').to_string(),
      "author-time" => info.time = value.parse()?,
      "author-tz" => info.tz = value.to_string(),
      _ => {}
    }
  }

  if let Some(last) = hunks.last_mut() {
    last.end_byte = last.end_byte.min(file_size);
  }
  if let Some(end) = offsets.last_mut() {
    *end = (*end).min(file_size);
  }
  Ok(BlameLines { hunks, offsets })
}

fn blame_date(info: &BlameAuthor) -> VcsResult<DateTime<FixedOffset>> {
  let offset = parse_git_offset(&info.tz)?;
  offset
    .timestamp_opt(info.time, 0)
    .single()
    .ok_or_else(|| VcsError::parse("git blame author-time", info.time))
}

/// Keep the part of each hunk inside `[start, end]` (1-based, inclusive; 0 = open)
///
/// A hunk cut by the window gets the byte span of its remaining lines.
fn select_lines(blame: BlameLines, start: usize, end: usize) -> Vec<Hunk> {
  let BlameLines { hunks, offsets } = blame;
  if start == 0 && end == 0 {
    return hunks;
  }
  let first = start.max(1);
  let last_exclusive = if end == 0 { usize::MAX } else { end + 1 };
  let line_start = |line: usize, fallback: usize| offsets.get(line - 1).copied().unwrap_or(fallback);

  hunks
    .into_iter()
    .filter(|h| h.end_line > first && h.start_line < last_exclusive)
    .map(|mut h| {
      if h.start_line < first {
        h.start_line = first;
        h.start_byte = line_start(first, h.start_byte);
      }
      if h.end_line > last_exclusive {
        h.end_line = last_exclusive;
        h.end_byte = line_start(last_exclusive, h.end_byte);
      }
      h
    })
    .collect()
}
