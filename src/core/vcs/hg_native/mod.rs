//! Native Mercurial backend
//!
//! Reads the changelog, manifest log and filelogs straight from the store,
//! without the `hg` binary. The changelog is re-read for every operation, so a
//! handle never serves state older than the call.
//!
//! Name lookup follows Mercurial's order: branch names, then tags (including
//! `tip`), then `tip`/`null`/`.`, revision numbers, full node ids and finally
//! unique node prefixes.

mod changelog;
mod fs;
mod manifest;
mod mpatch;
mod revlog;
mod store;

use self::changelog::{Changeset, email, person};
use self::fs::HgNativeFs;
use self::revlog::{NULL_NODE, Node, Revlog};
use self::store::Store;
use crate::core::error::{NotFound, VcsError, VcsResult};
use crate::core::fs::FileSystem;
use crate::core::repository::{FileTreeReader, LogReader, Merger, RefLister, Resolver};
use crate::core::types::{
  BehindAhead, Branch, BranchesOptions, Commit, CommitId, CommitLog, CommitsOptions, Signature, Tag,
};
use crate::utils::{check_spec_arg_safety, clean_path};
use chrono::{DateTime, FixedOffset, TimeZone};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

const DIRSTATE_V2_MAGIC: &[u8] = b"dirstate-v2\n";

/// Head a branch name resolves to
#[derive(Debug, Clone, Copy)]
struct BranchTip {
  rev: usize,
  /// False when every head of the branch is closed
  open: bool,
}

pub struct HgNative {
  dir: PathBuf,
  store: Arc<Store>,
}

fn node_id(node: &Node) -> CommitId {
  CommitId::new(hex::encode(node))
}

fn decode_node(text: &str) -> Option<Node> {
  let mut node = [0u8; 20];
  hex::decode_to_slice(text, &mut node).ok().map(|_| node)
}

fn changeset(cl: &Revlog, rev: usize) -> VcsResult<Changeset> {
  Changeset::parse(&cl.revision(rev)?)
}

/// Membership vector of `rev` and all its ancestors
///
/// Parents always have lower revision numbers, so one descending sweep is enough.
fn ancestor_set(cl: &Revlog, rev: usize) -> VcsResult<Vec<bool>> {
  let mut seen = vec![false; cl.len()];
  seen[rev] = true;
  for r in (0..=rev).rev() {
    if seen[r] {
      for p in cl.parents(r)? {
        seen[p] = true;
      }
    }
  }
  Ok(seen)
}

fn only_count(these: &[bool], not_those: &[bool]) -> u64 {
  these.iter().zip(not_those).filter(|(a, b)| **a && !**b).count() as u64
}

impl HgNative {
  pub fn open(path: &Path) -> VcsResult<Self> {
    let store = Store::open(path)?;
    Ok(Self {
      dir: path.to_path_buf(),
      store: Arc::new(store),
    })
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  fn changelog(&self) -> VcsResult<Revlog> {
    self.store.changelog()
  }

  fn rev_of(cl: &Revlog, node: &Node) -> VcsResult<usize> {
    cl.rev(node).ok_or_else(|| VcsError::commit_not_found(hex::encode(node)))
  }

  /// Branch name → tip-most head, preferring open heads
  fn branch_table(cl: &Revlog) -> VcsResult<BTreeMap<String, BranchTip>> {
    let mut names = Vec::with_capacity(cl.len());
    let mut closed = Vec::with_capacity(cl.len());
    for rev in 0..cl.len() {
      let cs = changeset(cl, rev)?;
      names.push(cs.branch().to_string());
      closed.push(cs.closes_branch());
    }

    let mut has_branch_child = vec![false; cl.len()];
    for rev in 0..cl.len() {
      for p in cl.parents(rev)? {
        if names[p] == names[rev] {
          has_branch_child[p] = true;
        }
      }
    }

    let mut table: BTreeMap<String, BranchTip> = BTreeMap::new();
    for rev in (0..cl.len()).filter(|r| !has_branch_child[*r]) {
      let candidate = BranchTip { rev, open: !closed[rev] };
      table
        .entry(names[rev].clone())
        .and_modify(|tip| {
          if (candidate.open, candidate.rev) > (tip.open, tip.rev) {
            *tip = candidate;
          }
        })
        .or_insert(candidate);
    }
    Ok(table)
  }

  /// Tag name → node, from `.hgtags` on every head, `.hg/localtags` and `tip`
  fn tag_table(&self, cl: &Revlog) -> VcsResult<BTreeMap<String, Node>> {
    let mut tags = BTreeMap::new();

    let mut has_child = vec![false; cl.len()];
    for rev in 0..cl.len() {
      for p in cl.parents(rev)? {
        has_child[p] = true;
      }
    }

    let manifests = self.store.manifest_log()?;
    // ascending, so tags on newer heads override older ones
    for head in (0..cl.len()).filter(|r| !has_child[*r]) {
      let cs = changeset(cl, head)?;
      let entries = self.store.read_manifest(&manifests, &cs.manifest)?;
      if let Some((_, entry)) = entries.iter().find(|(path, _)| path == ".hgtags") {
        let (text, _) = self.store.read_file(".hgtags", &entry.node)?;
        apply_tag_lines(&mut tags, &String::from_utf8_lossy(&text), cl);
      }
    }

    match std::fs::read_to_string(self.store.hg_dir.join("localtags")) {
      Ok(text) => apply_tag_lines(&mut tags, &text, cl),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => return Err(VcsError::from(e).context("reading .hg/localtags")),
    }

    let tip = match cl.tip() {
      Some(rev) => cl.node(rev)?,
      None => NULL_NODE,
    };
    tags.insert("tip".to_string(), tip);
    Ok(tags)
  }

  /// First parent of the working directory
  fn working_parent(&self) -> VcsResult<Node> {
    let data = match std::fs::read(self.store.hg_dir.join("dirstate")) {
      Ok(data) => data,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(NULL_NODE),
      Err(e) => return Err(VcsError::from(e).context("reading .hg/dirstate")),
    };
    let start = if data.starts_with(DIRSTATE_V2_MAGIC) { DIRSTATE_V2_MAGIC.len() } else { 0 };
    let raw = data
      .get(start..start + 20)
      .ok_or_else(|| VcsError::parse("hg dirstate", "shorter than its parents header"))?;
    let mut node = [0u8; 20];
    node.copy_from_slice(raw);
    Ok(node)
  }

  /// Generic lookup after branch and tag names
  fn lookup_symbol(&self, cl: &Revlog, spec: &str) -> VcsResult<Node> {
    match spec {
      "" | "tip" => {
        return match cl.tip() {
          Some(rev) => cl.node(rev),
          None => Ok(NULL_NODE),
        };
      }
      "null" => return Ok(NULL_NODE),
      "." => return self.working_parent(),
      _ => {}
    }

    if let Ok(n) = spec.parse::<i64>() {
      let rev = if n < 0 { cl.len() as i64 + n } else { n };
      if let Ok(rev) = usize::try_from(rev)
        && rev < cl.len()
      {
        return cl.node(rev);
      }
    }

    if spec.len() == 40
      && let Some(node) = decode_node(spec)
    {
      return match cl.rev(&node) {
        Some(_) => Ok(node),
        None => Err(VcsError::revision_not_found(spec)),
      };
    }

    if spec.bytes().all(|b| b.is_ascii_hexdigit()) {
      let matches = cl.revs_with_prefix(&spec.to_ascii_lowercase());
      match matches.as_slice() {
        [rev] => return cl.node(*rev),
        [] => {}
        _ => {
          return Err(VcsError::invalid_argument(format!(
            "ambiguous revision prefix '{}' ({} candidates)",
            spec,
            matches.len()
          )));
        }
      }
    }

    Err(VcsError::revision_not_found(spec))
  }

  /// Resolve a name: branch heads first, then tags, then generic symbols
  ///
  /// A name that is both a branch and a tag resolves to the branch head here.
  /// The hg command backend asks `hg` itself, which prefers the tag, so the
  /// two backends disagree on such names; `resolve_tag` and `resolve_branch`
  /// are unambiguous on both.
  fn resolve_in(&self, cl: &Revlog, spec: &str) -> VcsResult<Node> {
    if !spec.is_empty() {
      if let Some(tip) = Self::branch_table(cl)?.get(spec) {
        return cl.node(tip.rev);
      }
      if let Some(node) = self.tag_table(cl)?.get(spec) {
        return Ok(*node);
      }
    }
    self.lookup_symbol(cl, spec)
  }

  /// Node for a commit id, skipping name tables for full node ids
  fn lookup_commit(&self, cl: &Revlog, id: &str) -> VcsResult<Node> {
    if id.len() == 40
      && let Some(node) = decode_node(id)
      && (node == NULL_NODE || cl.rev(&node).is_some())
    {
      return Ok(node);
    }
    self.resolve_in(cl, id)
  }

  fn commit_at(cl: &Revlog, rev: usize, cs: Changeset) -> VcsResult<Commit> {
    let parents = cl
      .parents(rev)?
      .into_iter()
      .map(|p| cl.node(p).map(|n| node_id(&n)))
      .collect::<VcsResult<Vec<_>>>()?;
    Ok(Commit {
      id: node_id(&cl.node(rev)?),
      author: Signature {
        name: person(&cs.user),
        email: email(&cs.user),
        date: cs.date,
      },
      committer: None,
      message: cs.description.trim().to_string(),
      parents,
    })
  }
}

/// Apply `<hex node> <name>` lines; the null node deletes a tag
fn apply_tag_lines(tags: &mut BTreeMap<String, Node>, text: &str, cl: &Revlog) {
  for line in text.lines() {
    let Some((hex_node, name)) = line.trim().split_once(' ') else {
      continue;
    };
    let Some(node) = decode_node(hex_node) else {
      continue;
    };
    let name = name.trim().to_string();
    if node == NULL_NODE {
      tags.remove(&name);
    } else if cl.rev(&node).is_some() {
      tags.insert(name, node);
    } else {
      trace!(tag = %name, node = hex_node, "ignoring tag for unknown node");
    }
  }
}

impl Resolver for HgNative {
  fn resolve_revision(&self, spec: &str) -> VcsResult<CommitId> {
    check_spec_arg_safety(spec)?;
    let cl = self.changelog()?;
    Ok(node_id(&self.resolve_in(&cl, spec)?))
  }

  fn resolve_branch(&self, name: &str) -> VcsResult<CommitId> {
    check_spec_arg_safety(name)?;
    let cl = self.changelog()?;
    match Self::branch_table(&cl)?.get(name) {
      Some(tip) => Ok(node_id(&cl.node(tip.rev)?)),
      None => Err(VcsError::NotFound(NotFound::Branch { name: name.to_string() })),
    }
  }

  fn resolve_tag(&self, name: &str) -> VcsResult<CommitId> {
    check_spec_arg_safety(name)?;
    let cl = self.changelog()?;
    match self.tag_table(&cl)?.get(name) {
      Some(node) => Ok(node_id(node)),
      None => Err(VcsError::NotFound(NotFound::Tag { name: name.to_string() })),
    }
  }
}

impl LogReader for HgNative {
  fn commits(&self, opt: &CommitsOptions) -> VcsResult<CommitLog> {
    check_spec_arg_safety(opt.head.as_str())?;
    let cl = self.changelog()?;
    let head = self.lookup_commit(&cl, opt.head.as_str())?;
    if head == NULL_NODE {
      debug!(repo = %self.dir.display(), "empty history");
      return Ok(CommitLog::default());
    }
    let head = Self::rev_of(&cl, &head)?;

    let path = opt.path.as_deref().map(clean_path).filter(|p| p != ".");
    let ancestors = ancestor_set(&cl, head)?;

    let mut commits = Vec::new();
    let mut total = 0u64;
    for rev in (0..=head).rev().filter(|r| ancestors[*r]) {
      let cs = changeset(&cl, rev)?;
      if let Some(path) = &path
        && !cs.touches(path)
      {
        continue;
      }

      let index = total as usize;
      total += 1;
      if index < opt.skip || (opt.n != 0 && commits.len() >= opt.n) {
        continue;
      }
      commits.push(Self::commit_at(&cl, rev, cs)?);
    }

    trace!(head, returned = commits.len(), total, "walked hg changelog");
    Ok(CommitLog { commits, total })
  }
}

impl RefLister for HgNative {
  fn branches(&self, opt: &BranchesOptions) -> VcsResult<Vec<Branch>> {
    let cl = self.changelog()?;
    let table = Self::branch_table(&cl)?;

    let reference = match &opt.behind_ahead_branch {
      Some(name) => match table.get(name) {
        Some(tip) => Some(ancestor_set(&cl, tip.rev)?),
        None => return Err(VcsError::NotFound(NotFound::Branch { name: name.clone() })),
      },
      None => None,
    };

    table
      .into_iter()
      .filter(|(_, tip)| tip.open)
      .map(|(name, tip)| -> VcsResult<Branch> {
        let counts = match &reference {
          Some(base) => {
            let own = ancestor_set(&cl, tip.rev)?;
            Some(BehindAhead {
              behind: only_count(base, &own),
              ahead: only_count(&own, base),
            })
          }
          None => None,
        };
        Ok(Branch {
          name,
          head: node_id(&cl.node(tip.rev)?),
          counts,
        })
      })
      .collect()
  }

  fn tags(&self) -> VcsResult<Vec<Tag>> {
    let cl = self.changelog()?;
    Ok(
      self
        .tag_table(&cl)?
        .into_iter()
        .map(|(name, node)| Tag {
          name,
          commit_id: node_id(&node),
        })
        .collect(),
    )
  }
}

impl FileTreeReader for HgNative {
  fn file_system(&self, at: &CommitId) -> VcsResult<Box<dyn FileSystem>> {
    check_spec_arg_safety(at.as_str())?;
    let cl = self.changelog()?;
    let node = self.lookup_commit(&cl, at.as_str()).map_err(|e| {
      if e.is_not_found() {
        VcsError::commit_not_found(at.as_str())
      } else {
        e
      }
    })?;

    if node == NULL_NODE {
      let epoch: DateTime<FixedOffset> = FixedOffset::east_opt(0)
        .and_then(|utc| utc.timestamp_opt(0, 0).single())
        .ok_or_else(|| VcsError::message("epoch is not representable"))?;
      return Ok(Box::new(HgNativeFs::new(self.store.clone(), Arc::new(cl), Vec::new(), epoch)));
    }

    let cs = changeset(&cl, Self::rev_of(&cl, &node)?)?;
    let manifests = self.store.manifest_log()?;
    let entries = self.store.read_manifest(&manifests, &cs.manifest)?;
    trace!(at = %at, files = entries.len(), "loaded hg manifest");
    Ok(Box::new(HgNativeFs::new(self.store.clone(), Arc::new(cl), entries, cs.date)))
  }
}

impl Merger for HgNative {
  /// Greatest common ancestor; ties between several heads go to the lowest node id
  fn merge_base(&self, a: &CommitId, b: &CommitId) -> VcsResult<CommitId> {
    check_spec_arg_safety(a.as_str())?;
    check_spec_arg_safety(b.as_str())?;
    let cl = self.changelog()?;
    let ra = Self::rev_of(&cl, &self.lookup_commit(&cl, a.as_str())?)?;
    let rb = Self::rev_of(&cl, &self.lookup_commit(&cl, b.as_str())?)?;

    let in_a = ancestor_set(&cl, ra)?;
    let in_b = ancestor_set(&cl, rb)?;

    // walk common ancestors newest first; anything reached through another
    // common ancestor is not a head of the common set
    let mut covered = vec![false; cl.len()];
    let mut heads = Vec::new();
    for rev in (0..cl.len()).rev().filter(|r| in_a[*r] && in_b[*r]) {
      if !covered[rev] {
        heads.push(cl.node(rev)?);
      }
      for p in cl.parents(rev)? {
        covered[p] = true;
      }
    }

    heads
      .into_iter()
      .min()
      .map(|node| node_id(&node))
      .ok_or_else(|| VcsError::revision_not_found(format!("ancestor({}, {})", a, b)))
  }
}
