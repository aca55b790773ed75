//! Mercurial backends: resolution, history and refs
//!
//! Every test returns early when `hg` is not installed.

use crate::helpers::*;
use anyhow::Result;
use polyvcs::types::{BlameOptions, BranchesOptions, CommitId, CommitsOptions};
use polyvcs::{Capabilities, ErrorKind};

#[test]
fn test_two_commit_history() -> Result<()> {
  if !has_hg() {
    return Ok(());
  }
  let (repo, c1, c2) = two_commit_repo(Vcs::Hg)?;

  for handle in repo.open_all()? {
    let log = handle.commits(&CommitsOptions::from_head(CommitId::new(&c2)))?;
    assert_eq!(log.total, 2, "{}", handle.backend());
    let ids: Vec<&str> = log.commits.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec![c2.as_str(), c1.as_str()], "{}", handle.backend());

    let newest = &log.commits[0];
    assert_eq!(newest.message, "add file2");
    assert_eq!(newest.author.name, "Test User");
    assert_eq!(newest.author.email, "test@example.com");
    assert_eq!(newest.author.date.to_rfc3339(), "2014-05-06T19:20:21+00:00");
    assert_eq!(newest.parents, vec![CommitId::new(&c1)], "{}", handle.backend());
    assert!(newest.committer.is_none());
    // the null parent slots are dropped
    assert!(log.commits[1].parents.is_empty(), "{}", handle.backend());
  }
  Ok(())
}

#[test]
fn test_resolution_matches_across_backends() -> Result<()> {
  if !has_hg() {
    return Ok(());
  }
  let (repo, c1, c2) = two_commit_repo(Vcs::Hg)?;
  hg(&repo.path, &["tag", "-r", &c1, "-d", "0 0", "v1"])?;

  let cmd = repo.open_cmd()?;
  let native = repo.open_native()?;
  for spec in ["tip", "", ".", "default", "0", "1", "v1", &c1[..12], c2.as_str()] {
    let revset = if spec.is_empty() { "tip" } else { spec };
    let expected = repo.run_str(&["log", "-r", revset, "--template", "{node}"])?;
    assert_eq!(cmd.resolve_revision(spec)?.as_str(), expected, "cmd {:?}", spec);
    assert_eq!(native.resolve_revision(spec)?.as_str(), expected, "native {:?}", spec);
  }

  for handle in [&cmd, &native] {
    assert_eq!(handle.resolve_tag("v1")?.as_str(), c1, "{}", handle.backend());
    let tip = repo.run_str(&["log", "-r", "tip", "--template", "{node}"])?;
    assert_eq!(handle.resolve_branch("default")?.as_str(), tip);
  }
  Ok(())
}

#[test]
fn test_unknown_names_are_not_found() -> Result<()> {
  if !has_hg() {
    return Ok(());
  }
  let (repo, _, _) = two_commit_repo(Vcs::Hg)?;
  for handle in repo.open_all()? {
    let err = handle.resolve_revision("no-such-thing").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound, "{}: {}", handle.backend(), err);

    let err = handle.resolve_branch("no-such-branch").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("no-such-branch"));

    let err = handle.resolve_tag("no-such-tag").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = handle.resolve_revision("-badflag").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
  }
  Ok(())
}

#[test]
fn test_windowing() -> Result<()> {
  if !has_hg() {
    return Ok(());
  }
  let repo = TestRepo::hg()?;
  let mut ids = Vec::new();
  for i in 0..5 {
    repo.write("counter", &i.to_string())?;
    ids.push(repo.commit(&format!("commit {}", i), C1_DATE)?);
  }
  ids.reverse();
  let head = CommitId::new(&ids[0]);

  for handle in repo.open_all()? {
    for (n, skip) in [(0, 0), (2, 0), (2, 1), (3, 3), (10, 4), (1, 5), (0, 2)] {
      let opt = CommitsOptions {
        head: head.clone(),
        n,
        skip,
        path: None,
      };
      let log = handle.commits(&opt)?;
      assert_eq!(log.total, 5, "{} n={} skip={}", handle.backend(), n, skip);
      let expected_len = if n == 0 { 5 - skip } else { n.min(5usize.saturating_sub(skip)) };
      assert_eq!(log.commits.len(), expected_len, "{} n={} skip={}", handle.backend(), n, skip);
      for (commit, id) in log.commits.iter().zip(&ids[skip..]) {
        assert_eq!(commit.id.as_str(), id);
      }
    }
  }
  Ok(())
}

#[test]
fn test_path_history() -> Result<()> {
  if !has_hg() {
    return Ok(());
  }
  let (repo, c1, c2) = two_commit_repo(Vcs::Hg)?;
  repo.write("dir1/file1", "changed")?;
  let c3 = repo.commit("change dir1/file1", C2_DATE)?;

  for handle in repo.open_all()? {
    let opt = CommitsOptions {
      head: CommitId::new(&c3),
      path: Some("dir1".to_string()),
      ..Default::default()
    };
    let log = handle.commits(&opt)?;
    let ids: Vec<&str> = log.commits.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec![c3.as_str(), c1.as_str()], "{}", handle.backend());
    assert_eq!(log.total, 2);

    let opt = CommitsOptions {
      head: CommitId::new(&c3),
      path: Some("file2".to_string()),
      ..Default::default()
    };
    let log = handle.commits(&opt)?;
    assert_eq!(log.commits.len(), 1, "{}", handle.backend());
    assert_eq!(log.commits[0].id.as_str(), c2);
  }
  Ok(())
}

#[test]
fn test_empty_repository() -> Result<()> {
  if !has_hg() {
    return Ok(());
  }
  let repo = TestRepo::hg()?;
  for handle in repo.open_all()? {
    let log = handle.commits(&CommitsOptions::default())?;
    assert!(log.commits.is_empty(), "{}", handle.backend());
    assert_eq!(log.total, 0);
    assert!(handle.branches(&BranchesOptions::default())?.is_empty());
  }
  Ok(())
}

#[test]
fn test_branches_and_tags() -> Result<()> {
  if !has_hg() {
    return Ok(());
  }
  let (repo, c1, _) = two_commit_repo(Vcs::Hg)?;
  hg(&repo.path, &["tag", "-r", &c1, "-d", "0 0", "v1"])?;
  let default_head = repo.run_str(&["log", "-r", "tip", "--template", "{node}"])?;

  hg(&repo.path, &["update", "--quiet", "-r", &c1])?;
  hg(&repo.path, &["branch", "stable"])?;
  repo.write("stable.txt", "stable")?;
  let stable = repo.commit("stable work", C2_DATE)?;

  hg(&repo.path, &["update", "--quiet", "-r", &c1])?;
  hg(&repo.path, &["branch", "old"])?;
  repo.write("old.txt", "old")?;
  repo.commit("old work", C2_DATE)?;
  hg(&repo.path, &["commit", "--close-branch", "-m", "close old", "-d", "0 0"])?;

  for handle in repo.open_all()? {
    let branches = handle.branches(&BranchesOptions::default())?;
    let listed: Vec<(&str, &str)> = branches.iter().map(|b| (b.name.as_str(), b.head.as_str())).collect();
    // closed branches are not listed
    assert_eq!(
      listed,
      vec![("default", default_head.as_str()), ("stable", stable.as_str())],
      "{}",
      handle.backend()
    );

    let opt = BranchesOptions {
      behind_ahead_branch: Some("default".to_string()),
    };
    let counts: Vec<(u64, u64)> = handle
      .branches(&opt)?
      .iter()
      .map(|b| b.counts.map(|c| (c.behind, c.ahead)).unwrap_or((99, 99)))
      .collect();
    assert_eq!(counts, vec![(0, 0), (2, 1)], "{}", handle.backend());

    let tip = repo.run_str(&["log", "-r", "tip", "--template", "{node}"])?;
    let tags = handle.tags()?;
    let tags: Vec<(&str, &str)> = tags.iter().map(|t| (t.name.as_str(), t.commit_id.as_str())).collect();
    assert_eq!(tags, vec![("tip", tip.as_str()), ("v1", c1.as_str())], "{}", handle.backend());
  }
  Ok(())
}

#[test]
fn test_merge_parents_and_base() -> Result<()> {
  if !has_hg() {
    return Ok(());
  }
  let (repo, c1, c2) = two_commit_repo(Vcs::Hg)?;
  hg(&repo.path, &["update", "--quiet", "-r", &c1])?;
  repo.write("side.txt", "side")?;
  let side = repo.commit("side work", C2_DATE)?;
  hg(&repo.path, &["update", "--quiet", "-r", &c2])?;
  hg(&repo.path, &["merge", "--quiet", "-r", &side])?;
  let merge = repo.commit("merge side", C2_DATE)?;

  for handle in repo.open_all()? {
    let commit = handle.get_commit(&CommitId::new(&merge))?;
    assert_eq!(commit.parents, vec![CommitId::new(&c2), CommitId::new(&side)], "{}", handle.backend());

    let base = handle.merge_base(&CommitId::new(&c2), &CommitId::new(&side))?;
    assert_eq!(base.as_str(), c1, "{}", handle.backend());
  }
  Ok(())
}

#[test]
fn test_blame_is_unsupported() -> Result<()> {
  if !has_hg() {
    return Ok(());
  }
  let (repo, _, _) = two_commit_repo(Vcs::Hg)?;
  for handle in repo.open_all()? {
    assert!(!handle.capabilities().contains(Capabilities::BLAME));
    assert!(handle.capabilities().contains(Capabilities::DIFF | Capabilities::MERGE_BASE));
    let err = handle.blame_file("file2", &BlameOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
  }
  Ok(())
}
