//! Diffs, cross-repository diffs and blame

use crate::helpers::*;
use anyhow::Result;
use polyvcs::types::{BlameOptions, CloneOptions, CommitId, DiffOptions};
use polyvcs::{ErrorKind, Registry, VcsConfig};

#[test]
fn test_git_diff() -> Result<()> {
  let (repo, c1, c2) = two_commit_repo(Vcs::Git)?;
  let (c1, c2) = (CommitId::new(&c1), CommitId::new(&c2));

  for handle in repo.open_all()? {
    let diff = handle.diff(&c1, &c2, &DiffOptions::default())?;
    assert!(diff.raw.contains("diff --git a/file2 b/file2"), "{}", handle.backend());
    assert!(diff.raw.contains("+infile2"));
    // --full-index: 40-hex blob ids in the index line
    let index_line = diff.raw.lines().find(|l| l.starts_with("index ")).unwrap_or_default();
    assert!(index_line.len() >= "index ".len() + 40 + 2 + 40);

    let limited = DiffOptions {
      paths: vec!["dir1".to_string()],
    };
    assert!(handle.diff(&c1, &c2, &limited)?.raw.is_empty());

    let missing = CommitId::new("0123456789abcdef0123456789abcdef01234567");
    let err = handle.diff(&missing, &c2, &DiffOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound, "{}", handle.backend());
  }
  Ok(())
}

#[test]
fn test_hg_diff() -> Result<()> {
  if !has_hg() {
    return Ok(());
  }
  let (repo, c1, c2) = two_commit_repo(Vcs::Hg)?;
  let (c1, c2) = (CommitId::new(&c1), CommitId::new(&c2));

  for handle in repo.open_all()? {
    let diff = handle.diff(&c1, &c2, &DiffOptions::default())?;
    assert!(diff.raw.contains("diff --git a/file2 b/file2"), "{}", handle.backend());
    assert!(diff.raw.contains("+infile2"));

    let limited = DiffOptions {
      paths: vec!["dir1".to_string()],
    };
    assert!(handle.diff(&c1, &c2, &limited)?.raw.is_empty(), "{}", handle.backend());

    let missing = CommitId::new("0123456789abcdef0123456789abcdef01234567");
    let err = handle.diff(&c1, &missing, &DiffOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound, "{}", handle.backend());
  }
  Ok(())
}

#[test]
fn test_cross_repo_diff_fetches_head() -> Result<()> {
  let (repo, _, c2) = two_commit_repo(Vcs::Git)?;
  let registry = Registry::with_defaults(&VcsConfig::default())?;

  let fork_dir = repo.scratch("fork");
  let url = repo.path.display().to_string();
  registry.clone_repo("git", &url, &fork_dir, &CloneOptions::default())?;
  std::fs::write(fork_dir.join("fork.txt"), "from the fork")?;
  git(&fork_dir, &["add", "fork.txt"])?;
  git(&fork_dir, &["commit", "--quiet", "-m", "fork work"])?;
  let fork_head = String::from_utf8_lossy(&git(&fork_dir, &["rev-parse", "HEAD"])?.stdout)
    .trim()
    .to_string();
  let fork_head = CommitId::new(fork_head);
  let fork = registry.open("git", &fork_dir)?;

  let base = repo.open_cmd()?;
  assert_eq!(base.resolve_revision(fork_head.as_str()).unwrap_err().kind(), ErrorKind::NotFound);

  let diff = base.cross_repo_diff(&CommitId::new(&c2), &fork, &fork_head, &DiffOptions::default())?;
  assert!(diff.raw.contains("+from the fork"));
  // the fetch leaves the object behind
  assert_eq!(base.resolve_revision(fork_head.as_str())?, fork_head);

  // same repository on both sides is a plain diff
  let same = base.cross_repo_diff(&CommitId::new(&c2), &base, &CommitId::new(&c2), &DiffOptions::default())?;
  assert!(same.raw.is_empty());

  let missing = CommitId::new("0123456789abcdef0123456789abcdef01234567");
  let err = base
    .cross_repo_diff(&CommitId::new(&c2), &fork, &missing, &DiffOptions::default())
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
  Ok(())
}

#[test]
fn test_cross_repo_diff_between_vcs_types() -> Result<()> {
  if !has_hg() {
    return Ok(());
  }
  let (git_repo, _, git_head) = two_commit_repo(Vcs::Git)?;
  let (hg_repo, _, hg_head) = two_commit_repo(Vcs::Hg)?;
  let err = git_repo
    .open_cmd()?
    .cross_repo_diff(
      &CommitId::new(&git_head),
      &hg_repo.open_cmd()?,
      &CommitId::new(&hg_head),
      &DiffOptions::default(),
    )
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Unsupported);
  Ok(())
}

#[test]
fn test_blame() -> Result<()> {
  let repo = TestRepo::git()?;
  repo.write("notes.txt", "one\ntwo\n")?;
  let c1 = repo.commit("first lines", C1_DATE)?;
  repo.write("notes.txt", "one\ntwo\nthree\n")?;
  let c2 = repo.commit("third line", C2_DATE)?;

  for handle in repo.open_all()? {
    let backend = handle.backend();
    let hunks = handle.blame_file("notes.txt", &BlameOptions::default())?;
    assert_eq!(hunks.len(), 2, "{}", backend);

    assert_eq!((hunks[0].start_line, hunks[0].end_line), (1, 3));
    assert_eq!((hunks[0].start_byte, hunks[0].end_byte), (0, 8));
    assert_eq!(hunks[0].commit_id.as_str(), c1);
    assert_eq!(hunks[0].author.name, "Test User");
    assert_eq!(hunks[0].author.date.to_rfc3339(), "2006-01-02T15:04:05+00:00");

    assert_eq!((hunks[1].start_line, hunks[1].end_line), (3, 4));
    assert_eq!((hunks[1].start_byte, hunks[1].end_byte), (8, 14));
    assert_eq!(hunks[1].commit_id.as_str(), c2);

    let ranged = BlameOptions {
      start_line: 2,
      end_line: 2,
      ..Default::default()
    };
    let hunks = handle.blame_file("notes.txt", &ranged)?;
    assert_eq!(hunks.len(), 1, "{}", backend);
    assert_eq!((hunks[0].start_line, hunks[0].end_line), (2, 3));
    assert_eq!(hunks[0].commit_id.as_str(), c1);

    let as_of_first = BlameOptions {
      newest_commit: Some(CommitId::new(&c1)),
      ..Default::default()
    };
    let hunks = handle.blame_file("notes.txt", &as_of_first)?;
    assert_eq!(hunks.len(), 1);
    assert_eq!(hunks[0].end_line, 3);

    let err = handle.blame_file("missing.txt", &BlameOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound, "{}", backend);
  }
  Ok(())
}
