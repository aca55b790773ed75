//! polyvcs: read-only repository access for Git and Mercurial
//!
//! A [`Repository`] answers the same questions for every backend: resolve a
//! revision, walk history, list branches and tags, browse the tree at a commit,
//! and (where the backend supports it) diff, blame and find merge bases.
//!
//! ```no_run
//! use polyvcs::{Registry, VcsConfig};
//! use std::path::Path;
//!
//! # fn main() -> polyvcs::VcsResult<()> {
//! let registry = Registry::with_defaults(&VcsConfig::default())?;
//! let repo = registry.open("git", Path::new("/srv/repos/project"))?;
//! let head = repo.resolve_revision("HEAD")?;
//! let tree = repo.file_system(&head)?;
//! for entry in tree.read_dir("")? {
//!   println!("{:?} {}", entry.mode, entry.name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Backends come in two flavours per VCS: one that shells out to the `git`/`hg`
//! binary and a native one (gitoxide for Git, a built-in revlog reader for
//! Mercurial). [`VcsConfig`] picks between them.

pub mod core;
pub mod utils;

pub use crate::core::config::{BackendKind, VcsConfig};
pub use crate::core::error::{ErrorKind, ResultExt, VcsError, VcsResult};
pub use crate::core::fs::{FileInfo, FileMode, FileReader, FileSystem};
pub use crate::core::registry::Registry;
pub use crate::core::repository::{Capabilities, Repository};
pub use crate::core::types;
pub use crate::core::vcs::{GixGit, HgNative, SystemGit, SystemHg};
