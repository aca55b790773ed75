//! Core building blocks
//!
//! - **config**: backend selection and subprocess settings (`polyvcs.toml`)
//! - **error**: error types with a stable [`ErrorKind`](error::ErrorKind) and help messages
//! - **exec**: isolated subprocess execution with timeouts
//! - **fs**: read-only tree views at a commit
//! - **registry**: VCS type → opener/cloner lookup
//! - **repository**: the [`Repository`](repository::Repository) facade and its capability traits
//! - **types**: commits, refs, diffs and option records
//! - **vcs**: Git and Mercurial backends

pub mod config;
pub mod error;
pub(crate) mod exec;
pub mod fs;
pub mod registry;
pub mod repository;
pub mod types;
pub mod vcs;
