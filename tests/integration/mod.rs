//! Integration tests against real git and hg repositories

mod helpers;
mod hg_store;
mod test_diff_blame;
mod test_hg;
mod test_registry;
