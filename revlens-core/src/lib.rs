//! Temporal content resolution for multi-checkpoint code reviews.
//!
//! Given the unified diffs stored per checkpoint and read access to the
//! repository, rebuilds the text of any reviewed file before and after any
//! checkpoint.
pub mod cache;
pub mod db;
pub mod diff_store;
pub mod error;
pub mod index;
pub mod normalize;
pub mod patch;
pub mod preconditions;
pub mod resolver;
pub mod schema;
pub mod types;
pub mod vcs;
