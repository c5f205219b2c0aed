//! Per-repository lookups over a review's changesets.
//!
//! Only `modified_files_in_checkpoint` is consulted, so "touched at
//! checkpoint N" means the file changed at N, not merely before it.

use crate::types::{Changeset, Checkpoint, Review};

/// Changesets of one repository, ordered by checkpoint ordinal.
#[derive(Debug, Clone)]
pub struct ChangesetIndex<'a> {
    changesets: Vec<&'a Changeset>,
}

impl<'a> ChangesetIndex<'a> {
    pub fn new(review: &'a Review, repo_id: &str) -> Self {
        let mut changesets: Vec<&'a Changeset> =
            review.changesets.iter().filter(|c| c.repo_id == repo_id).collect();
        changesets.sort_by_key(|c| c.checkpoint);
        Self { changesets }
    }

    pub fn at(&self, checkpoint: Checkpoint) -> Option<&'a Changeset> {
        self.changesets.iter().copied().find(|c| c.checkpoint == checkpoint)
    }

    /// The changeset with the highest checkpoint.
    pub fn latest(&self) -> Option<&'a Changeset> {
        self.changesets.last().copied()
    }

    pub fn first_touching(&self, path: &str) -> Option<&'a Changeset> {
        self.changesets.iter().copied().find(|c| c.touches_in_checkpoint(path))
    }

    pub fn last_touching(&self, path: &str) -> Option<&'a Changeset> {
        self.changesets.iter().rev().copied().find(|c| c.touches_in_checkpoint(path))
    }

    /// Most recent changeset strictly before `checkpoint` that touched `path`.
    pub fn last_touching_before(&self, path: &str, checkpoint: Checkpoint) -> Option<&'a Changeset> {
        self.changesets
            .iter()
            .rev()
            .copied()
            .filter(|c| c.checkpoint < checkpoint)
            .find(|c| c.touches_in_checkpoint(path))
    }
}
