//! Verifies that every base revision a review depends on exists locally.

use std::sync::Arc;

use crate::diff_store::{fetch_checkpoint_diffs, DiffStoreApi};
use crate::error::ResolveError;
use crate::types::{PreconditionErrorKind, PreconditionReport};
use crate::vcs::{RepositoryLocator, VersionControl};

const SHORT_SHA_LEN: usize = 8;

pub struct PreconditionValidator {
    diffs: Arc<dyn DiffStoreApi>,
    vcs: Arc<dyn VersionControl>,
    repos: Arc<dyn RepositoryLocator>,
}

fn short_sha(sha: &str) -> &str {
    sha.get(..SHORT_SHA_LEN).unwrap_or(sha)
}

impl PreconditionValidator {
    pub fn new(
        diffs: Arc<dyn DiffStoreApi>,
        vcs: Arc<dyn VersionControl>,
        repos: Arc<dyn RepositoryLocator>,
    ) -> Self {
        Self { diffs, vcs, repos }
    }

    /// Checks that both base commits of every checkpoint diff are resolvable.
    ///
    /// A missing commit triggers one fetch of all remotes per repository
    /// before the commit is reported missing.
    ///
    /// # Errors
    ///
    /// Diff fetch and commit lookup failures are returned as errors. A failed
    /// remote fetch is logged and the commit re-checked. Missing repositories
    /// and commits are reported through the returned [`PreconditionReport`].
    pub async fn check(&self, review_id: &str) -> Result<PreconditionReport, ResolveError> {
        let diffs = fetch_checkpoint_diffs(self.diffs.as_ref(), review_id).await?;

        for (repo_id, checkpoints) in diffs.repos() {
            let Some(location) = self.repos.repository_by_id(repo_id).await else {
                return Ok(PreconditionReport::failed(
                    PreconditionErrorKind::RepoNotFound,
                    format!("The git repository {repo_id} for this review is not open and has no known local path"),
                ));
            };

            let mut fetched = false;
            for (checkpoint, diff) in checkpoints {
                let bases = [
                    (&diff.left_base_sha, &diff.left_base_author),
                    (&diff.right_base_sha, &diff.right_base_author),
                ];
                for (sha, author) in bases {
                    if sha.is_empty() {
                        continue;
                    }
                    let mut found = self.vcs.get_commit(&location.path, sha).await?.is_some();
                    if !found && !fetched {
                        tracing::info!(repo_id, sha = %sha, "commit missing locally, fetching remotes");
                        fetched = true;
                        match self.vcs.fetch_all_remotes(&location.path).await {
                            Ok(true) => {}
                            Ok(false) => tracing::warn!(repo_id, "fetching remotes did not fully succeed"),
                            Err(e) => tracing::warn!(repo_id, error = %e, "fetching remotes failed"),
                        }
                        found = self.vcs.get_commit(&location.path, sha).await?.is_some();
                    }
                    if !found {
                        tracing::warn!(repo_id, checkpoint, sha = %sha, "commit not found");
                        return Ok(PreconditionReport::failed(
                            PreconditionErrorKind::CommitNotFound,
                            format!(
                                "A commit required to perform this review ({}, authored by {}) was not found in the local git repository. Fetch all remotes and try again.",
                                short_sha(sha),
                                author
                            ),
                        ));
                    }
                }
            }
        }

        Ok(PreconditionReport::ok())
    }
}
