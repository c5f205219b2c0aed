//! Reconstructs the "before" and "after" text of a reviewed file.
//!
//! A request names a file and optionally a checkpoint:
//!
//! - no checkpoint: left side at the first checkpoint touching the file,
//!   right side at the last one;
//! - checkpoint N: right side at N; left side is the right side of the most
//!   recent earlier checkpoint touching the file, or the left side at N when
//!   there is none.
//!
//! Each side is rebuilt by fetching the base revision recorded in the
//! checkpoint diff and replaying the stored per-file diff on it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::cache::{ReviewApi, ReviewCache};
use crate::diff_store::{fetch_checkpoint_diffs, CheckpointDiffMap, DiffStoreApi};
use crate::error::ResolveError;
use crate::index::ChangesetIndex;
use crate::normalize::normalize_text;
use crate::patch::apply_or_passthrough;
use crate::types::{
    CheckpointDiff, Checkpoint, ModifiedFile, ResolvedContents, ResolvedFile, ResolvedRepo, Review, Side,
};
use crate::vcs::{RepositoryLocator, VersionControl};

/// Resolves one repository's files against a fixed review and diff snapshot.
///
/// Base texts fetched through this value are memoized by `(path, sha)`, so a
/// revision is read at most once however many sides need it.
pub struct Reconstruction<'a> {
    vcs: &'a dyn VersionControl,
    repo_path: &'a Path,
    repo_id: &'a str,
    index: ChangesetIndex<'a>,
    diffs: &'a CheckpointDiffMap,
    bases: HashMap<(String, String), Option<String>>,
}

impl<'a> Reconstruction<'a> {
    pub fn new(
        vcs: &'a dyn VersionControl,
        repo_path: &'a Path,
        review: &'a Review,
        repo_id: &'a str,
        diffs: &'a CheckpointDiffMap,
    ) -> Self {
        Self {
            vcs,
            repo_path,
            repo_id,
            index: ChangesetIndex::new(review, repo_id),
            diffs,
            bases: HashMap::new(),
        }
    }

    /// Resolves `path` for the whole review (`None`) or one checkpoint.
    ///
    /// # Errors
    ///
    /// Any [`ResolveError`] from reconstructing a side. The lookup of the
    /// previous checkpoint falls back to the requested checkpoint's own left
    /// side when it fails with a NotFound-class error.
    pub async fn resolve(&mut self, checkpoint: Option<Checkpoint>, path: &str) -> Result<ResolvedContents, ResolveError> {
        let (left, right) = match checkpoint {
            None => {
                let first = self.index.first_touching(path);
                let last = self.index.last_touching(path);
                let (Some(first), Some(last)) = (first, last) else {
                    return Ok(ResolvedContents::FileNotIncludedInReview);
                };
                let left = self.side(Side::Left, first.checkpoint, path).await?;
                let right = self.side(Side::Right, last.checkpoint, path).await?;
                (left, right)
            }
            Some(checkpoint) => {
                let left = match self.index.last_touching_before(path, checkpoint) {
                    Some(previous) => match self.side(Side::Right, previous.checkpoint, path).await {
                        Ok(text) => text,
                        Err(e) if e.is_not_found() => {
                            tracing::warn!(
                                repo_id = self.repo_id,
                                path,
                                previous = previous.checkpoint,
                                checkpoint,
                                error = %e,
                                "previous checkpoint unavailable, using this checkpoint's base"
                            );
                            self.side(Side::Left, checkpoint, path).await?
                        }
                        Err(e) => return Err(e),
                    },
                    None => self.side(Side::Left, checkpoint, path).await?,
                };
                let right = self.side(Side::Right, checkpoint, path).await?;
                (left, right)
            }
        };
        Ok(ResolvedContents::Contents { left, right })
    }

    /// Rebuilds one side of `path` as of `checkpoint`.
    ///
    /// The left side of a new file is always empty.
    ///
    /// # Errors
    ///
    /// `ChangesetNotFound`, `FileInfoNotFound` or `CheckpointDiffNotFound` when
    /// the records are missing, `PatchApply` when the stored diff does not fit
    /// the fetched base, `BaseUnavailable` when the base revision is missing
    /// and the diff needs it, `Vcs` when the accessor fails.
    pub async fn side(&mut self, side: Side, checkpoint: Checkpoint, path: &str) -> Result<String, ResolveError> {
        let changeset = self.index.at(checkpoint).ok_or_else(|| ResolveError::ChangesetNotFound {
            repo_id: self.repo_id.to_owned(),
            checkpoint,
        })?;
        let info = changeset.file_info(path).ok_or_else(|| ResolveError::FileInfoNotFound {
            path: path.to_owned(),
            checkpoint,
        })?;
        if side == Side::Left && info.status.is_new_file() {
            return Ok(String::new());
        }
        let diffs: &'a CheckpointDiffMap = self.diffs;
        let diff = diffs.get(self.repo_id, checkpoint).ok_or_else(|| ResolveError::CheckpointDiffNotFound {
            repo_id: self.repo_id.to_owned(),
            checkpoint,
        })?;

        let target = match side {
            Side::Left => &info.old_file,
            Side::Right => &info.file,
        };
        let record = diff.diff_for(side, target);
        let (sha, base) = self.base(side, info, diff).await?;
        tracing::debug!(
            repo_id = self.repo_id,
            path,
            checkpoint,
            ?side,
            patched = record.is_some(),
            "reconstructing"
        );
        let missing = base.is_none();
        apply_or_passthrough(base.as_deref().unwrap_or_default(), record).map_err(|source| {
            if missing {
                ResolveError::BaseUnavailable { path: info.file.clone(), sha, source }
            } else {
                ResolveError::PatchApply { path: info.file.clone(), source }
            }
        })
    }

    /// Base sha and normalized base text for `side`, `None` when the revision
    /// is missing. New files have an empty base; a right side sharing the
    /// left base sha reuses the left base.
    async fn base(
        &mut self,
        side: Side,
        info: &ModifiedFile,
        diff: &CheckpointDiff,
    ) -> Result<(String, Option<String>), ResolveError> {
        let (file, sha) = match side {
            Side::Left => (&info.old_file, &diff.left_base_sha),
            Side::Right if diff.shares_base() => (&info.old_file, &diff.left_base_sha),
            Side::Right => (&info.file, &diff.right_base_sha),
        };
        if info.status.is_new_file() {
            return Ok((sha.clone(), Some(String::new())));
        }
        let key = (file.clone(), sha.clone());
        if let Some(text) = self.bases.get(&key) {
            return Ok((sha.clone(), text.clone()));
        }

        let text = self.vcs.file_content(self.repo_path, file, sha).await?.map(|content| normalize_text(&content));
        if text.is_none() {
            tracing::warn!(
                repo_id = self.repo_id,
                file = %file,
                sha = %sha,
                "base revision unavailable, using empty base"
            );
        }
        self.bases.insert(key, text.clone());
        Ok((sha.clone(), text))
    }
}

/// Content resolution entry points keyed by review id.
pub struct ContentResolver<A> {
    reviews: Arc<ReviewCache<A>>,
    diffs: Arc<dyn DiffStoreApi>,
    vcs: Arc<dyn VersionControl>,
    repos: Arc<dyn RepositoryLocator>,
}

impl<A> ContentResolver<A>
where
    A: ReviewApi + 'static,
{
    pub fn new(
        reviews: Arc<ReviewCache<A>>,
        diffs: Arc<dyn DiffStoreApi>,
        vcs: Arc<dyn VersionControl>,
        repos: Arc<dyn RepositoryLocator>,
    ) -> Self {
        Self { reviews, diffs, vcs, repos }
    }

    /// Left/right contents of `path` in `repo_id`.
    ///
    /// # Errors
    ///
    /// `ReviewNotFound`, `RepoNotFound`, `NoCheckpointDiffs`, or any
    /// reconstruction failure.
    pub async fn resolve_contents(
        &self,
        review_id: &str,
        repo_id: &str,
        checkpoint: Option<Checkpoint>,
        path: &str,
    ) -> Result<ResolvedContents, ResolveError> {
        let review = self.reviews.get_by_id(review_id).await?;
        let location = self
            .repos
            .repository_by_id(repo_id)
            .await
            .ok_or_else(|| ResolveError::RepoNotFound { repo_id: repo_id.to_owned() })?;
        let diffs = fetch_checkpoint_diffs(self.diffs.as_ref(), review_id).await?;

        Reconstruction::new(self.vcs.as_ref(), &location.path, &review, repo_id, &diffs)
            .resolve(checkpoint, path)
            .await
    }

    /// Contents of every file in the review, grouped by repository.
    ///
    /// Without a checkpoint, each repository's latest changeset supplies its
    /// cumulative file list; with one, that checkpoint's own file list is
    /// used. A failing file carries its error and does not stop the batch.
    ///
    /// # Errors
    ///
    /// Only review lookup and diff fetch failures abort the call.
    pub async fn resolve_all_contents(
        &self,
        review_id: &str,
        checkpoint: Option<Checkpoint>,
    ) -> Result<Vec<ResolvedRepo>, ResolveError> {
        let review = self.reviews.get_by_id(review_id).await?;
        let diffs = fetch_checkpoint_diffs(self.diffs.as_ref(), review_id).await?;
        let mut repos = Vec::new();

        for repo_id in review.repo_ids() {
            let index = ChangesetIndex::new(&review, repo_id);
            let changeset = match checkpoint {
                Some(checkpoint) => index.at(checkpoint),
                None => index.latest(),
            };
            let Some(changeset) = changeset else {
                continue;
            };
            let files = match checkpoint {
                Some(_) => &changeset.modified_files_in_checkpoint,
                None => &changeset.modified_files,
            };

            let location = self.repos.repository_by_id(repo_id).await;
            let mut reconstruction = location
                .as_ref()
                .map(|loc| Reconstruction::new(self.vcs.as_ref(), &loc.path, &review, repo_id, &diffs));

            let mut resolved = Vec::with_capacity(files.len());
            for file in files {
                let result = match reconstruction.as_mut() {
                    Some(reconstruction) => reconstruction.resolve(checkpoint, &file.file).await,
                    None => Err(ResolveError::RepoNotFound { repo_id: repo_id.to_owned() }),
                };
                let mut entry = ResolvedFile {
                    path: file.file.clone(),
                    left_path: file.old_file.clone(),
                    right_path: file.file.clone(),
                    left: String::new(),
                    right: String::new(),
                    error: None,
                };
                match result {
                    Ok(ResolvedContents::Contents { left, right }) => {
                        entry.left = left;
                        entry.right = right;
                    }
                    Ok(ResolvedContents::FileNotIncludedInReview) => {
                        tracing::debug!(repo_id, path = %file.file, "file not included in review");
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(repo_id, path = %file.file, error = %e, "failed to resolve file");
                        entry.error = Some(e.to_string());
                    }
                }
                resolved.push(entry);
            }
            repos.push(ResolvedRepo { repo_id: repo_id.to_owned(), files: resolved });
        }

        Ok(repos)
    }
}
