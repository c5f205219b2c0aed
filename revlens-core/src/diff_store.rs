//! Access to the per-checkpoint diffs stored for a review.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::{ApiError, ResolveError};
use crate::types::{Checkpoint, CheckpointDiff, ReviewCheckpointDiff};

/// Remote endpoint returning every checkpoint diff of a review as a flat list.
#[async_trait]
pub trait DiffStoreApi: Send + Sync {
    async fn fetch_review_checkpoint_diffs(&self, review_id: &str) -> Result<Vec<ReviewCheckpointDiff>, ApiError>;
}

/// Checkpoint diffs of one review, grouped by repository id.
///
/// Each repository's list is sorted by checkpoint. Held for the duration of
/// one request; fetch again for fresh data.
#[derive(Debug, Clone, Default)]
pub struct CheckpointDiffMap {
    repos: BTreeMap<String, Vec<(Checkpoint, CheckpointDiff)>>,
}

impl CheckpointDiffMap {
    pub fn for_repo(&self, repo_id: &str) -> &[(Checkpoint, CheckpointDiff)] {
        self.repos.get(repo_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, repo_id: &str, checkpoint: Checkpoint) -> Option<&CheckpointDiff> {
        self.for_repo(repo_id)
            .iter()
            .find(|(c, _)| *c == checkpoint)
            .map(|(_, diff)| diff)
    }

    pub fn repos(&self) -> impl Iterator<Item = (&str, &[(Checkpoint, CheckpointDiff)])> {
        self.repos.iter().map(|(id, diffs)| (id.as_str(), diffs.as_slice()))
    }
}

/// Fetches and groups the checkpoint diffs of `review_id` with one API call.
///
/// A repository's lone record without a checkpoint is legacy
/// single-checkpoint data and becomes checkpoint 0.
///
/// # Errors
///
/// [`ResolveError::NoCheckpointDiffs`] when the review has no records,
/// [`ResolveError::Api`] when the call fails.
pub async fn fetch_checkpoint_diffs<A>(api: &A, review_id: &str) -> Result<CheckpointDiffMap, ResolveError>
where
    A: DiffStoreApi + ?Sized,
{
    let records = api.fetch_review_checkpoint_diffs(review_id).await?;
    if records.is_empty() {
        return Err(ResolveError::NoCheckpointDiffs { review_id: review_id.to_owned() });
    }
    let mut per_repo: BTreeMap<&str, usize> = BTreeMap::new();
    for record in &records {
        *per_repo.entry(record.repo_id.as_str()).or_default() += 1;
    }
    let legacy: Vec<String> = per_repo
        .into_iter()
        .filter(|(_, count)| *count == 1)
        .map(|(repo_id, _)| repo_id.to_owned())
        .collect();

    let mut repos: BTreeMap<String, Vec<(Checkpoint, CheckpointDiff)>> = BTreeMap::new();
    for record in records {
        let checkpoint = match record.checkpoint {
            Some(checkpoint) => checkpoint,
            None if legacy.contains(&record.repo_id) => 0,
            None => {
                tracing::warn!(
                    review_id,
                    repo_id = %record.repo_id,
                    "skipping checkpoint diff without a checkpoint"
                );
                continue;
            }
        };
        repos.entry(record.repo_id).or_default().push((checkpoint, record.diffs));
    }
    for diffs in repos.values_mut() {
        diffs.sort_by_key(|(checkpoint, _)| *checkpoint);
    }

    tracing::debug!(review_id, repos = repos.len(), "fetched checkpoint diffs");
    Ok(CheckpointDiffMap { repos })
}
