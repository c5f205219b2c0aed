//! One-time normalization passes applied at load time.

use std::collections::{HashMap, HashSet};

use crate::error::ResolveError;
use crate::types::{Changeset, Review, ReviewRecord};

/// Strips a leading BOM and converts CRLF / lone CR line endings to LF.
///
/// Stored diffs are computed against text in this form.
pub fn normalize_text(text: &str) -> String {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    if !text.contains('\r') {
        return text.to_owned();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Backfills legacy fields and returns the normalized review.
///
/// - A repository with a single changeset and no checkpoint gets checkpoint 0.
/// - A missing `modifiedFilesInCheckpoint` defaults to `modifiedFiles`.
///
/// # Errors
///
/// Returns [`ResolveError::InvalidReview`] when a repository has several
/// changesets and one of them has no checkpoint.
pub fn normalize_review(record: ReviewRecord) -> Result<Review, ResolveError> {
    let mut per_repo: HashMap<&str, usize> = HashMap::new();
    for changeset in &record.review_changesets {
        *per_repo.entry(changeset.repo_id.as_str()).or_default() += 1;
    }
    let singles: HashSet<String> = per_repo
        .into_iter()
        .filter(|(_, count)| *count == 1)
        .map(|(repo_id, _)| repo_id.to_owned())
        .collect();
    let mut changesets = Vec::with_capacity(record.review_changesets.len());

    for changeset in record.review_changesets {
        let checkpoint = match changeset.checkpoint {
            Some(checkpoint) => checkpoint,
            None if singles.contains(&changeset.repo_id) => 0,
            None => {
                return Err(ResolveError::InvalidReview {
                    review_id: record.id,
                    reason: format!("changeset for repository {} has no checkpoint", changeset.repo_id),
                })
            }
        };
        let modified_files_in_checkpoint = changeset
            .modified_files_in_checkpoint
            .unwrap_or_else(|| changeset.modified_files.clone());
        changesets.push(Changeset {
            repo_id: changeset.repo_id,
            checkpoint,
            branch: changeset.branch,
            modified_files: changeset.modified_files,
            modified_files_in_checkpoint,
        });
    }

    Ok(Review {
        id: record.id,
        title: record.title,
        text: record.text,
        approved_by: record.approved_by,
        all_reviewers_must_approve: record.all_reviewers_must_approve,
        changesets,
    })
}
