use thiserror::Error;

use crate::types::Checkpoint;

/// Failure applying a stored diff, or parsing one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("hunk {hunk} does not match base at line {line}: expected {expected:?}, found {found:?}")]
    HunkMismatch {
        hunk: usize,
        line: usize,
        expected: String,
        found: Option<String>,
    },
    #[error("hunk {hunk} starts past the end of a {len}-line base")]
    HunkOutOfRange { hunk: usize, len: usize },
    #[error("malformed diff at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// Failure reported by the version-control accessor.
#[derive(Debug, Clone, Error)]
pub enum VcsError {
    #[error("repository not found at {path}")]
    RepoNotFound { path: String },
    #[error("backend error: {reason}")]
    BackendError { reason: String },
    #[error("version-control worker stopped")]
    WorkerGone,
}

/// Failure reported by a remote API or the local store.
///
/// `Clone` so one in-flight fetch result can be handed to every waiter.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("request failed: {reason}")]
    Request { reason: String },
    #[error("invalid payload: {reason}")]
    InvalidPayload { reason: String },
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("review {review_id} not found")]
    ReviewNotFound { review_id: String },
    #[error("repository {repo_id} not found")]
    RepoNotFound { repo_id: String },
    #[error("no changeset for repository {repo_id} at checkpoint {checkpoint}")]
    ChangesetNotFound { repo_id: String, checkpoint: Checkpoint },
    #[error("file {path} is not part of checkpoint {checkpoint}")]
    FileInfoNotFound { path: String, checkpoint: Checkpoint },
    #[error("no checkpoint diff for repository {repo_id} at checkpoint {checkpoint}")]
    CheckpointDiffNotFound { repo_id: String, checkpoint: Checkpoint },
    #[error("review {review_id} has no checkpoint diffs")]
    NoCheckpointDiffs { review_id: String },
    #[error("invalid review {review_id}: {reason}")]
    InvalidReview { review_id: String, reason: String },
    #[error("cannot apply diff to {path}: {source}")]
    PatchApply {
        path: String,
        #[source]
        source: PatchError,
    },
    #[error("base revision {sha} of {path} is unavailable and the diff does not apply to an empty base: {source}")]
    BaseUnavailable {
        path: String,
        sha: String,
        #[source]
        source: PatchError,
    },
    #[error(transparent)]
    Vcs(#[from] VcsError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ResolveError {
    /// True for the "entity or relationship does not exist" family.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ResolveError::ReviewNotFound { .. }
                | ResolveError::RepoNotFound { .. }
                | ResolveError::ChangesetNotFound { .. }
                | ResolveError::FileInfoNotFound { .. }
                | ResolveError::CheckpointDiffNotFound { .. }
                | ResolveError::NoCheckpointDiffs { .. }
                | ResolveError::BaseUnavailable { .. }
        )
    }
}

/// Failure in the local SQLite store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] tokio_rusqlite::Error),
    #[error("invalid stored payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Db(e) => ApiError::Request { reason: e.to_string() },
            StoreError::Payload(e) => ApiError::InvalidPayload { reason: e.to_string() },
        }
    }
}
