use std::collections::BTreeMap;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::patch::FileDiff;

/// Ordinal of one incremental update to a review. `0` is the initial submission.
pub type Checkpoint = u32;

/// Status tag recorded for each file a changeset touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Untracked,
    Renamed,
    Copied,
    Unmerged,
    #[serde(other)]
    Unknown,
}

impl FileStatus {
    /// True when the file has no base content on either side.
    pub fn is_new_file(self) -> bool {
        matches!(self, FileStatus::Added | FileStatus::Untracked)
    }
}

/// A file touched by a changeset.
///
/// `old_file` equals `file` unless the file was renamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedFile {
    pub file: String,
    pub old_file: String,
    pub status: FileStatus,
    #[serde(default)]
    pub additions: u32,
    #[serde(default)]
    pub deletions: u32,
}

/// Approval recorded by one reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub approved_at: i64,
}

/// A review as delivered by the remote API, before normalization.
///
/// Legacy records may omit `checkpoint` and `modifiedFilesInCheckpoint`.
/// [`crate::normalize::normalize_review`] turns this into a [`Review`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub approved_by: BTreeMap<String, Approval>,
    #[serde(default)]
    pub all_reviewers_must_approve: bool,
    pub review_changesets: Vec<ChangesetRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesetRecord {
    pub repo_id: String,
    #[serde(default)]
    pub checkpoint: Option<Checkpoint>,
    #[serde(default)]
    pub branch: String,
    pub modified_files: Vec<ModifiedFile>,
    #[serde(default)]
    pub modified_files_in_checkpoint: Option<Vec<ModifiedFile>>,
}

/// Normalized, immutable review snapshot.
///
/// `changesets` keeps insertion order; ordering decisions always use
/// [`Changeset::checkpoint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    pub id: String,
    pub title: String,
    pub text: String,
    pub approved_by: BTreeMap<String, Approval>,
    pub all_reviewers_must_approve: bool,
    pub changesets: Vec<Changeset>,
}

impl Review {
    /// Changesets belonging to `repo_id`, in insertion order.
    pub fn changesets_for<'a>(&'a self, repo_id: &'a str) -> impl Iterator<Item = &'a Changeset> {
        self.changesets.iter().filter(move |c| c.repo_id == repo_id)
    }

    /// Distinct repository ids in first-seen order.
    pub fn repo_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for changeset in &self.changesets {
            if !ids.contains(&changeset.repo_id.as_str()) {
                ids.push(&changeset.repo_id);
            }
        }
        ids
    }
}

/// Per-repo, per-checkpoint record of modified files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Changeset {
    pub repo_id: String,
    pub checkpoint: Checkpoint,
    pub branch: String,
    /// Every file touched by the review up to and including this checkpoint.
    pub modified_files: Vec<ModifiedFile>,
    /// Only the files touched at this checkpoint.
    pub modified_files_in_checkpoint: Vec<ModifiedFile>,
}

impl Changeset {
    pub fn touches_in_checkpoint(&self, path: &str) -> bool {
        self.modified_files_in_checkpoint.iter().any(|f| f.file == path)
    }

    /// Looks up `path` in the per-checkpoint list, then in the cumulative list.
    pub fn file_info(&self, path: &str) -> Option<&ModifiedFile> {
        self.modified_files_in_checkpoint
            .iter()
            .find(|f| f.file == path)
            .or_else(|| self.modified_files.iter().find(|f| f.file == path))
    }
}

/// Stored diffs for one (repo, checkpoint).
///
/// `left_base_sha == right_base_sha` means both sides share one base revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointDiff {
    pub left_base_sha: String,
    #[serde(default)]
    pub left_base_author: String,
    pub right_base_sha: String,
    #[serde(default)]
    pub right_base_author: String,
    #[serde(default)]
    pub left_diffs: Vec<FileDiff>,
    #[serde(default)]
    pub right_diffs: Vec<FileDiff>,
    #[serde(default)]
    pub latest_commit_sha: Option<String>,
}

impl CheckpointDiff {
    pub fn shares_base(&self) -> bool {
        self.left_base_sha == self.right_base_sha
    }

    /// Finds the diff record for `side`, preferring a new-file-name match.
    pub fn diff_for(&self, side: Side, path: &str) -> Option<&FileDiff> {
        let diffs = match side {
            Side::Left => &self.left_diffs,
            Side::Right => &self.right_diffs,
        };
        diffs
            .iter()
            .find(|d| d.new_file_name == path)
            .or_else(|| diffs.iter().find(|d| d.old_file_name == path))
    }
}

/// Flat record returned by the remote diff API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewCheckpointDiff {
    pub repo_id: String,
    #[serde(default)]
    pub checkpoint: Option<Checkpoint>,
    pub diffs: CheckpointDiff,
}

/// Which half of a comparison is being reconstructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

/// Result of resolving one file.
///
/// Serializes as `{"left": .., "right": ..}` or
/// `{"fileNotIncludedInReview": true}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedContents {
    Contents { left: String, right: String },
    FileNotIncludedInReview,
}

impl Serialize for ResolvedContents {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ResolvedContents::Contents { left, right } => {
                let mut state = serializer.serialize_struct("ResolvedContents", 2)?;
                state.serialize_field("left", left)?;
                state.serialize_field("right", right)?;
                state.end()
            }
            ResolvedContents::FileNotIncludedInReview => {
                let mut state = serializer.serialize_struct("ResolvedContents", 1)?;
                state.serialize_field("fileNotIncludedInReview", &true)?;
                state.end()
            }
        }
    }
}

impl ResolvedContents {
    pub fn contents(&self) -> Option<(&str, &str)> {
        match self {
            ResolvedContents::Contents { left, right } => Some((left, right)),
            ResolvedContents::FileNotIncludedInReview => None,
        }
    }
}

/// One file of a batch resolution. `error` is set when this file alone failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedFile {
    pub path: String,
    pub left_path: String,
    pub right_path: String,
    pub left: String,
    pub right: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRepo {
    pub repo_id: String,
    pub files: Vec<ResolvedFile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreconditionErrorKind {
    RepoNotFound,
    CommitNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreconditionError {
    #[serde(rename = "type")]
    pub kind: PreconditionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreconditionReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PreconditionError>,
}

impl PreconditionReport {
    pub fn ok() -> Self {
        Self { success: true, error: None }
    }

    pub fn failed(kind: PreconditionErrorKind, message: String) -> Self {
        Self { success: false, error: Some(PreconditionError { kind, message }) }
    }
}
