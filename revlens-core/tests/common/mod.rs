//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use revlens_core::cache::{ReviewApi, ReviewCache};
use revlens_core::diff_store::DiffStoreApi;
use revlens_core::error::{ApiError, VcsError};
use revlens_core::patch::{DiffHunk, FileDiff};
use revlens_core::preconditions::PreconditionValidator;
use revlens_core::resolver::ContentResolver;
use revlens_core::types::{
    ChangesetRecord, CheckpointDiff, FileStatus, ModifiedFile, ReviewCheckpointDiff, ReviewRecord,
};
use revlens_core::vcs::{CommitInfo, VersionControl, WorkspaceRepos};

pub const REVIEW: &str = "review-1";
pub const REPO: &str = "repo-1";

/// Version-control fake counting content reads and remote fetches.
#[derive(Default)]
pub struct FakeVcs {
    files: Mutex<HashMap<(String, String), String>>,
    commits: Mutex<HashSet<String>>,
    remote_commits: Mutex<HashSet<String>>,
    pub content_reads: AtomicUsize,
    pub remote_fetches: AtomicUsize,
    fetch_fails: AtomicBool,
}

impl FakeVcs {
    pub fn with_file(self, file: &str, sha: &str, content: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert((file.to_owned(), sha.to_owned()), content.to_owned());
        self.commits.lock().unwrap().insert(sha.to_owned());
        self
    }

    pub fn with_commit(self, sha: &str) -> Self {
        self.commits.lock().unwrap().insert(sha.to_owned());
        self
    }

    /// A commit that only becomes visible after `fetch_all_remotes`.
    pub fn with_remote_commit(self, sha: &str) -> Self {
        self.remote_commits.lock().unwrap().insert(sha.to_owned());
        self
    }

    /// Makes `fetch_all_remotes` return a backend error.
    pub fn with_failing_fetch(self) -> Self {
        self.fetch_fails.store(true, Ordering::SeqCst);
        self
    }

    pub fn reads(&self) -> usize {
        self.content_reads.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.remote_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn file_content(&self, _repo_path: &Path, file: &str, sha: &str) -> Result<Option<String>, VcsError> {
        self.content_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(&(file.to_owned(), sha.to_owned()))
            .cloned())
    }

    async fn get_commit(&self, _repo_path: &Path, sha: &str) -> Result<Option<CommitInfo>, VcsError> {
        Ok(self.commits.lock().unwrap().contains(sha).then(|| CommitInfo {
            sha: sha.to_owned(),
            author_name: "Ann".into(),
            author_email: "ann@example.com".into(),
            summary: "base".into(),
        }))
    }

    async fn fetch_all_remotes(&self, _repo_path: &Path) -> Result<bool, VcsError> {
        self.remote_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fetch_fails.load(Ordering::SeqCst) {
            return Err(VcsError::BackendError { reason: "remote unreachable".into() });
        }
        let fetched: Vec<String> = self.remote_commits.lock().unwrap().drain().collect();
        self.commits.lock().unwrap().extend(fetched);
        Ok(true)
    }
}

/// Review and diff API serving fixed records.
pub struct MemoryApi {
    pub review: ReviewRecord,
    pub diffs: Vec<ReviewCheckpointDiff>,
}

#[async_trait]
impl ReviewApi for MemoryApi {
    async fn fetch_review(&self, review_id: &str) -> Result<Option<ReviewRecord>, ApiError> {
        Ok((review_id == self.review.id).then(|| self.review.clone()))
    }
}

#[async_trait]
impl DiffStoreApi for MemoryApi {
    async fn fetch_review_checkpoint_diffs(&self, review_id: &str) -> Result<Vec<ReviewCheckpointDiff>, ApiError> {
        if review_id != self.review.id {
            return Ok(Vec::new());
        }
        Ok(self.diffs.clone())
    }
}

pub fn file(path: &str, status: FileStatus) -> ModifiedFile {
    ModifiedFile {
        file: path.into(),
        old_file: path.into(),
        status,
        additions: 0,
        deletions: 0,
    }
}

pub fn renamed(old: &str, new: &str) -> ModifiedFile {
    ModifiedFile {
        file: new.into(),
        old_file: old.into(),
        status: FileStatus::Renamed,
        additions: 0,
        deletions: 0,
    }
}

pub fn changeset(checkpoint: u32, in_checkpoint: Vec<ModifiedFile>, cumulative: Vec<ModifiedFile>) -> ChangesetRecord {
    ChangesetRecord {
        repo_id: REPO.into(),
        checkpoint: Some(checkpoint),
        branch: "feature".into(),
        modified_files: cumulative,
        modified_files_in_checkpoint: Some(in_checkpoint),
    }
}

pub fn review(changesets: Vec<ChangesetRecord>) -> ReviewRecord {
    ReviewRecord {
        id: REVIEW.into(),
        title: "Add greeting".into(),
        text: String::new(),
        approved_by: Default::default(),
        all_reviewers_must_approve: false,
        review_changesets: changesets,
    }
}

pub fn checkpoint_diff(
    checkpoint: u32,
    left_sha: &str,
    right_sha: &str,
    left_diffs: Vec<FileDiff>,
    right_diffs: Vec<FileDiff>,
) -> ReviewCheckpointDiff {
    ReviewCheckpointDiff {
        repo_id: REPO.into(),
        checkpoint: Some(checkpoint),
        diffs: CheckpointDiff {
            left_base_sha: left_sha.into(),
            left_base_author: "Ann".into(),
            right_base_sha: right_sha.into(),
            right_base_author: "Bob".into(),
            left_diffs,
            right_diffs,
            latest_commit_sha: None,
        },
    }
}

/// Hand-written single-hunk diff, independent of any diff generator.
pub fn diff(path: &str, hunk: (u32, u32, u32, u32), lines: &[&str]) -> FileDiff {
    FileDiff {
        old_file_name: path.into(),
        new_file_name: path.into(),
        hunks: vec![DiffHunk {
            old_start: hunk.0,
            old_lines: hunk.1,
            new_start: hunk.2,
            new_lines: hunk.3,
            lines: lines.iter().map(|s| (*s).to_owned()).collect(),
        }],
    }
}

pub struct Harness {
    pub vcs: Arc<FakeVcs>,
    pub resolver: ContentResolver<MemoryApi>,
    pub validator: PreconditionValidator,
}

pub fn harness(api: MemoryApi, vcs: FakeVcs) -> Harness {
    let api = Arc::new(api);
    let vcs = Arc::new(vcs);
    let repos = Arc::new(WorkspaceRepos::new([(REPO, "/work/repo-1")]));
    let resolver = ContentResolver::new(
        Arc::new(ReviewCache::new(api.clone())),
        api.clone(),
        vcs.clone(),
        repos.clone(),
    );
    let validator = PreconditionValidator::new(api, vcs.clone(), repos);
    Harness { vcs, resolver, validator }
}
