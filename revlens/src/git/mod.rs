//! Git integration for revlens.
//!
//! [`GitAccessor`] implements [`VersionControl`] by handing requests to one
//! `std::thread` per repository. The thread holds the `git2::Repository` for
//! its lifetime; Repository is !Send, so it never crosses a thread boundary.
pub mod types;
pub mod worker;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use crossbeam_channel::Sender;
use revlens_core::error::VcsError;
use revlens_core::vcs::{CommitInfo, VersionControl};
use tokio::sync::{oneshot, Mutex};

use crate::git::types::{GitReply, GitRequest};

/// Spawns worker threads on first use of a repository path and keeps them
/// alive until the accessor is dropped.
#[derive(Default)]
pub struct GitAccessor {
    workers: Mutex<HashMap<PathBuf, Sender<GitRequest>>>,
}

impl GitAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    async fn worker(&self, repo_path: &Path) -> Result<Sender<GitRequest>, VcsError> {
        let mut workers = self.workers.lock().await;
        if let Some(tx) = workers.get(repo_path) {
            return Ok(tx.clone());
        }

        let (tx, rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = oneshot::channel();
        let path = repo_path.to_path_buf();
        std::thread::Builder::new()
            .name("revlens-git".into())
            .spawn(move || worker::git_worker_loop(path, rx, ready_tx))
            .map_err(|e| VcsError::BackendError { reason: e.to_string() })?;
        ready_rx.await.map_err(|_| VcsError::WorkerGone)??;

        tracing::debug!(path = %repo_path.display(), "git worker started");
        workers.insert(repo_path.to_path_buf(), tx.clone());
        Ok(tx)
    }

    async fn request<T>(
        &self,
        repo_path: &Path,
        make: impl FnOnce(GitReply<T>) -> GitRequest + Send,
    ) -> Result<T, VcsError> {
        let tx = self.worker(repo_path).await?;
        let (reply, rx) = oneshot::channel();
        tx.send(make(reply)).map_err(|_| VcsError::WorkerGone)?;
        rx.await.map_err(|_| VcsError::WorkerGone)?
    }
}

#[async_trait]
impl VersionControl for GitAccessor {
    async fn file_content(&self, repo_path: &Path, file: &str, sha: &str) -> Result<Option<String>, VcsError> {
        let (file, sha) = (file.to_owned(), sha.to_owned());
        self.request(repo_path, |reply| GitRequest::FileContent { file, sha, reply }).await
    }

    async fn get_commit(&self, repo_path: &Path, sha: &str) -> Result<Option<CommitInfo>, VcsError> {
        let sha = sha.to_owned();
        self.request(repo_path, |reply| GitRequest::Commit { sha, reply }).await
    }

    async fn fetch_all_remotes(&self, repo_path: &Path) -> Result<bool, VcsError> {
        self.request(repo_path, |reply| GitRequest::FetchRemotes { reply }).await
    }
}
