//! Seams to the version-control accessor and the repository registry.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::VcsError;

/// A commit found in a local repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub author_name: String,
    pub author_email: String,
    pub summary: String,
}

/// Read-only access to repository content and history.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Content of `file` (relative to `repo_path`) at revision `sha`.
    ///
    /// An empty `sha` means the staged/working-tree content. `Ok(None)` when
    /// the revision or the path does not exist.
    async fn file_content(&self, repo_path: &Path, file: &str, sha: &str) -> Result<Option<String>, VcsError>;

    async fn get_commit(&self, repo_path: &Path, sha: &str) -> Result<Option<CommitInfo>, VcsError>;

    /// Fetches every remote. Returns `false` if any fetch failed.
    async fn fetch_all_remotes(&self, repo_path: &Path) -> Result<bool, VcsError>;
}

/// Where a review repository lives on this machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLocation {
    pub repo_id: String,
    pub path: PathBuf,
}

/// Maps review repository ids to local checkouts.
#[async_trait]
pub trait RepositoryLocator: Send + Sync {
    async fn repository_by_id(&self, repo_id: &str) -> Option<RepoLocation>;
}

/// Tries each locator in order; the first hit wins.
pub struct ChainedLocator {
    locators: Vec<Box<dyn RepositoryLocator>>,
}

impl ChainedLocator {
    pub fn new(locators: Vec<Box<dyn RepositoryLocator>>) -> Self {
        Self { locators }
    }
}

#[async_trait]
impl RepositoryLocator for ChainedLocator {
    async fn repository_by_id(&self, repo_id: &str) -> Option<RepoLocation> {
        for locator in &self.locators {
            if let Some(location) = locator.repository_by_id(repo_id).await {
                return Some(location);
            }
        }
        None
    }
}

/// Fixed id → path table, used for the repositories open in the workspace.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceRepos {
    repos: Vec<RepoLocation>,
}

impl WorkspaceRepos {
    pub fn new<I, S, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, P)>,
        S: Into<String>,
        P: Into<PathBuf>,
    {
        let repos = entries
            .into_iter()
            .map(|(id, path)| RepoLocation { repo_id: id.into(), path: path.into() })
            .collect();
        Self { repos }
    }
}

#[async_trait]
impl RepositoryLocator for WorkspaceRepos {
    async fn repository_by_id(&self, repo_id: &str) -> Option<RepoLocation> {
        self.repos.iter().find(|r| r.repo_id == repo_id).cloned()
    }
}
