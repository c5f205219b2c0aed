//! Background thread that owns git2::Repository for its lifetime.
//!
//! git2::Repository is !Send; it must be opened inside the thread, not passed in.
//! All communication is via channels: GitRequest in, oneshot replies out.

use std::path::{Path, PathBuf};

use crossbeam_channel::Receiver;
use git2::{ErrorCode, Repository};
use revlens_core::error::VcsError;
use revlens_core::vcs::CommitInfo;
use tokio::sync::oneshot;

use crate::git::types::GitRequest;

/// Entry point for the background thread that owns the git Repository.
///
/// Opens the Repository at `path`, reports the outcome on `ready`, then
/// serves incoming `GitRequest` messages until every sender is dropped.
pub fn git_worker_loop(path: PathBuf, rx: Receiver<GitRequest>, ready: oneshot::Sender<Result<(), VcsError>>) {
    let repo = match Repository::open(&path) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot open repository");
            let _ = ready.send(Err(VcsError::RepoNotFound { path: path.display().to_string() }));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    for request in rx {
        handle_request(&repo, request);
    }
    tracing::debug!(path = %path.display(), "git worker stopped");
}

/// Dispatches a GitRequest to the matching git2 operation and replies.
///
/// A dropped reply receiver is ignored; the caller stopped waiting.
fn handle_request(repo: &Repository, request: GitRequest) {
    match request {
        GitRequest::FileContent { file, sha, reply } => {
            let _ = reply.send(read_content(repo, &file, &sha).map_err(backend));
        }
        GitRequest::Commit { sha, reply } => {
            let _ = reply.send(find_commit(repo, &sha).map_err(backend));
        }
        GitRequest::FetchRemotes { reply } => {
            let _ = reply.send(fetch_remotes(repo).map_err(backend));
        }
    }
}

fn backend(e: git2::Error) -> VcsError {
    VcsError::BackendError { reason: e.message().to_owned() }
}

/// Revision lookups that fail because the object is absent.
fn is_missing(e: &git2::Error) -> bool {
    matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec | ErrorCode::Ambiguous)
}

/// Reads `file` at `sha`. An empty `sha` reads the staged blob, falling back
/// to the working tree copy for files not in the index.
fn read_content(repo: &Repository, file: &str, sha: &str) -> Result<Option<String>, git2::Error> {
    if sha.is_empty() {
        return read_uncommitted(repo, file);
    }

    let commit = match repo.revparse_single(sha).and_then(|obj| obj.peel_to_commit()) {
        Ok(commit) => commit,
        Err(e) if is_missing(&e) => return Ok(None),
        Err(e) => return Err(e),
    };
    let tree = commit.tree()?;
    let entry = match tree.get_path(Path::new(file)) {
        Ok(entry) => entry,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let blob = entry.to_object(repo)?.peel_to_blob()?;
    Ok(Some(String::from_utf8_lossy(blob.content()).into_owned()))
}

fn read_uncommitted(repo: &Repository, file: &str) -> Result<Option<String>, git2::Error> {
    let index = repo.index()?;
    if let Some(entry) = index.get_path(Path::new(file), 0) {
        let blob = repo.find_blob(entry.id)?;
        return Ok(Some(String::from_utf8_lossy(blob.content()).into_owned()));
    }

    let Some(workdir) = repo.workdir() else {
        return Ok(None);
    };
    match std::fs::read(workdir.join(file)) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(git2::Error::from_str(&e.to_string())),
    }
}

fn find_commit(repo: &Repository, sha: &str) -> Result<Option<CommitInfo>, git2::Error> {
    let commit = match repo.revparse_single(sha).and_then(|obj| obj.peel_to_commit()) {
        Ok(commit) => commit,
        Err(e) if is_missing(&e) => return Ok(None),
        Err(e) => return Err(e),
    };
    let author = commit.author();
    Ok(Some(CommitInfo {
        sha: commit.id().to_string(),
        author_name: author.name().unwrap_or_default().to_owned(),
        author_email: author.email().unwrap_or_default().to_owned(),
        summary: commit.summary().unwrap_or_default().to_owned(),
    }))
}

/// Fetches each remote in turn. A failing remote is logged and reported
/// through the `false` return; the remaining remotes are still fetched.
fn fetch_remotes(repo: &Repository) -> Result<bool, git2::Error> {
    let remotes = repo.remotes()?;
    let mut all_ok = true;
    for name in remotes.iter().flatten() {
        let result = repo
            .find_remote(name)
            .and_then(|mut remote| remote.fetch(&[] as &[&str], None, None));
        match result {
            Ok(()) => tracing::debug!(remote = name, "fetched remote"),
            Err(e) => {
                tracing::warn!(remote = name, error = %e, "fetch failed");
                all_ok = false;
            }
        }
    }
    Ok(all_ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{Oid, Signature};
    use revlens_core::vcs::VersionControl;

    use crate::git::GitAccessor;

    fn commit_file(repo: &Repository, name: &str, content: &str, message: &str) -> Oid {
        let workdir = repo.workdir().unwrap();
        std::fs::write(workdir.join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Ann", "ann@example.com").unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents).unwrap()
    }

    fn fixture() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    #[test]
    fn reads_file_at_each_commit() {
        let (_dir, repo) = fixture();
        let first = commit_file(&repo, "a.txt", "one\n", "first");
        let second = commit_file(&repo, "a.txt", "one\ntwo\n", "second");

        let at = |oid: Oid| read_content(&repo, "a.txt", &oid.to_string()).unwrap();
        assert_eq!(at(first).as_deref(), Some("one\n"));
        assert_eq!(at(second).as_deref(), Some("one\ntwo\n"));
        assert_eq!(read_content(&repo, "missing.txt", &second.to_string()).unwrap(), None);
    }

    #[test]
    fn unknown_revision_is_absent() {
        let (_dir, repo) = fixture();
        commit_file(&repo, "a.txt", "one\n", "first");
        let absent = "0123456789abcdef0123456789abcdef01234567";
        assert_eq!(read_content(&repo, "a.txt", absent).unwrap(), None);
        assert_eq!(find_commit(&repo, absent).unwrap(), None);
    }

    #[test]
    fn empty_revision_reads_index_then_working_tree() {
        let (dir, repo) = fixture();
        commit_file(&repo, "a.txt", "committed\n", "first");

        std::fs::write(dir.path().join("a.txt"), "staged\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("a.txt")).unwrap();
        index.write().unwrap();
        std::fs::write(dir.path().join("a.txt"), "unstaged\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "untracked\n").unwrap();

        assert_eq!(read_content(&repo, "a.txt", "").unwrap().as_deref(), Some("staged\n"));
        assert_eq!(read_content(&repo, "b.txt", "").unwrap().as_deref(), Some("untracked\n"));
        assert_eq!(read_content(&repo, "c.txt", "").unwrap(), None);
    }

    #[test]
    fn commit_carries_author_and_summary() {
        let (_dir, repo) = fixture();
        let oid = commit_file(&repo, "a.txt", "one\n", "Add a\n\nLonger body");
        let info = find_commit(&repo, &oid.to_string()).unwrap().unwrap();
        assert_eq!(info.sha, oid.to_string());
        assert_eq!(info.author_name, "Ann");
        assert_eq!(info.author_email, "ann@example.com");
        assert_eq!(info.summary, "Add a");
    }

    #[test]
    fn repository_without_remotes_fetches_cleanly() {
        let (_dir, repo) = fixture();
        assert!(fetch_remotes(&repo).unwrap());
    }

    #[tokio::test]
    async fn accessor_serves_requests_through_worker() {
        let (dir, repo) = fixture();
        let oid = commit_file(&repo, "a.txt", "hello\n", "first");
        drop(repo);

        let git = GitAccessor::new();
        let content = git.file_content(dir.path(), "a.txt", &oid.to_string()).await.unwrap();
        assert_eq!(content.as_deref(), Some("hello\n"));
        let info = git.get_commit(dir.path(), &oid.to_string()).await.unwrap().unwrap();
        assert_eq!(info.summary, "first");
        assert!(git.fetch_all_remotes(dir.path()).await.unwrap());
    }

    #[tokio::test]
    async fn accessor_reports_missing_repository() {
        let dir = tempfile::TempDir::new().unwrap();
        let git = GitAccessor::new();
        let err = git.file_content(&dir.path().join("nope"), "a.txt", "HEAD").await.unwrap_err();
        assert!(matches!(err, VcsError::RepoNotFound { .. }));
    }
}
