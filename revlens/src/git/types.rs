//! Messages exchanged with the git background thread.
//!
//! Every request carries its own reply sender, so callers on the async side
//! await exactly the answer to their request.

use revlens_core::error::VcsError;
use revlens_core::vcs::CommitInfo;
use tokio::sync::oneshot;

/// One-shot reply channel for a request answered with `T`.
pub type GitReply<T> = oneshot::Sender<Result<T, VcsError>>;

/// Commands sent to the git worker thread over a
/// `crossbeam_channel::Sender<GitRequest>`.
#[derive(Debug)]
pub enum GitRequest {
    /// Content of `file` at `sha`; an empty `sha` reads the index, then the
    /// working tree.
    FileContent {
        file: String,
        sha: String,
        reply: GitReply<Option<String>>,
    },
    /// Author and summary of `sha`.
    Commit {
        sha: String,
        reply: GitReply<Option<CommitInfo>>,
    },
    /// Fetch every configured remote with its default refspecs.
    FetchRemotes { reply: GitReply<bool> },
}
