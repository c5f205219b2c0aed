//! revlens: before/after contents for multi-checkpoint code reviews.
//!
//! Entry point for the `revlens` binary. Wires together the user config
//! (`config`), the git worker threads (`git`) and the SQLite review mirror
//! from `revlens-core`, then runs one subcommand and prints its result as
//! JSON on stdout. Logs go to stderr.

mod config;
mod git;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use revlens_core::cache::ReviewCache;
use revlens_core::db::SqliteStore;
use revlens_core::error::{ResolveError, StoreError};
use revlens_core::normalize::normalize_review;
use revlens_core::preconditions::PreconditionValidator;
use revlens_core::resolver::ContentResolver;
use revlens_core::types::{Checkpoint, ReviewCheckpointDiff, ReviewRecord};
use revlens_core::vcs::{ChainedLocator, RepositoryLocator, WorkspaceRepos};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::git::GitAccessor;

#[derive(Debug, Parser)]
#[command(name = "revlens", version, about = "Reconstruct reviewed file contents across checkpoints")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/revlens/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database overriding `db_path` from the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Left and right contents of one file
    Contents {
        review: String,
        repo: String,
        path: String,
        #[arg(long)]
        checkpoint: Option<Checkpoint>,
    },
    /// Contents of every file in the review, grouped by repository
    AllContents {
        review: String,
        #[arg(long)]
        checkpoint: Option<Checkpoint>,
    },
    /// Verify that every base commit exists locally, fetching remotes once if not
    Check { review: String },
    /// Import `{ "review": ..., "checkpointDiffs": [...] }` into the local store
    Import { file: PathBuf },
    /// Remember the local checkout of a review repository
    RememberRepo { repo_id: String, path: PathBuf },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// File format accepted by `revlens import`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportBundle {
    review: ReviewRecord,
    #[serde(default)]
    checkpoint_diffs: Vec<ReviewCheckpointDiff>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Imported<'a> {
    review_id: &'a str,
    checkpoint_diffs: usize,
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn open_store(path: &Path) -> Result<SqliteStore, CliError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| CliError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }
    Ok(SqliteStore::open(&path.to_string_lossy()).await?)
}

/// Runs one subcommand. Returns `false` when the command completed but
/// reports a failure (a failed precondition check).
async fn run(command: Command, config: Config, db_path: PathBuf) -> Result<bool, CliError> {
    let store = Arc::new(open_store(&db_path).await?);

    let locator: Arc<dyn RepositoryLocator> = Arc::new(ChainedLocator::new(vec![
        Box::new(WorkspaceRepos::new(config.repos.clone())),
        Box::new(store.as_ref().clone()),
    ]));
    let vcs = Arc::new(GitAccessor::new());

    match command {
        Command::Contents { review, repo, path, checkpoint } => {
            let resolver = ContentResolver::new(Arc::new(ReviewCache::new(store.clone())), store, vcs, locator);
            let contents = resolver.resolve_contents(&review, &repo, checkpoint, &path).await?;
            print_json(&contents)?;
        }
        Command::AllContents { review, checkpoint } => {
            let resolver = ContentResolver::new(Arc::new(ReviewCache::new(store.clone())), store, vcs, locator);
            let repos = resolver.resolve_all_contents(&review, checkpoint).await?;
            print_json(&repos)?;
        }
        Command::Check { review } => {
            let report = PreconditionValidator::new(store, vcs, locator).check(&review).await?;
            print_json(&report)?;
            return Ok(report.success);
        }
        Command::Import { file } => {
            let raw = std::fs::read_to_string(&file).map_err(|source| CliError::Io {
                path: file.display().to_string(),
                source,
            })?;
            let bundle: ImportBundle = serde_json::from_str(&raw)?;
            normalize_review(bundle.review.clone())?;
            store.import_review(&bundle.review, &bundle.checkpoint_diffs).await?;
            print_json(&Imported {
                review_id: &bundle.review.id,
                checkpoint_diffs: bundle.checkpoint_diffs.len(),
            })?;
        }
        Command::RememberRepo { repo_id, path } => {
            let path = std::path::absolute(&path).map_err(|source| CliError::Io {
                path: path.display().to_string(),
                source,
            })?;
            store.remember_repo(&repo_id, &path.to_string_lossy()).await?;
            print_json(&store.repository_by_id(&repo_id).await.map(|loc| loc.path))?;
        }
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Config is read before logging exists; a bad file is reported once the
    // subscriber is installed.
    let config_file = cli.config.clone().unwrap_or_else(config::config_path);
    let (config, config_problem) = match Config::load(&config_file) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    init_tracing(&config.log_filter);
    if let Some(e) = config_problem {
        tracing::warn!(path = %config_file.display(), error = %e, "ignoring config file");
    }

    let db_path = cli.db.clone().unwrap_or_else(|| config.db_path.clone());
    match run(cli.command, config, db_path).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("revlens: {e}");
            ExitCode::FAILURE
        }
    }
}
