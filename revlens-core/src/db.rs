//! SQLite-backed local mirror of reviews, checkpoint diffs and repo paths.
//!
//! [`SqliteStore`] implements the [`ReviewApi`], [`DiffStoreApi`] and
//! [`RepositoryLocator`] seams so the resolver can run without a remote
//! service.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use crate::cache::ReviewApi;
use crate::diff_store::DiffStoreApi;
use crate::error::{ApiError, StoreError};
use crate::types::{CheckpointDiff, ReviewCheckpointDiff, ReviewRecord};
use crate::vcs::{RepoLocation, RepositoryLocator};

/// Opens (or creates) the SQLite database at `path`, configures WAL mode,
/// and applies schema migrations via the `schema_version` table.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the file cannot be opened, WAL configuration
/// fails, or schema DDL fails.
pub async fn open_db(path: &str) -> Result<Connection, tokio_rusqlite::Error> {
    let conn = Connection::open(path).await?;

    conn.call(|db| -> rusqlite::Result<()> {
        db.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )?;
        db.busy_timeout(Duration::from_secs(5))?;
        Ok(())
    })
    .await?;

    conn.call(|db| -> rusqlite::Result<()> {
        crate::schema::migrate(db)?;
        Ok(())
    })
    .await?;

    Ok(conn)
}

/// Returns the current Unix timestamp in seconds.
fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[derive(Clone)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// # Errors
    ///
    /// See [`open_db`].
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        Ok(Self { conn: open_db(path).await? })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Stores `record` and its checkpoint diffs, replacing any previous copy.
    ///
    /// Runs inside one `BEGIN IMMEDIATE` transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if serialization or the transaction fails.
    pub async fn import_review(
        &self,
        record: &ReviewRecord,
        diffs: &[ReviewCheckpointDiff],
    ) -> Result<(), StoreError> {
        let id = record.id.clone();
        let title = record.title.clone();
        let payload = serde_json::to_string(record)?;
        let rows = diffs
            .iter()
            .map(|d| Ok((d.repo_id.clone(), d.checkpoint, serde_json::to_string(&d.diffs)?)))
            .collect::<Result<Vec<_>, serde_json::Error>>()?;

        self.conn
            .call(move |db| -> rusqlite::Result<()> {
                let now = now_secs();
                let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
                tx.execute("DELETE FROM checkpoint_diffs WHERE review_id = ?1", rusqlite::params![&id])?;
                tx.execute(
                    "INSERT INTO reviews (id, title, payload, imported_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id)
                     DO UPDATE SET title = excluded.title,
                                   payload = excluded.payload,
                                   imported_at = excluded.imported_at",
                    rusqlite::params![&id, &title, &payload, now],
                )?;
                for (repo_id, checkpoint, diff) in &rows {
                    tx.execute(
                        "INSERT INTO checkpoint_diffs (review_id, repo_id, checkpoint, payload)
                         VALUES (?1, ?2, ?3, ?4)",
                        rusqlite::params![&id, repo_id, checkpoint, diff],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        tracing::info!(review_id = %record.id, diffs = diffs.len(), "imported review");
        Ok(())
    }

    /// Loads the stored wire record for `review_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails or the payload is invalid.
    pub async fn load_review(&self, review_id: &str) -> Result<Option<ReviewRecord>, StoreError> {
        let review_id = review_id.to_owned();
        let payload: Option<String> = self
            .conn
            .call(move |db| -> rusqlite::Result<Option<String>> {
                db.query_row(
                    "SELECT payload FROM reviews WHERE id = ?1",
                    rusqlite::params![&review_id],
                    |r| r.get(0),
                )
                .optional()
            })
            .await?;
        Ok(payload.map(|p| serde_json::from_str(&p)).transpose()?)
    }

    /// Loads every checkpoint diff stored for `review_id`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails or a payload is invalid.
    pub async fn load_checkpoint_diffs(&self, review_id: &str) -> Result<Vec<ReviewCheckpointDiff>, StoreError> {
        let review_id = review_id.to_owned();
        let rows = self
            .conn
            .call(move |db| -> rusqlite::Result<Vec<(String, Option<u32>, String)>> {
                let mut stmt = db.prepare(
                    "SELECT repo_id, checkpoint, payload FROM checkpoint_diffs
                     WHERE review_id = ?1 ORDER BY rowid",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![&review_id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(repo_id, checkpoint, payload)| -> Result<ReviewCheckpointDiff, StoreError> {
                let diffs: CheckpointDiff = serde_json::from_str(&payload)?;
                Ok(ReviewCheckpointDiff { repo_id, checkpoint, diffs })
            })
            .collect()
    }

    /// Records the local path of `repo_id` for later lookups.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the upsert fails.
    pub async fn remember_repo(&self, repo_id: &str, path: &str) -> Result<(), StoreError> {
        let repo_id = repo_id.to_owned();
        let path = path.to_owned();
        self.conn
            .call(move |db| -> rusqlite::Result<()> {
                let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
                tx.execute(
                    "INSERT INTO repo_mappings (repo_id, path, remembered_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(repo_id)
                     DO UPDATE SET path = excluded.path,
                                   remembered_at = excluded.remembered_at",
                    rusqlite::params![&repo_id, &path, now_secs()],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub async fn remembered_repo(&self, repo_id: &str) -> Result<Option<PathBuf>, StoreError> {
        let repo_id = repo_id.to_owned();
        let path: Option<String> = self
            .conn
            .call(move |db| -> rusqlite::Result<Option<String>> {
                db.query_row(
                    "SELECT path FROM repo_mappings WHERE repo_id = ?1",
                    rusqlite::params![&repo_id],
                    |r| r.get(0),
                )
                .optional()
            })
            .await?;
        Ok(path.map(PathBuf::from))
    }
}

#[async_trait]
impl ReviewApi for SqliteStore {
    async fn fetch_review(&self, review_id: &str) -> Result<Option<ReviewRecord>, ApiError> {
        Ok(self.load_review(review_id).await?)
    }
}

#[async_trait]
impl DiffStoreApi for SqliteStore {
    async fn fetch_review_checkpoint_diffs(&self, review_id: &str) -> Result<Vec<ReviewCheckpointDiff>, ApiError> {
        Ok(self.load_checkpoint_diffs(review_id).await?)
    }
}

#[async_trait]
impl RepositoryLocator for SqliteStore {
    async fn repository_by_id(&self, repo_id: &str) -> Option<RepoLocation> {
        match self.remembered_repo(repo_id).await {
            Ok(path) => path.map(|path| RepoLocation { repo_id: repo_id.to_owned(), path }),
            Err(e) => {
                tracing::warn!(repo_id, error = %e, "failed to read remembered repository path");
                None
            }
        }
    }
}
