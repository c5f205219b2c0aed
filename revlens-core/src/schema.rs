/// DDL to create the schema_version tracking table.
///
/// Applied unconditionally on every DB open (before checking the version),
/// using `IF NOT EXISTS` so it is safe to run multiple times.
pub const SCHEMA_VERSION_DDL: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER NOT NULL
    ) STRICT;
";

/// DDL for the full v1 schema.
///
/// Contains three tables:
/// - `reviews`: one row per review, the wire record kept as JSON.
/// - `checkpoint_diffs`: stored diffs per (review, repo, checkpoint). A NULL
///   checkpoint marks legacy single-checkpoint data.
/// - `repo_mappings`: remembered local path of each review repository.
///
/// All tables use `STRICT` mode for type enforcement.
/// `checkpoint_diffs` cascades on review deletion.
pub const SCHEMA_V1_SQL: &str = "
    CREATE TABLE IF NOT EXISTS reviews (
        id          TEXT    PRIMARY KEY,
        title       TEXT    NOT NULL DEFAULT '',
        payload     TEXT    NOT NULL,
        imported_at INTEGER NOT NULL
    ) STRICT;

    CREATE TABLE IF NOT EXISTS checkpoint_diffs (
        review_id   TEXT    NOT NULL REFERENCES reviews(id) ON DELETE CASCADE,
        repo_id     TEXT    NOT NULL,
        checkpoint  INTEGER,
        payload     TEXT    NOT NULL
    ) STRICT;

    CREATE INDEX IF NOT EXISTS checkpoint_diffs_review
        ON checkpoint_diffs (review_id, repo_id, checkpoint);

    CREATE TABLE IF NOT EXISTS repo_mappings (
        repo_id       TEXT    PRIMARY KEY,
        path          TEXT    NOT NULL,
        remembered_at INTEGER NOT NULL
    ) STRICT;
";

/// Runs forward-only schema migration to migrate the DB to the latest version.
///
/// Idempotent: safe to call on every open.
///
/// # Errors
///
/// Returns `rusqlite::Error` if the DDL fails or the version row cannot be read.
pub fn migrate(db: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    db.execute_batch(SCHEMA_VERSION_DDL)?;

    let version: i64 = db
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

    if version < 1 {
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        tx.execute_batch(SCHEMA_V1_SQL)?;
        tx.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
        tx.commit()?;
    }

    Ok(())
}
