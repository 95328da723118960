use anyhow::Result;
use sqlx::SqlitePool;

/// Create the fingerprint schema. Safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per (root, file): the hash of the content last embedded.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fingerprints (
            actor_id TEXT NOT NULL,
            file_key TEXT NOT NULL,
            hash TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (actor_id, file_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Maps the sanitized actor id back to the root it was derived from.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS roots (
            actor_id TEXT PRIMARY KEY,
            root TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_fingerprints_updated_at ON fingerprints(updated_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
