//! Per-root file fingerprints: the hash of each file's last embedded content.
//!
//! The pipeline consults fingerprints to skip unchanged files. State is keyed
//! by the root's actor id (see [`crate::naming::actor_id`]) and, inside a
//! root, by the file key (see [`crate::naming::file_key`]).
//!
//! A file's entry is written only after its chunks have been embedded and
//! upserted. [`FingerprintStore::commit`] updates the in-memory mapping and
//! durably upserts that single row, so a crash mid-run loses at most the file
//! being processed.
//!
//! Storage is pluggable through [`FingerprintBackend`]:
//!
//! - [`SqliteFingerprintBackend`]: one row per `(actor_id, file_key)` in
//!   SQLite (`sqlx`).
//! - [`InMemoryFingerprintBackend`]: process-local, for tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::error::{chain, IndexError, Result};
use crate::naming::{actor_id, file_key};

/// Stored fingerprint for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FingerprintEntry {
    pub hash: String,
    pub updated_at: i64,
}

/// File key → fingerprint, for a single root.
pub type FingerprintState = HashMap<String, FingerprintEntry>;

/// Aggregate view of one tracked root.
#[derive(Debug, Clone, Serialize)]
pub struct ActorSummary {
    pub actor_id: String,
    pub root: Option<String>,
    pub files: u64,
    pub last_updated: Option<i64>,
}

/// Lowercase hex SHA-256 of a file's text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Storage for fingerprint state, keyed by actor id.
#[async_trait]
pub trait FingerprintBackend: Send + Sync {
    /// Full state for an actor; empty when nothing was ever recorded.
    async fn get_state(&self, actor_id: &str) -> AnyResult<FingerprintState>;

    /// Replace the actor's state.
    async fn set_state(&self, actor_id: &str, root: &str, state: &FingerprintState)
        -> AnyResult<()>;

    /// Upsert a single file entry.
    async fn put_entry(&self, actor_id: &str, root: &str, file_key: &str, hash: &str)
        -> AnyResult<()>;

    /// Remove all state for an actor. Returns the number of entries removed.
    async fn clear_state(&self, actor_id: &str) -> AnyResult<u64>;

    async fn list_actors(&self) -> AnyResult<Vec<ActorSummary>>;
}

// ============ SQLite ============

pub struct SqliteFingerprintBackend {
    pool: SqlitePool,
}

impl SqliteFingerprintBackend {
    /// Open the database at `path`, creating it and its schema if needed.
    pub async fn open(path: &Path) -> AnyResult<Self> {
        let pool = crate::db::connect(path).await?;
        crate::migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }
}

async fn touch_root(
    conn: &mut sqlx::SqliteConnection,
    actor_id: &str,
    root: &str,
    now: i64,
) -> AnyResult<()> {
    sqlx::query(
        "INSERT INTO roots (actor_id, root, updated_at) VALUES (?, ?, ?)
         ON CONFLICT(actor_id) DO UPDATE SET root = excluded.root, updated_at = excluded.updated_at",
    )
    .bind(actor_id)
    .bind(root)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait]
impl FingerprintBackend for SqliteFingerprintBackend {
    async fn get_state(&self, actor_id: &str) -> AnyResult<FingerprintState> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT file_key, hash, updated_at FROM fingerprints WHERE actor_id = ?",
        )
        .bind(actor_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(key, hash, updated_at)| (key, FingerprintEntry { hash, updated_at }))
            .collect())
    }

    async fn set_state(
        &self,
        actor_id: &str,
        root: &str,
        state: &FingerprintState,
    ) -> AnyResult<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM fingerprints WHERE actor_id = ?")
            .bind(actor_id)
            .execute(&mut *tx)
            .await?;

        for (key, entry) in state {
            sqlx::query(
                "INSERT INTO fingerprints (actor_id, file_key, hash, updated_at) VALUES (?, ?, ?, ?)",
            )
            .bind(actor_id)
            .bind(key)
            .bind(&entry.hash)
            .bind(entry.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        touch_root(&mut tx, actor_id, root, now).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn put_entry(
        &self,
        actor_id: &str,
        root: &str,
        file_key: &str,
        hash: &str,
    ) -> AnyResult<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO fingerprints (actor_id, file_key, hash, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(actor_id, file_key) DO UPDATE SET
                hash = excluded.hash,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(actor_id)
        .bind(file_key)
        .bind(hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        touch_root(&mut tx, actor_id, root, now).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn clear_state(&self, actor_id: &str) -> AnyResult<u64> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM fingerprints WHERE actor_id = ?")
            .bind(actor_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM roots WHERE actor_id = ?")
            .bind(actor_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn list_actors(&self) -> AnyResult<Vec<ActorSummary>> {
        let rows: Vec<(String, Option<String>, i64, Option<i64>)> = sqlx::query_as(
            r#"
            SELECT f.actor_id, r.root, COUNT(*), MAX(f.updated_at)
            FROM fingerprints f
            LEFT JOIN roots r ON r.actor_id = f.actor_id
            GROUP BY f.actor_id, r.root
            ORDER BY f.actor_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(actor_id, root, files, last_updated)| ActorSummary {
                actor_id,
                root,
                files: files as u64,
                last_updated,
            })
            .collect())
    }
}

// ============ In-memory ============

#[derive(Default)]
pub struct InMemoryFingerprintBackend {
    actors: RwLock<HashMap<String, (String, FingerprintState)>>,
}

impl InMemoryFingerprintBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FingerprintBackend for InMemoryFingerprintBackend {
    async fn get_state(&self, actor_id: &str) -> AnyResult<FingerprintState> {
        let actors = self.actors.read().await;
        Ok(actors
            .get(actor_id)
            .map(|(_, state)| state.clone())
            .unwrap_or_default())
    }

    async fn set_state(
        &self,
        actor_id: &str,
        root: &str,
        state: &FingerprintState,
    ) -> AnyResult<()> {
        let mut actors = self.actors.write().await;
        actors.insert(actor_id.to_string(), (root.to_string(), state.clone()));
        Ok(())
    }

    async fn put_entry(
        &self,
        actor_id: &str,
        root: &str,
        file_key: &str,
        hash: &str,
    ) -> AnyResult<()> {
        let mut actors = self.actors.write().await;
        let (stored_root, state) = actors
            .entry(actor_id.to_string())
            .or_insert_with(|| (root.to_string(), FingerprintState::new()));
        *stored_root = root.to_string();
        state.insert(
            file_key.to_string(),
            FingerprintEntry {
                hash: hash.to_string(),
                updated_at: chrono::Utc::now().timestamp(),
            },
        );
        Ok(())
    }

    async fn clear_state(&self, actor_id: &str) -> AnyResult<u64> {
        let mut actors = self.actors.write().await;
        Ok(actors
            .remove(actor_id)
            .map(|(_, state)| state.len() as u64)
            .unwrap_or(0))
    }

    async fn list_actors(&self) -> AnyResult<Vec<ActorSummary>> {
        let actors = self.actors.read().await;
        let mut out: Vec<ActorSummary> = actors
            .iter()
            .filter(|(_, (_, state))| !state.is_empty())
            .map(|(id, (root, state))| ActorSummary {
                actor_id: id.clone(),
                root: Some(root.clone()),
                files: state.len() as u64,
                last_updated: state.values().map(|e| e.updated_at).max(),
            })
            .collect();
        out.sort_by(|a, b| a.actor_id.cmp(&b.actor_id));
        Ok(out)
    }
}

// ============ Store ============

/// Root-level fingerprint operations on top of a [`FingerprintBackend`].
#[derive(Clone)]
pub struct FingerprintStore {
    backend: Arc<dyn FingerprintBackend>,
}

impl FingerprintStore {
    pub fn new(backend: Arc<dyn FingerprintBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryFingerprintBackend::new()))
    }

    /// Load the state for `root`. Empty for a root never embedded.
    pub async fn load(&self, root: &str) -> Result<FingerprintState> {
        self.backend
            .get_state(&actor_id(root))
            .await
            .map_err(|e| IndexError::FingerprintLoad {
                root: root.to_string(),
                reason: chain(&e),
            })
    }

    /// True iff the stored hash for `file_path` equals `hash` exactly.
    pub fn has_current_hash(state: &FingerprintState, file_path: &str, hash: &str) -> bool {
        state
            .get(&file_key(file_path))
            .is_some_and(|entry| entry.hash == hash)
    }

    /// Update the in-memory mapping only.
    pub fn record(state: &mut FingerprintState, file_path: &str, hash: &str) {
        state.insert(
            file_key(file_path),
            FingerprintEntry {
                hash: hash.to_string(),
                updated_at: chrono::Utc::now().timestamp(),
            },
        );
    }

    /// Persist the whole mapping for `root`, replacing what was stored.
    pub async fn save(&self, root: &str, state: &FingerprintState) -> Result<()> {
        self.backend
            .set_state(&actor_id(root), root, state)
            .await
            .map_err(|e| IndexError::FingerprintPersist {
                root: root.to_string(),
                file: "*".to_string(),
                reason: chain(&e),
            })
    }

    /// Record `hash` for `file_path` and durably persist that single entry.
    pub async fn commit(
        &self,
        root: &str,
        state: &mut FingerprintState,
        file_path: &str,
        hash: &str,
    ) -> Result<()> {
        Self::record(state, file_path, hash);
        self.backend
            .put_entry(&actor_id(root), root, &file_key(file_path), hash)
            .await
            .map_err(|e| IndexError::FingerprintPersist {
                root: root.to_string(),
                file: file_path.to_string(),
                reason: chain(&e),
            })
    }

    /// Forget everything recorded for `root`.
    pub async fn clear(&self, root: &str) -> AnyResult<u64> {
        self.backend.clear_state(&actor_id(root)).await
    }

    /// Entries for `root`, sorted by file key.
    pub async fn entries(&self, root: &str) -> AnyResult<Vec<(String, FingerprintEntry)>> {
        let state = self.backend.get_state(&actor_id(root)).await?;
        let mut entries: Vec<_> = state.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    pub async fn summary(&self) -> AnyResult<Vec<ActorSummary>> {
        self.backend.list_actors().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash("hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(content_hash("hello"), content_hash("hello"));
        assert_ne!(content_hash("hello"), content_hash("hello "));
    }

    #[test]
    fn test_has_current_hash_exact_match() {
        let mut state = FingerprintState::new();
        assert!(!FingerprintStore::has_current_hash(&state, "/r/a.txt", "h1"));

        FingerprintStore::record(&mut state, "/r/a.txt", "h1");
        assert!(FingerprintStore::has_current_hash(&state, "/r/a.txt", "h1"));
        assert!(!FingerprintStore::has_current_hash(&state, "/r/a.txt", "h2"));
        assert!(state.contains_key("/r/a__txt"));
    }

    async fn exercise_backend(store: FingerprintStore) {
        let root = "/home/me/notes";
        assert!(store.load(root).await.unwrap().is_empty());

        let mut state = store.load(root).await.unwrap();
        store.commit(root, &mut state, "/home/me/notes/a.txt", "h1").await.unwrap();
        store.commit(root, &mut state, "/home/me/notes/b.md", "h2").await.unwrap();

        let reloaded = store.load(root).await.unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(FingerprintStore::has_current_hash(&reloaded, "/home/me/notes/a.txt", "h1"));

        // Overwrite is per-row.
        let mut state = reloaded;
        store.commit(root, &mut state, "/home/me/notes/a.txt", "h3").await.unwrap();
        let reloaded = store.load(root).await.unwrap();
        assert!(FingerprintStore::has_current_hash(&reloaded, "/home/me/notes/a.txt", "h3"));
        assert_eq!(reloaded.len(), 2);

        // Other roots are isolated.
        assert!(store.load("/home/me/other").await.unwrap().is_empty());

        let summary = store.summary().await.unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].actor_id, "homemenotes");
        assert_eq!(summary[0].root.as_deref(), Some(root));
        assert_eq!(summary[0].files, 2);

        let entries = store.entries(root).await.unwrap();
        assert_eq!(entries[0].0, "/home/me/notes/a__txt");

        // save replaces the whole mapping.
        let mut only_one = FingerprintState::new();
        FingerprintStore::record(&mut only_one, "/home/me/notes/c.txt", "h4");
        store.save(root, &only_one).await.unwrap();
        let reloaded = store.load(root).await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.contains_key("/home/me/notes/c__txt"));

        assert_eq!(store.clear(root).await.unwrap(), 1);
        assert!(store.load(root).await.unwrap().is_empty());
        assert!(store.summary().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_backend() {
        exercise_backend(FingerprintStore::in_memory()).await;
    }

    #[tokio::test]
    async fn test_sqlite_backend() {
        let tmp = TempDir::new().unwrap();
        let backend = SqliteFingerprintBackend::open(&tmp.path().join("data/fp.sqlite"))
            .await
            .unwrap();
        exercise_backend(FingerprintStore::new(Arc::new(backend))).await;
    }

    #[tokio::test]
    async fn test_sqlite_state_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fp.sqlite");
        {
            let store =
                FingerprintStore::new(Arc::new(SqliteFingerprintBackend::open(&path).await.unwrap()));
            let mut state = FingerprintState::new();
            store.commit("/r", &mut state, "/r/a.txt", "h1").await.unwrap();
        }
        let store =
            FingerprintStore::new(Arc::new(SqliteFingerprintBackend::open(&path).await.unwrap()));
        let state = store.load("/r").await.unwrap();
        assert!(FingerprintStore::has_current_hash(&state, "/r/a.txt", "h1"));
    }
}
