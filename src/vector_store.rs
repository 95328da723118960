//! Vector store abstraction and implementations.
//!
//! The [`VectorStore`] trait covers the operations the pipeline and the
//! query path need from a collection-oriented vector database:
//!
//! | Operation | Purpose |
//! |-----------|---------|
//! | `list_collections` / `get_collection` | discover collections by name |
//! | `upsert` | insert-or-overwrite chunk records by id (creates the collection lazily) |
//! | `query` | nearest chunks to an embedding, most similar first |
//! | `count` | number of records in a collection |
//! | `delete_collection` / `reset` | administrative cleanup |
//! | `heartbeat` | liveness probe |
//!
//! Implementations:
//! - [`ChromaStore`]: the Chroma REST API (v1), with optional basic auth.
//! - [`InMemoryVectorStore`]: brute-force cosine similarity, for tests.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};

use crate::config::VectorStoreConfig;
use crate::embedding::cosine_similarity;
use crate::models::{ChunkRecord, CollectionInfo, QueryHit};
use crate::retry::RetryPolicy;

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;

    /// Look up a collection by name; `None` when it does not exist.
    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>>;

    /// Insert or overwrite records by id, creating the collection if needed.
    async fn upsert(&self, collection: &str, records: &[ChunkRecord]) -> Result<()>;

    /// Up to `k` records nearest to `embedding`, by decreasing similarity.
    async fn query(&self, collection: &str, embedding: &[f32], k: usize) -> Result<Vec<QueryHit>>;

    async fn count(&self, collection: &str) -> Result<usize>;

    /// Drop a collection. Returns false when it did not exist.
    async fn delete_collection(&self, name: &str) -> Result<bool>;

    /// Drop every collection.
    async fn reset(&self) -> Result<()>;

    async fn heartbeat(&self) -> Result<()>;
}

// ============ Chroma ============

const API: &str = "/api/v1";

/// Client for a Chroma server over HTTP.
///
/// Collection ids are resolved by name and cached; a cached id is dropped
/// as soon as a call made with it fails, since another process may have
/// deleted the collection. Collections are created with cosine distance so
/// that `score = 1 - distance`.
pub struct ChromaStore {
    base_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
    ids: Mutex<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct ChromaCollection {
    id: String,
    name: String,
}

impl From<ChromaCollection> for CollectionInfo {
    fn from(c: ChromaCollection) -> Self {
        CollectionInfo {
            id: c.id,
            name: c.name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChromaQueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<serde_json::Value>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<f32>>>,
}

/// Basic auth header value, `None` unless a username is configured.
fn basic_auth_header(username: Option<&str>, password: Option<&str>) -> Option<String> {
    let user = username.filter(|u| !u.is_empty())?;
    let credentials = format!("{}:{}", user, password.unwrap_or_default());
    Some(format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(credentials)
    ))
}

/// Flatten a single-query Chroma response into hits.
fn decode_query_response(resp: ChromaQueryResponse) -> Vec<QueryHit> {
    let ids = resp.ids.into_iter().next().unwrap_or_default();
    let documents = resp
        .documents
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default();
    let metadatas = resp
        .metadatas
        .and_then(|m| m.into_iter().next())
        .unwrap_or_default();
    let distances = resp
        .distances
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default();

    ids.into_iter()
        .enumerate()
        .map(|(i, id)| {
            let source = metadatas
                .get(i)
                .and_then(|m| m.as_ref())
                .and_then(|m| m.get("source"))
                .and_then(|s| s.as_str())
                .unwrap_or_default()
                .to_string();
            let document = documents.get(i).cloned().flatten().unwrap_or_default();
            let score = distances.get(i).map(|d| 1.0 - d).unwrap_or(0.0);
            QueryHit {
                id,
                source,
                document,
                score,
            }
        })
        .collect()
}

impl ChromaStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(value) =
            basic_auth_header(config.username.as_deref(), config.password.as_deref())
        {
            let mut value = HeaderValue::from_str(&value).context("invalid Chroma credentials")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            base_url: config.base_url(),
            client,
            retry: RetryPolicy::new(config.max_retries, config.deadline_secs),
            ids: Mutex::new(HashMap::new()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API, path)
    }

    /// Returns the collection id and whether it came from the cache.
    async fn get_or_create(&self, name: &str) -> Result<(String, bool)> {
        if let Some(id) = self.ids.lock().await.get(name) {
            return Ok((id.clone(), true));
        }

        let url = self.url("/collections");
        let body = serde_json::json!({
            "name": name,
            "get_or_create": true,
            "metadata": {"hnsw:space": "cosine"},
        });
        let created: ChromaCollection = self
            .retry
            .send("Chroma create collection", || self.client.post(&url).json(&body))
            .await?
            .json()
            .await
            .context("Invalid Chroma collection response")?;

        tracing::debug!(collection = name, id = %created.id, "collection ready");
        self.ids
            .lock()
            .await
            .insert(name.to_string(), created.id.clone());
        Ok((created.id, false))
    }

    async fn forget(&self, name: &str) {
        self.ids.lock().await.remove(name);
    }

    async fn post_upsert(&self, id: &str, body: &serde_json::Value) -> Result<()> {
        let url = self.url(&format!("/collections/{}/upsert", id));
        self.retry
            .send("Chroma upsert", || self.client.post(&url).json(body))
            .await?;
        Ok(())
    }

    async fn resolve(&self, name: &str) -> Result<String> {
        if let Some(id) = self.ids.lock().await.get(name) {
            return Ok(id.clone());
        }
        match self.get_collection(name).await? {
            Some(c) => Ok(c.id),
            None => bail!("collection '{}' does not exist", name),
        }
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let url = self.url("/collections");
        let collections: Vec<ChromaCollection> = self
            .retry
            .send("Chroma list collections", || self.client.get(&url))
            .await?
            .json()
            .await
            .context("Invalid Chroma collections response")?;
        Ok(collections.into_iter().map(Into::into).collect())
    }

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let found = self
            .list_collections()
            .await?
            .into_iter()
            .find(|c| c.name == name);

        let mut ids = self.ids.lock().await;
        match &found {
            Some(c) => {
                ids.insert(c.name.clone(), c.id.clone());
            }
            None => {
                ids.remove(name);
            }
        }
        Ok(found)
    }

    async fn upsert(&self, collection: &str, records: &[ChunkRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let body = serde_json::json!({
            "ids": records.iter().map(|r| &r.id).collect::<Vec<_>>(),
            "embeddings": records.iter().map(|r| &r.embedding).collect::<Vec<_>>(),
            "documents": records.iter().map(|r| &r.document).collect::<Vec<_>>(),
            "metadatas": records
                .iter()
                .map(|r| serde_json::json!({"source": r.source}))
                .collect::<Vec<_>>(),
        });

        let (id, cached) = self.get_or_create(collection).await?;
        match self.post_upsert(&id, &body).await {
            Err(e) if cached => {
                self.forget(collection).await;
                let (fresh, _) = self.get_or_create(collection).await?;
                if fresh == id {
                    return Err(e);
                }
                tracing::warn!(collection, stale = %id, id = %fresh, "collection was recreated, retrying upsert");
                self.post_upsert(&fresh, &body).await
            }
            other => other,
        }
    }

    async fn query(&self, collection: &str, embedding: &[f32], k: usize) -> Result<Vec<QueryHit>> {
        let id = self.resolve(collection).await?;
        let url = self.url(&format!("/collections/{}/query", id));
        let body = serde_json::json!({
            "query_embeddings": [embedding],
            "n_results": k,
            "include": ["documents", "metadatas", "distances"],
        });

        let resp = match self
            .retry
            .send("Chroma query", || self.client.post(&url).json(&body))
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                self.forget(collection).await;
                return Err(e);
            }
        };
        let resp: ChromaQueryResponse = resp
            .json()
            .await
            .context("Invalid Chroma query response")?;

        Ok(decode_query_response(resp))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let id = self.resolve(collection).await?;
        let url = self.url(&format!("/collections/{}/count", id));
        let resp = match self
            .retry
            .send("Chroma count", || self.client.get(&url))
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                self.forget(collection).await;
                return Err(e);
            }
        };
        let count: usize = resp
            .json()
            .await
            .context("Invalid Chroma count response")?;
        Ok(count)
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        if self.get_collection(name).await?.is_none() {
            return Ok(false);
        }
        let url = self.url(&format!("/collections/{}", name));
        self.retry
            .send("Chroma delete collection", || self.client.delete(&url))
            .await?;
        self.forget(name).await;
        Ok(true)
    }

    async fn reset(&self) -> Result<()> {
        let url = self.url("/reset");
        self.retry
            .send("Chroma reset", || self.client.post(&url))
            .await?;
        self.ids.lock().await.clear();
        Ok(())
    }

    /// Single attempt, no retries.
    async fn heartbeat(&self) -> Result<()> {
        let url = self.url("/heartbeat");
        let resp = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .with_context(|| format!("Chroma heartbeat at {}", url))?;
        if !resp.status().is_success() {
            bail!("Chroma heartbeat failed ({})", resp.status());
        }
        Ok(())
    }
}

// ============ In-memory ============

struct MemoryCollection {
    id: String,
    records: BTreeMap<String, ChunkRecord>,
}

/// Process-local vector store. Query is brute-force cosine similarity.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<BTreeMap<String, MemoryCollection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids stored in a collection, sorted. Empty when it does not exist.
    pub async fn ids(&self, collection: &str) -> Vec<String> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.records.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        Ok(self
            .collections
            .read()
            .await
            .iter()
            .map(|(name, c)| CollectionInfo {
                id: c.id.clone(),
                name: name.clone(),
            })
            .collect())
    }

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        Ok(self.collections.read().await.get(name).map(|c| CollectionInfo {
            id: c.id.clone(),
            name: name.to_string(),
        }))
    }

    async fn upsert(&self, collection: &str, records: &[ChunkRecord]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let entry = collections
            .entry(collection.to_string())
            .or_insert_with(|| MemoryCollection {
                id: format!("mem-{}", collection),
                records: BTreeMap::new(),
            });
        for record in records {
            entry.records.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(&self, collection: &str, embedding: &[f32], k: usize) -> Result<Vec<QueryHit>> {
        let collections = self.collections.read().await;
        let Some(c) = collections.get(collection) else {
            bail!("collection '{}' does not exist", collection);
        };

        let mut hits: Vec<QueryHit> = c
            .records
            .values()
            .map(|r| QueryHit {
                id: r.id.clone(),
                source: r.source.clone(),
                document: r.document.clone(),
                score: cosine_similarity(embedding, &r.embedding),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        match self.collections.read().await.get(collection) {
            Some(c) => Ok(c.records.len()),
            None => bail!("collection '{}' does not exist", collection),
        }
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        Ok(self.collections.write().await.remove(name).is_some())
    }

    async fn reset(&self) -> Result<()> {
        self.collections.write().await.clear();
        Ok(())
    }

    async fn heartbeat(&self) -> Result<()> {
        Ok(())
    }
}
