//! Similarity search over a root's collection.
//!
//! The query is embedded with the same provider used at index time and sent
//! to the root's collection. Results come back most similar first, with the
//! source path and chunk text of each hit.

use std::sync::Arc;

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::{chain, IndexError, Result};
use crate::models::QueryHit;
use crate::naming::checked_collection_name;
use crate::vector_store::VectorStore;

/// Max characters of chunk text shown per hit in CLI output.
const EXCERPT_CHARS: usize = 240;

pub struct QueryService {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    default_limit: usize,
}

impl QueryService {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        default_limit: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            default_limit: default_limit.max(1),
        }
    }

    /// Top `limit` chunks (default when `None`) under `root` most similar to `query`.
    ///
    /// Fails with [`IndexError::CollectionNotFound`] for a root that was
    /// never embedded and [`IndexError::InvalidQuery`] for a blank query.
    pub async fn search(
        &self,
        root: &str,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<QueryHit>> {
        if query.trim().is_empty() {
            return Err(IndexError::InvalidQuery("query must not be empty".into()));
        }
        let limit = match limit {
            Some(0) => return Err(IndexError::InvalidQuery("limit must be >= 1".into())),
            Some(n) => n,
            None => self.default_limit,
        };

        let collection = checked_collection_name(root)?;
        let exists = self
            .store
            .get_collection(&collection)
            .await
            .map_err(|e| IndexError::VectorStore(chain(&e)))?;
        if exists.is_none() {
            return Err(IndexError::CollectionNotFound {
                root: root.to_string(),
                collection,
            });
        }

        let embedding = embed_query(self.embedder.as_ref(), query)
            .await
            .map_err(|e| IndexError::EmbeddingProvider(chain(&e)))?;

        let hits = self
            .store
            .query(&collection, &embedding, limit)
            .await
            .map_err(|e| IndexError::VectorStore(chain(&e)))?;

        tracing::debug!(root, collection = %collection, hits = hits.len(), "query answered");
        Ok(hits)
    }
}

/// Print hits the way the CLI shows them.
pub fn print_hits(hits: &[QueryHit]) {
    if hits.is_empty() {
        println!("No results.");
        return;
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, hit.score, hit.source);
        let excerpt: String = hit
            .document
            .replace('\n', " ")
            .trim()
            .chars()
            .take(EXCERPT_CHARS)
            .collect();
        println!("    excerpt: \"{}\"", excerpt);
        println!("    id: {}", hit.id);
        println!();
    }
}

/// `fsembed search`: query locally and print the hits.
pub async fn run_search(
    service: &QueryService,
    root: &str,
    query: &str,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let hits = service.search(root, query, limit).await?;
    print_hits(&hits);
    Ok(())
}
