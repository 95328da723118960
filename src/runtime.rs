//! Service wiring: builds the embedding provider, vector store, fingerprint
//! store, pipeline and query service from a [`Config`].

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::fingerprint::{FingerprintStore, SqliteFingerprintBackend};
use crate::pipeline::EmbeddingPipeline;
use crate::query::QueryService;
use crate::vector_store::{ChromaStore, VectorStore};

/// Everything the CLI and the HTTP API need, shared behind `Arc`s.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub store: Arc<dyn VectorStore>,
    pub fingerprints: FingerprintStore,
    pub pipeline: Arc<EmbeddingPipeline>,
    pub query: Arc<QueryService>,
}

impl Services {
    /// Production wiring: configured embedding provider, Chroma, SQLite.
    pub async fn build(config: &Config) -> Result<Self> {
        config.validate()?;

        let embedder = create_provider(&config.embedding)
            .context("Failed to initialize embedding provider")?;
        let store: Arc<dyn VectorStore> = Arc::new(
            ChromaStore::new(&config.vector_store).context("Failed to create Chroma client")?,
        );
        let backend = SqliteFingerprintBackend::open(&config.db.path)
            .await
            .context("Failed to open fingerprint database")?;

        Ok(Self::from_parts(
            config,
            embedder,
            store,
            FingerprintStore::new(Arc::new(backend)),
        ))
    }

    /// Wire pre-built components. Tests use this with in-memory stores.
    pub fn from_parts(
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        fingerprints: FingerprintStore,
    ) -> Self {
        let pipeline = EmbeddingPipeline::new(
            config,
            embedder.clone(),
            store.clone(),
            fingerprints.clone(),
        );
        let query = QueryService::new(embedder, store.clone(), config.retrieval.default_limit);

        Self {
            config: Arc::new(config.clone()),
            store,
            fingerprints,
            pipeline: Arc::new(pipeline),
            query: Arc::new(query),
        }
    }
}
