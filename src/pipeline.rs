//! Incremental embedding pipeline.
//!
//! One run processes one root:
//!
//! ```text
//! names + load fingerprints → walk → for each file:
//!     read + hash → unchanged? skip
//!                 → chunk → empty? skip (not recorded)
//!                 → embed in batches → upsert "{path}_{i}" → commit fingerprint
//! ```
//!
//! Per-file failures (unreadable file, embedding or vector-store errors) are
//! logged, recorded in the [`EmbedReport`], and the loop moves on; the file's
//! fingerprint is left untouched so the next run retries it. A missing root,
//! a fingerprint load failure or a fingerprint persist failure aborts the run.
//!
//! Runs on the same root are serialized; runs on different roots proceed
//! independently.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::chunk::{load_text, Chunker};
use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::error::{chain, IndexError, Result};
use crate::fingerprint::{content_hash, FingerprintState, FingerprintStore};
use crate::models::ChunkRecord;
use crate::naming::{actor_id, checked_collection_name};
use crate::progress::{EmbedProgressEvent, ProgressMode, ProgressReporter};
use crate::runtime::Services;
use crate::vector_store::VectorStore;
use crate::walker::{flatten, TreeWalker};

/// Files between two `Embedding` progress events.
const PROGRESS_EVERY: u64 = 25;

/// Summary of one embedding run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbedReport {
    pub root: String,
    pub collection: String,
    pub actor_id: String,
    pub files_discovered: u64,
    pub embedded: u64,
    pub unchanged: u64,
    pub empty: u64,
    pub failed: u64,
    pub chunks_upserted: u64,
    pub failures: Vec<FileFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: String,
    pub error: String,
}

enum FileOutcome {
    Embedded { chunks: u64 },
    Unchanged,
    Empty,
}

/// Per-root async mutexes.
#[derive(Default)]
pub struct RootLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RootLocks {
    pub async fn acquire(&self, root: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(root.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub struct EmbeddingPipeline {
    walker: TreeWalker,
    chunker: Chunker,
    batch_size: usize,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    fingerprints: FingerprintStore,
    locks: RootLocks,
}

impl EmbeddingPipeline {
    pub fn new(
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        fingerprints: FingerprintStore,
    ) -> Self {
        Self {
            walker: TreeWalker::new(&config.walker),
            chunker: Chunker::new(&config.chunking),
            batch_size: config.embedding.batch_size.max(1),
            embedder,
            store,
            fingerprints,
            locks: RootLocks::default(),
        }
    }

    /// Embed every new or changed file under `root` into its collection.
    pub async fn run(&self, root: &str, progress: &dyn ProgressReporter) -> Result<EmbedReport> {
        let _guard = self.locks.acquire(root).await;

        let collection = checked_collection_name(root)?;
        let mut report = EmbedReport {
            root: root.to_string(),
            collection: collection.clone(),
            actor_id: actor_id(root),
            ..Default::default()
        };

        tracing::info!(root, collection = %collection, "embedding run started");
        progress.report(EmbedProgressEvent::Discovering {
            root: root.to_string(),
        });

        let tree = self.walker.walk(Path::new(root))?;
        let files = flatten(&tree);
        report.files_discovered = files.len() as u64;

        let mut state = self.fingerprints.load(root).await?;
        tracing::debug!(root, known = state.len(), files = files.len(), "discovered");

        let total = files.len() as u64;
        for (i, file) in files.iter().enumerate() {
            match self.process_file(root, &collection, &mut state, file).await {
                Ok(FileOutcome::Embedded { chunks }) => {
                    report.embedded += 1;
                    report.chunks_upserted += chunks;
                }
                Ok(FileOutcome::Unchanged) => report.unchanged += 1,
                Ok(FileOutcome::Empty) => report.empty += 1,
                Err(e) if e.is_fatal_to_run() => {
                    tracing::error!(root, file = %file, error = %e, "aborting embedding run");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(file = %file, error = %e, "file skipped");
                    report.failed += 1;
                    report.failures.push(FileFailure {
                        path: file.clone(),
                        error: e.to_string(),
                    });
                }
            }

            let n = i as u64 + 1;
            if n % PROGRESS_EVERY == 0 || n == total {
                progress.report(EmbedProgressEvent::Embedding {
                    root: root.to_string(),
                    n,
                    total,
                });
            }
        }

        tracing::info!(
            root,
            embedded = report.embedded,
            unchanged = report.unchanged,
            failed = report.failed,
            "embedding run finished"
        );
        Ok(report)
    }

    async fn process_file(
        &self,
        root: &str,
        collection: &str,
        state: &mut FingerprintState,
        file: &str,
    ) -> Result<FileOutcome> {
        let text = load_text(Path::new(file))?;
        let hash = content_hash(&text);

        if FingerprintStore::has_current_hash(state, file, &hash) {
            tracing::debug!(file, "unchanged");
            return Ok(FileOutcome::Unchanged);
        }

        let chunks = self.chunker.chunk(file, &text);
        if chunks.is_empty() {
            tracing::debug!(file, "no chunks");
            return Ok(FileOutcome::Empty);
        }

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self
                .embedder
                .embed(&texts)
                .await
                .map_err(|e| IndexError::EmbeddingProvider(chain(&e)))?;

            if vectors.len() != batch.len() {
                return Err(IndexError::EmbeddingProvider(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            let records: Vec<ChunkRecord> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, embedding)| ChunkRecord {
                    id: chunk.id(),
                    source: chunk.source_path.clone(),
                    document: chunk.content.clone(),
                    embedding,
                })
                .collect();

            self.store
                .upsert(collection, &records)
                .await
                .map_err(|e| IndexError::VectorStore(chain(&e)))?;
        }

        self.fingerprints.commit(root, state, file, &hash).await?;
        tracing::debug!(file, chunks = chunks.len(), "embedded");

        Ok(FileOutcome::Embedded {
            chunks: chunks.len() as u64,
        })
    }
}

/// Print an [`EmbedReport`] the way the CLI shows it.
pub fn print_report(report: &EmbedReport) {
    println!("embed {}", report.root);
    println!("  collection: {}", report.collection);
    println!("  files discovered: {}", report.files_discovered);
    println!("  embedded: {}", report.embedded);
    println!("  unchanged: {}", report.unchanged);
    println!("  empty: {}", report.empty);
    println!("  failed: {}", report.failed);
    println!("  chunks upserted: {}", report.chunks_upserted);
    for failure in &report.failures {
        println!("  ! {}: {}", failure.path, failure.error);
    }
    println!("ok");
}

/// `fsembed embed`: run the pipeline locally and print the report.
pub async fn run_embed(services: &Services, root: &str, mode: ProgressMode) -> anyhow::Result<()> {
    let reporter = mode.reporter();
    let report = services.pipeline.run(root, reporter.as_ref()).await?;
    print_report(&report);
    Ok(())
}
