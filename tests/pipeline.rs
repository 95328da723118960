//! Integration tests for the incremental embedding pipeline and query path.
//!
//! Uses a deterministic bag-of-words embedder that counts how many texts it
//! was asked to embed, the in-memory vector store, and both fingerprint
//! backends.

use std::fs;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use fsembed::config::Config;
use fsembed::embedding::EmbeddingProvider;
use fsembed::error::IndexError;
use fsembed::fingerprint::{
    ActorSummary, FingerprintBackend, FingerprintState, FingerprintStore,
    InMemoryFingerprintBackend, SqliteFingerprintBackend,
};
use fsembed::models::{ChunkRecord, CollectionInfo, QueryHit};
use fsembed::naming::{collection_name, file_key};
use fsembed::progress::NoProgress;
use fsembed::runtime::Services;
use fsembed::vector_store::{InMemoryVectorStore, VectorStore};

const DIMS: usize = 256;

/// Hashes each word into one of `DIMS` buckets. Texts containing `POISON`
/// fail while `fail_poison` is set.
struct CountingEmbedder {
    texts_embedded: AtomicUsize,
    fail_poison: AtomicBool,
}

impl CountingEmbedder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            texts_embedded: AtomicUsize::new(0),
            fail_poison: AtomicBool::new(false),
        })
    }

    fn count(&self) -> usize {
        self.texts_embedded.load(Ordering::SeqCst)
    }
}

fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut h: u32 = 2166136261;
        for b in word.to_lowercase().bytes() {
            h ^= b as u32;
            h = h.wrapping_mul(16777619);
        }
        v[(h as usize) % DIMS] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if self.fail_poison.load(Ordering::SeqCst) && texts.iter().any(|t| t.contains("POISON")) {
            anyhow::bail!("provider rejected input");
        }
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }
}

fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.chunking.chunk_size = 16;
    cfg.chunking.chunk_overlap = 2;
    cfg.walker.ignore_folders = vec!["node_modules".to_string()];
    cfg.walker.ignore_extensions = vec![".log".to_string()];
    cfg
}

struct Harness {
    services: Services,
    embedder: Arc<CountingEmbedder>,
    store: Arc<InMemoryVectorStore>,
}

fn harness_with(fingerprints: FingerprintStore) -> Harness {
    let embedder = CountingEmbedder::new();
    let store = Arc::new(InMemoryVectorStore::new());
    let services = Services::from_parts(&test_config(), embedder.clone(), store.clone(), fingerprints);
    Harness {
        services,
        embedder,
        store,
    }
}

fn harness() -> Harness {
    harness_with(FingerprintStore::in_memory())
}

fn write(root: &std::path::Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn root_str(tmp: &TempDir) -> String {
    tmp.path().to_str().unwrap().to_string()
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a.txt", b"hello world");
    write(tmp.path(), "b.log", b"x");
    write(tmp.path(), "node_modules/pkg/c.txt", b"should never be seen");
    let root = root_str(&tmp);

    let h = harness();
    let report = h.services.pipeline.run(&root, &NoProgress).await.unwrap();

    assert_eq!(report.files_discovered, 1);
    assert_eq!(report.embedded, 1);
    assert_eq!(report.chunks_upserted, 1);
    assert_eq!(report.collection, collection_name(&root));

    let ids = h.store.ids(&collection_name(&root)).await;
    assert_eq!(ids, vec![format!("{}/a.txt_0", root)]);

    let hits = h.services.query.search(&root, "hello", None).await.unwrap();
    assert_eq!(hits[0].source, format!("{}/a.txt", root));
    assert_eq!(hits[0].document, "hello world");
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "one.md", b"# One\n\nFirst document about rust crates.");
    write(tmp.path(), "two.md", b"# Two\n\nSecond document about python packages.");
    write(tmp.path(), "sub/three.txt", b"Third document about deployment.");
    let root = root_str(&tmp);

    let h = harness();
    let first = h.services.pipeline.run(&root, &NoProgress).await.unwrap();
    assert_eq!(first.embedded, 3);
    let calls_after_first = h.embedder.count();
    let ids_after_first = h.store.ids(&collection_name(&root)).await;

    let second = h.services.pipeline.run(&root, &NoProgress).await.unwrap();
    assert_eq!(second.embedded, 0);
    assert_eq!(second.unchanged, 3);
    assert_eq!(second.chunks_upserted, 0);
    assert_eq!(h.embedder.count(), calls_after_first);
    assert_eq!(h.store.ids(&collection_name(&root)).await, ids_after_first);
}

#[tokio::test]
async fn test_only_changed_file_is_reembedded() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a.txt", b"alpha content");
    write(tmp.path(), "b.txt", b"beta content");
    write(tmp.path(), "c.txt", b"gamma content");
    let root = root_str(&tmp);

    let h = harness();
    h.services.pipeline.run(&root, &NoProgress).await.unwrap();
    let before = h.embedder.count();

    write(tmp.path(), "b.txt", b"beta content, revised");
    let report = h.services.pipeline.run(&root, &NoProgress).await.unwrap();

    assert_eq!(report.embedded, 1);
    assert_eq!(report.unchanged, 2);
    assert_eq!(h.embedder.count(), before + 1);

    let hits = h.services.query.search(&root, "revised", Some(1)).await.unwrap();
    assert_eq!(hits[0].source, format!("{}/b.txt", root));
    assert!(hits[0].document.contains("revised"));
}

#[tokio::test]
async fn test_empty_file_is_not_recorded() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "e.txt", b"");
    write(tmp.path(), "blank.txt", b"   \n\n  ");
    let root = root_str(&tmp);

    let h = harness();
    let first = h.services.pipeline.run(&root, &NoProgress).await.unwrap();
    assert_eq!(first.empty, 2);
    assert_eq!(first.embedded, 0);
    assert!(h.services.fingerprints.entries(&root).await.unwrap().is_empty());

    // Still empty, not "unchanged", on the next run.
    let second = h.services.pipeline.run(&root, &NoProgress).await.unwrap();
    assert_eq!(second.empty, 2);
    assert_eq!(second.unchanged, 0);
    assert!(h.store.get_collection(&collection_name(&root)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unreadable_file_is_skipped_and_run_continues() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "bad.bin", &[0xff, 0xfe, 0xfd, 0x00]);
    write(tmp.path(), "good.txt", b"perfectly fine text");
    let root = root_str(&tmp);

    let h = harness();
    let report = h.services.pipeline.run(&root, &NoProgress).await.unwrap();

    assert_eq!(report.embedded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].path, format!("{}/bad.bin", root));
    assert!(report.failures[0].error.contains("UTF-8"));

    let tracked: Vec<String> = h
        .services
        .fingerprints
        .entries(&root)
        .await
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(tracked, vec![file_key(&format!("{}/good.txt", root))]);
}

#[tokio::test]
async fn test_embedding_failure_leaves_file_for_next_run() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "ok.txt", b"regular words");
    write(tmp.path(), "poison.txt", b"this one is POISON for the provider");
    let root = root_str(&tmp);

    let h = harness();
    h.embedder.fail_poison.store(true, Ordering::SeqCst);
    let first = h.services.pipeline.run(&root, &NoProgress).await.unwrap();
    assert_eq!(first.embedded, 1);
    assert_eq!(first.failed, 1);
    assert!(first.failures[0].error.contains("provider rejected input"));

    h.embedder.fail_poison.store(false, Ordering::SeqCst);
    let second = h.services.pipeline.run(&root, &NoProgress).await.unwrap();
    assert_eq!(second.embedded, 1);
    assert_eq!(second.unchanged, 1);
    assert_eq!(second.failed, 0);
}

/// Delegates to the in-memory store but rejects upserts of chunks whose
/// source path contains `reject`.
struct RejectingStore {
    inner: InMemoryVectorStore,
}

#[async_trait]
impl VectorStore for RejectingStore {
    async fn list_collections(&self) -> anyhow::Result<Vec<CollectionInfo>> {
        self.inner.list_collections().await
    }
    async fn get_collection(&self, name: &str) -> anyhow::Result<Option<CollectionInfo>> {
        self.inner.get_collection(name).await
    }
    async fn upsert(&self, collection: &str, records: &[ChunkRecord]) -> anyhow::Result<()> {
        if records.iter().any(|r| r.source.contains("reject")) {
            anyhow::bail!("store refused the batch");
        }
        self.inner.upsert(collection, records).await
    }
    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
    ) -> anyhow::Result<Vec<QueryHit>> {
        self.inner.query(collection, embedding, k).await
    }
    async fn count(&self, collection: &str) -> anyhow::Result<usize> {
        self.inner.count(collection).await
    }
    async fn delete_collection(&self, name: &str) -> anyhow::Result<bool> {
        self.inner.delete_collection(name).await
    }
    async fn reset(&self) -> anyhow::Result<()> {
        self.inner.reset().await
    }
    async fn heartbeat(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Loads and lists normally, but every single-entry write fails.
struct ReadOnlyFingerprints {
    inner: InMemoryFingerprintBackend,
}

#[async_trait]
impl FingerprintBackend for ReadOnlyFingerprints {
    async fn get_state(&self, actor_id: &str) -> anyhow::Result<FingerprintState> {
        self.inner.get_state(actor_id).await
    }
    async fn set_state(
        &self,
        actor_id: &str,
        root: &str,
        state: &FingerprintState,
    ) -> anyhow::Result<()> {
        self.inner.set_state(actor_id, root, state).await
    }
    async fn put_entry(
        &self,
        _actor_id: &str,
        _root: &str,
        _file_key: &str,
        _hash: &str,
    ) -> anyhow::Result<()> {
        anyhow::bail!("disk is read-only")
    }
    async fn clear_state(&self, actor_id: &str) -> anyhow::Result<u64> {
        self.inner.clear_state(actor_id).await
    }
    async fn list_actors(&self) -> anyhow::Result<Vec<ActorSummary>> {
        self.inner.list_actors().await
    }
}

#[tokio::test]
async fn test_store_failure_is_contained_to_the_file() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "keep.txt", b"kept words");
    write(tmp.path(), "reject.txt", b"refused words");
    let root = root_str(&tmp);

    let embedder = CountingEmbedder::new();
    let store = Arc::new(RejectingStore {
        inner: InMemoryVectorStore::new(),
    });
    let fingerprints = FingerprintStore::in_memory();
    let services = Services::from_parts(&test_config(), embedder, store.clone(), fingerprints);

    let report = services.pipeline.run(&root, &NoProgress).await.unwrap();
    assert_eq!(report.embedded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].path, format!("{}/reject.txt", root));
    assert!(report.failures[0].error.contains("store refused the batch"));

    let tracked: Vec<String> = services
        .fingerprints
        .entries(&root)
        .await
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(tracked, vec![file_key(&format!("{}/keep.txt", root))]);

    let ids = store.inner.ids(&collection_name(&root)).await;
    assert_eq!(ids, vec![format!("{}/keep.txt_0", root)]);

    // Still failing next run: it was never recorded as done.
    let second = services.pipeline.run(&root, &NoProgress).await.unwrap();
    assert_eq!(second.unchanged, 1);
    assert_eq!(second.failed, 1);
}

#[tokio::test]
async fn test_fingerprint_persist_failure_aborts_run() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a.txt", b"first file");
    write(tmp.path(), "b.txt", b"second file");
    let root = root_str(&tmp);

    let fingerprints = FingerprintStore::new(Arc::new(ReadOnlyFingerprints {
        inner: InMemoryFingerprintBackend::new(),
    }));
    let h = harness_with(fingerprints);

    let err = h
        .services
        .pipeline
        .run(&root, &NoProgress)
        .await
        .unwrap_err();
    match err {
        IndexError::FingerprintPersist { root: r, file, reason } => {
            assert_eq!(r, root);
            assert_eq!(file, format!("{}/a.txt", root));
            assert!(reason.contains("disk is read-only"));
        }
        other => panic!("expected FingerprintPersist, got {:?}", other),
    }

    // a.txt was upserted before the commit failed; b.txt was never reached.
    assert_eq!(h.embedder.count(), 1);
    let ids = h.store.ids(&collection_name(&root)).await;
    assert_eq!(ids, vec![format!("{}/a.txt_0", root)]);
    assert!(h.services.fingerprints.entries(&root).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_root_aborts() {
    let h = harness();
    let err = h
        .services
        .pipeline
        .run("/definitely/not/a/real/root", &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::RootNotFound { .. }));
    assert_eq!(h.embedder.count(), 0);
}

#[tokio::test]
async fn test_chunk_ids_are_stable_across_rewrites() {
    let tmp = TempDir::new().unwrap();
    let long: String = (0..40).map(|i| format!("word{} ", i)).collect();
    write(tmp.path(), "long.txt", long.as_bytes());
    let root = root_str(&tmp);

    let h = harness();
    let first = h.services.pipeline.run(&root, &NoProgress).await.unwrap();
    assert!(first.chunks_upserted > 1);
    let ids = h.store.ids(&collection_name(&root)).await;
    let expected: Vec<String> = {
        let mut v: Vec<String> = (0..first.chunks_upserted)
            .map(|i| format!("{}/long.txt_{}", root, i))
            .collect();
        v.sort();
        v
    };
    assert_eq!(ids, expected);

    // Same shape, different words: same ids, overwritten in place.
    let changed: String = (0..40).map(|i| format!("term{} ", i)).collect();
    write(tmp.path(), "long.txt", changed.as_bytes());
    let second = h.services.pipeline.run(&root, &NoProgress).await.unwrap();
    assert_eq!(second.chunks_upserted, first.chunks_upserted);
    assert_eq!(h.store.ids(&collection_name(&root)).await, expected);
}

#[tokio::test]
async fn test_concurrent_runs_on_same_root_are_serialized() {
    let tmp = TempDir::new().unwrap();
    for i in 0..10 {
        write(tmp.path(), &format!("f{}.txt", i), format!("file number {}", i).as_bytes());
    }
    let root = root_str(&tmp);

    let h = harness();
    let pipeline = h.services.pipeline.clone();
    let (a, b) = tokio::join!(pipeline.run(&root, &NoProgress), pipeline.run(&root, &NoProgress));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.embedded + b.embedded, 10);
    assert_eq!(a.unchanged + b.unchanged, 10);
    assert_eq!(h.embedder.count(), 10);
}

#[tokio::test]
async fn test_sqlite_fingerprints_survive_restart() {
    let tmp = TempDir::new().unwrap();
    let files = tmp.path().join("files");
    write(&files, "a.txt", b"persisted between processes");
    let root = files.to_str().unwrap().to_string();
    let db_path = tmp.path().join("data/fsembed.sqlite");

    let first = harness_with(FingerprintStore::new(Arc::new(
        SqliteFingerprintBackend::open(&db_path).await.unwrap(),
    )));
    assert_eq!(first.services.pipeline.run(&root, &NoProgress).await.unwrap().embedded, 1);

    let second = harness_with(FingerprintStore::new(Arc::new(
        SqliteFingerprintBackend::open(&db_path).await.unwrap(),
    )));
    let report = second.services.pipeline.run(&root, &NoProgress).await.unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(second.embedder.count(), 0);
}

#[tokio::test]
async fn test_query_unknown_root() {
    let h = harness();
    let err = h
        .services
        .query
        .search("/never/embedded", "anything", None)
        .await
        .unwrap_err();
    match err {
        IndexError::CollectionNotFound { root, collection } => {
            assert_eq!(root, "/never/embedded");
            assert_eq!(collection, "neverembedded");
        }
        other => panic!("expected CollectionNotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_query_rejects_blank_query() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a.txt", b"some text");
    let root = root_str(&tmp);

    let h = harness();
    h.services.pipeline.run(&root, &NoProgress).await.unwrap();
    let err = h.services.query.search(&root, "   ", None).await.unwrap_err();
    assert!(matches!(err, IndexError::InvalidQuery(_)));
}

#[tokio::test]
async fn test_query_respects_limit_and_order() {
    let tmp = TempDir::new().unwrap();
    for (name, text) in [
        ("kube.txt", "kubernetes kubernetes cluster"),
        ("docker.txt", "docker images and kubernetes"),
        ("cooking.txt", "pasta recipes with tomato"),
    ] {
        write(tmp.path(), name, text.as_bytes());
    }
    let root = root_str(&tmp);

    let h = harness();
    h.services.pipeline.run(&root, &NoProgress).await.unwrap();

    let hits = h.services.query.search(&root, "kubernetes", Some(2)).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits[0].score >= hits[1].score);
    assert_eq!(hits[0].source, format!("{}/kube.txt", root));
}
