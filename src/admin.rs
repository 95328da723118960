//! Administrative views and operations: collections, tracked files, stats,
//! reset.
//!
//! Each view is a plain data function shared by the CLI runners below and
//! the HTTP handlers in [`crate::server`].

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::fingerprint::FingerprintStore;
use crate::naming::{actor_id, collection_name};
use crate::runtime::Services;
use crate::vector_store::VectorStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub name: String,
    pub id: String,
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedFile {
    pub file_key: String,
    pub hash: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileListing {
    pub root: String,
    pub actor_id: String,
    pub files: Vec<TrackedFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootStats {
    pub actor_id: String,
    pub root: Option<String>,
    pub collection: Option<String>,
    pub files: u64,
    pub chunks: Option<usize>,
    pub last_updated: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsReport {
    pub roots: Vec<RootStats>,
    pub total_files: u64,
    pub total_chunks: usize,
}

pub async fn collections(store: &dyn VectorStore) -> Result<Vec<CollectionSummary>> {
    let mut out = Vec::new();
    for c in store.list_collections().await? {
        let count = store.count(&c.name).await.ok();
        out.push(CollectionSummary {
            name: c.name,
            id: c.id,
            count,
        });
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

pub async fn files(fingerprints: &FingerprintStore, root: &str) -> Result<FileListing> {
    let files = fingerprints
        .entries(root)
        .await?
        .into_iter()
        .map(|(file_key, entry)| TrackedFile {
            file_key,
            hash: entry.hash,
            updated_at: entry.updated_at,
        })
        .collect();

    Ok(FileListing {
        root: root.to_string(),
        actor_id: actor_id(root),
        files,
    })
}

pub async fn stats(services: &Services) -> Result<StatsReport> {
    let mut roots = Vec::new();
    for actor in services.fingerprints.summary().await? {
        let collection = actor.root.as_deref().map(collection_name);
        let chunks = match &collection {
            Some(name) => services.store.count(name).await.ok(),
            None => None,
        };
        roots.push(RootStats {
            actor_id: actor.actor_id,
            root: actor.root,
            collection,
            files: actor.files,
            chunks,
            last_updated: actor.last_updated,
        });
    }

    Ok(StatsReport {
        total_files: roots.iter().map(|r| r.files).sum(),
        total_chunks: roots.iter().filter_map(|r| r.chunks).sum(),
        roots,
    })
}

/// What a reset removed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResetOutcome {
    pub fingerprints_removed: u64,
    pub collections_removed: usize,
}

/// Forget one root (its collection and fingerprints), or everything.
pub async fn reset(services: &Services, root: Option<&str>) -> Result<ResetOutcome> {
    match root {
        Some(root) => {
            let collection = collection_name(root);
            let dropped = services.store.delete_collection(&collection).await?;
            let removed = services.fingerprints.clear(root).await?;
            tracing::info!(root, collection = %collection, removed, "root reset");
            Ok(ResetOutcome {
                fingerprints_removed: removed,
                collections_removed: usize::from(dropped),
            })
        }
        None => {
            let collections = services.store.list_collections().await?.len();
            services.store.reset().await?;
            let mut removed = 0;
            for actor in services.fingerprints.summary().await? {
                if let Some(root) = &actor.root {
                    removed += services.fingerprints.clear(root).await?;
                }
            }
            tracing::info!(collections, removed, "full reset");
            Ok(ResetOutcome {
                fingerprints_removed: removed,
                collections_removed: collections,
            })
        }
    }
}

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

// ============ CLI runners ============

pub async fn run_collections(services: &Services) -> Result<()> {
    let list = collections(services.store.as_ref()).await?;
    if list.is_empty() {
        println!("No collections.");
        return Ok(());
    }

    println!("{:<38} {:>8}  ID", "COLLECTION", "CHUNKS");
    for c in &list {
        let count = c
            .count
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!("{:<38} {:>8}  {}", c.name, count, c.id);
    }
    Ok(())
}

pub async fn run_files(services: &Services, root: &str) -> Result<()> {
    let listing = files(&services.fingerprints, root).await?;
    println!("files {} (actor {})", listing.root, listing.actor_id);
    if listing.files.is_empty() {
        println!("  (none tracked)");
        return Ok(());
    }
    for f in &listing.files {
        let short: String = f.hash.chars().take(12).collect();
        println!("  {}  {}  {}", short, format_ts(f.updated_at), f.file_key);
    }
    println!("  total: {}", listing.files.len());
    Ok(())
}

pub async fn run_stats(services: &Services) -> Result<()> {
    let report = stats(services).await?;

    println!("fsembed stats");
    println!("  tracked roots: {}", report.roots.len());
    println!("  tracked files: {}", report.total_files);
    println!("  stored chunks: {}", report.total_chunks);

    if !report.roots.is_empty() {
        println!();
        println!(
            "  {:<40} {:>8} {:>8}  LAST EMBEDDED",
            "ROOT", "FILES", "CHUNKS"
        );
        for r in &report.roots {
            let root = r.root.as_deref().unwrap_or(&r.actor_id);
            let chunks = r
                .chunks
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string());
            let last = r.last_updated.map(format_ts).unwrap_or_default();
            println!("  {:<40} {:>8} {:>8}  {}", root, r.files, chunks, last);
        }
    }
    Ok(())
}

pub async fn run_reset(services: &Services, root: Option<&str>, yes: bool) -> Result<()> {
    if !yes {
        bail!("reset is destructive; pass --yes to confirm");
    }
    let outcome = reset(services, root).await?;
    match root {
        Some(root) => println!("reset {}", root),
        None => println!("reset (all roots)"),
    }
    println!("  collections removed: {}", outcome.collections_removed);
    println!("  fingerprints removed: {}", outcome.fingerprints_removed);
    println!("ok");
    Ok(())
}
