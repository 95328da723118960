//! Core data models used throughout fsembed.
//!
//! These types represent the chunks, collections, and search hits that flow
//! through the embedding pipeline and the query path.

use serde::{Deserialize, Serialize};

/// A bounded slice of a file's text; the unit of embedding and storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub source_path: String,
    pub content: String,
    pub sequence_index: usize,
}

impl Chunk {
    /// Storage id: `"{source_path}_{sequence_index}"`.
    ///
    /// Stable across runs, so re-upserting an unchanged file overwrites
    /// instead of duplicating.
    pub fn id(&self) -> String {
        chunk_id(&self.source_path, self.sequence_index)
    }
}

pub fn chunk_id(source_path: &str, sequence_index: usize) -> String {
    format!("{}_{}", source_path, sequence_index)
}

/// A chunk paired with its embedding, ready for upsert.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub source: String,
    pub document: String,
    pub embedding: Vec<f32>,
}

/// A similarity-search hit. Larger `score` means more similar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryHit {
    pub id: String,
    pub source: String,
    pub document: String,
    pub score: f32,
}

/// A collection as reported by the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub id: String,
    pub name: String,
}
