//! Error taxonomy for the embedding pipeline and query path.
//!
//! Per-file errors ([`IndexError::UnreadableFile`], [`IndexError::EmbeddingProvider`],
//! [`IndexError::VectorStore`]) are contained inside the pipeline loop and
//! recorded in the run report. Run-level errors abort the run and carry the
//! root path so the caller can tell which step failed.

use thiserror::Error;

/// Result alias used by the pipeline and query path.
pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("root not found or not a directory: {root}")]
    RootNotFound { root: String },

    #[error("invalid root {root}: {reason}")]
    InvalidRoot { root: String, reason: String },

    #[error("unreadable file {path}: {reason}")]
    UnreadableFile { path: String, reason: String },

    #[error("embedding provider error: {0}")]
    EmbeddingProvider(String),

    #[error("vector store error: {0}")]
    VectorStore(String),

    #[error("collection '{collection}' not found for root {root} (was it ever embedded?)")]
    CollectionNotFound { root: String, collection: String },

    #[error("failed to load fingerprints for root {root}: {reason}")]
    FingerprintLoad { root: String, reason: String },

    #[error("failed to persist fingerprint for {file} under root {root}: {reason}")]
    FingerprintPersist {
        root: String,
        file: String,
        reason: String,
    },

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl IndexError {
    /// Short machine-readable code, used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            IndexError::RootNotFound { .. } => "root_not_found",
            IndexError::InvalidRoot { .. } => "bad_request",
            IndexError::UnreadableFile { .. } => "unreadable_file",
            IndexError::EmbeddingProvider(_) | IndexError::VectorStore(_) => "upstream",
            IndexError::CollectionNotFound { .. } => "collection_not_found",
            IndexError::FingerprintLoad { .. } | IndexError::FingerprintPersist { .. } => {
                "internal"
            }
            IndexError::InvalidQuery(_) => "bad_request",
        }
    }

    /// True for errors that abort a whole embedding run.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self,
            IndexError::RootNotFound { .. }
                | IndexError::InvalidRoot { .. }
                | IndexError::FingerprintLoad { .. }
                | IndexError::FingerprintPersist { .. }
        )
    }
}

/// Render an `anyhow` chain on one line, for embedding in an [`IndexError`].
pub(crate) fn chain(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let e = IndexError::CollectionNotFound {
            root: "/r".into(),
            collection: "r".into(),
        };
        assert_eq!(e.code(), "collection_not_found");
        assert!(!e.is_fatal_to_run());

        let e = IndexError::RootNotFound { root: "/r".into() };
        assert_eq!(e.code(), "root_not_found");
        assert!(e.is_fatal_to_run());
        assert!(e.to_string().contains("/r"));

        let e = IndexError::InvalidRoot {
            root: "./".into(),
            reason: "too short".into(),
        };
        assert_eq!(e.code(), "bad_request");
    }

    #[test]
    fn test_chain_keeps_context() {
        let err = anyhow::anyhow!("connection refused").context("POST /upsert");
        assert_eq!(chain(&err), "POST /upsert: connection refused");
    }
}
