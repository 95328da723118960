//! # fsembed
//!
//! Incremental filesystem embedding into a vector store, with similarity
//! search over a CLI and an HTTP API.
//!
//! fsembed walks a directory tree, drops excluded folders and file types,
//! chunks each text file, embeds the chunks and upserts them into a
//! collection named after the root path. Per-file content hashes are kept so
//! that re-running on the same root only re-embeds files whose content
//! changed.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │ Tree Walker │──▶│     Pipeline     │──▶│ Vector Store │
//! │ (walkdir)   │   │ hash/chunk/embed │   │   (Chroma)   │
//! └─────────────┘   └────────┬─────────┘   └──────┬───────┘
//!                            │                    │
//!                   ┌────────▼────────┐     ┌─────▼─────┐
//!                   │  Fingerprints   │     │   Query   │
//!                   │    (SQLite)     │     │   Path    │
//!                   └─────────────────┘     └─────┬─────┘
//!                                       ┌─────────┴─────────┐
//!                                       ▼                   ▼
//!                                 ┌──────────┐        ┌──────────┐
//!                                 │   CLI    │        │   HTTP   │
//!                                 └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! fsembed embed --file-system-path /home/me/notes
//! fsembed search --file-system-path /home/me/notes --query "deployment"
//! fsembed serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`naming`] | Actor ids, collection names, file keys derived from paths |
//! | [`walker`] | Directory discovery with folder/extension exclusion |
//! | [`chunk`] | Text loading and chunking |
//! | [`fingerprint`] | Per-root file hashes |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector_store`] | Vector store abstraction (Chroma, in-memory) |
//! | [`pipeline`] | Incremental embedding runs |
//! | [`query`] | Similarity search |
//! | [`admin`] | Collections, tracked files, stats, reset |
//! | [`server`] | HTTP API |
//! | [`client`] | HTTP API client |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod admin;
pub mod chunk;
pub mod client;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod fingerprint;
pub mod migrate;
pub mod models;
pub mod naming;
pub mod pipeline;
pub mod progress;
pub mod query;
pub mod retry;
pub mod runtime;
pub mod server;
pub mod vector_store;
pub mod walker;
