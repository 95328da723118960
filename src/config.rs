//! TOML configuration with environment overrides.
//!
//! Every section has defaults, so a missing config file yields a usable
//! [`Config::default`]. Environment variables are applied once, at startup,
//! through [`Config::apply_env_overrides`]; library code never reads the
//! environment for these settings.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub walker: WalkerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/fsembed.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk size, in tokens.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Context shared between adjacent chunks, in tokens.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1500
}
fn default_chunk_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct WalkerConfig {
    /// Directory names never descended into.
    #[serde(default = "default_ignore_folders")]
    pub ignore_folders: Vec<String>,
    /// Filename suffixes that are never indexed.
    #[serde(default = "default_ignore_extensions")]
    pub ignore_extensions: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            ignore_folders: default_ignore_folders(),
            ignore_extensions: default_ignore_extensions(),
            follow_symlinks: false,
        }
    }
}

fn default_ignore_folders() -> Vec<String> {
    split_list("node_modules,.git,bin,obj,__pycache__")
}

fn default_ignore_extensions() -> Vec<String> {
    split_list(
        ".pfx,.crt,.cer,.pem,.postman_collection.json,.postman_environment,\
         .png,.gif,.jpeg,.jpg,.ico,.svg,.woff,.woff2,.ttf,\
         .gz,.zip,.tar,.tgz,.tar.gz,.rar,.7z,\
         .pdf,.doc,.docx,.xls,.xlsx,.ppt,.pptx",
    )
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override for the `openai` and `ollama` providers.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_deadline_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    #[serde(default = "default_chroma_host")]
    pub host: String,
    #[serde(default = "default_chroma_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            host: default_chroma_host(),
            port: default_chroma_port(),
            username: None,
            password: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

impl VectorStoreConfig {
    pub fn base_url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

fn default_chroma_host() -> String {
    "localhost".to_string()
}
fn default_chroma_port() -> u16 {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
        }
    }
}

fn default_limit() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:6002".to_string()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Apply environment overrides through `lookup` (usually `std::env::var`).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CHUNK_SIZE") {
            self.chunking.chunk_size = v
                .trim()
                .parse()
                .with_context(|| format!("CHUNK_SIZE is not a number: {}", v))?;
        }
        if let Some(v) = lookup("CHUNK_OVERLAP") {
            self.chunking.chunk_overlap = v
                .trim()
                .parse()
                .with_context(|| format!("CHUNK_OVERLAP is not a number: {}", v))?;
        }
        if let Some(v) = lookup("IGNORE_FOLDERS") {
            self.walker.ignore_folders = split_list(&v);
        }
        if let Some(v) = lookup("IGNORE_FILE_EXTS") {
            self.walker.ignore_extensions = split_list(&v);
        }
        if let Some(v) = lookup("CHROMA_HOST") {
            self.vector_store.host = v;
        }
        if let Some(v) = lookup("CHROMA_PORT") {
            self.vector_store.port = v
                .trim()
                .parse()
                .with_context(|| format!("CHROMA_PORT is not a port number: {}", v))?;
        }
        if let Some(v) = lookup("CHROMA_USR") {
            self.vector_store.username = Some(v);
        }
        if let Some(v) = lookup("CHROMA_PWD") {
            self.vector_store.password = Some(v);
        }
        if let Some(v) = lookup("FSEMBED_DB_PATH") {
            self.db.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FSEMBED_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = lookup("EMBEDDING_PROVIDER") {
            self.embedding.provider = v;
        }
        if let Some(v) = lookup("EMBEDDING_MODEL") {
            self.embedding.model = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }
        if self.retrieval.default_limit < 1 {
            bail!("retrieval.default_limit must be >= 1");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "local" => {}
            "openai" | "ollama" => {
                if self.embedding.model.is_none() {
                    bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
                if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                    bail!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        self.embedding.provider
                    );
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
                other
            ),
        }

        Ok(())
    }
}

/// Load the config file, falling back to defaults when it does not exist.
///
/// Environment overrides are not applied here; see [`Config::apply_env_overrides`].
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    Ok(config)
}
