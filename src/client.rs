//! HTTP client for a running `fsembed serve` instance.
//!
//! Used by the CLI when `--api-url` is given, so `embed` and `search` run
//! against a shared server instead of opening the stores locally.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::admin::{FileListing, StatsReport};
use crate::models::QueryHit;
use crate::pipeline::EmbedReport;
use crate::server::{EmbedRequest, QueryRequest, QueryResponse};

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        // Embedding a large root can take a while; no overall timeout.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if status.is_success() {
            return resp.json().await.context("Invalid response from fsembed API");
        }

        let text = resp.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => bail!("{} ({}): {}", status, body.error.code, body.error.message),
            Err(_) => bail!("{}: {}", status, text),
        }
    }

    pub async fn embed(&self, root: &str) -> Result<EmbedReport> {
        let resp = self
            .client
            .post(format!("{}/embed", self.base_url))
            .json(&EmbedRequest {
                file_system_path: root.to_string(),
            })
            .send()
            .await
            .with_context(|| format!("Failed to reach fsembed API at {}", self.base_url))?;
        Self::decode(resp).await
    }

    pub async fn query(&self, root: &str, query: &str, limit: Option<usize>) -> Result<Vec<QueryHit>> {
        let resp = self
            .client
            .post(format!("{}/qry", self.base_url))
            .json(&QueryRequest {
                file_system_path: root.to_string(),
                qry: query.to_string(),
                limit,
            })
            .send()
            .await
            .with_context(|| format!("Failed to reach fsembed API at {}", self.base_url))?;

        let body: QueryResponse = Self::decode(resp).await?;
        Ok(body
            .output
            .documents
            .into_iter()
            .map(|d| QueryHit {
                id: d.id,
                source: d.source,
                document: d.page_content,
                score: d.score,
            })
            .collect())
    }

    pub async fn files(&self, root: &str) -> Result<FileListing> {
        let resp = self
            .client
            .get(format!("{}/files", self.base_url))
            .query(&[("file_system_path", root)])
            .send()
            .await
            .with_context(|| format!("Failed to reach fsembed API at {}", self.base_url))?;
        Self::decode(resp).await
    }

    pub async fn stats(&self) -> Result<StatsReport> {
        let resp = self
            .client
            .get(format!("{}/stats", self.base_url))
            .send()
            .await
            .with_context(|| format!("Failed to reach fsembed API at {}", self.base_url))?;
        Self::decode(resp).await
    }
}
