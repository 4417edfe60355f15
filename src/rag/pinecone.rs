use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use tokio::sync::OnceCell;

use crate::error::ProviderError;
use super::vector_store::{split_payload, Fragment, VectorRecord, VectorStore, TEXT_KEY};

const PROVIDER: &str = "pinecone";

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    status: IndexStatus,
}

#[derive(Debug, Deserialize)]
struct IndexStatus {
    host: String,
    #[serde(default)]
    ready: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: Vec<f32>,
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<JsonMap<String, JsonValue>>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<PineconeVector>,
    namespace: &'a str,
}

#[derive(Debug, Serialize)]
struct PineconeVector {
    id: String,
    values: Vec<f32>,
    metadata: JsonMap<String, JsonValue>,
}

/// Pinecone index addressed through the environment's controller.
pub struct PineconeStore {
    client: Client,
    controller_url: String,
    api_key: String,
    index_name: String,
    namespace: String,
    host: OnceCell<String>,
}

impl PineconeStore {
    pub fn new(
        controller_url: impl Into<String>,
        api_key: &str,
        index_name: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            controller_url: controller_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            index_name: index_name.to_string(),
            namespace: String::new(),
            host: OnceCell::new(),
        })
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Data plane base URL, looked up once from the index description.
    async fn data_url(&self) -> Result<&str> {
        let host = self
            .host
            .get_or_try_init(|| async {
                let url = format!("{}/databases/{}", self.controller_url, self.index_name);
                let response = self
                    .client
                    .get(&url)
                    .header("Api-Key", &self.api_key)
                    .send()
                    .await?;
                let response = ProviderError::check(PROVIDER, response).await?;
                let description: IndexDescription = response.json().await?;

                if !description.status.ready {
                    tracing::warn!("Pinecone index {} is not ready yet", self.index_name);
                }
                if description.status.host.is_empty() {
                    anyhow::bail!(ProviderError::malformed(PROVIDER, "index has no host"));
                }

                let host = description.status.host;
                let base = if host.starts_with("http://") || host.starts_with("https://") {
                    host
                } else {
                    format!("https://{}", host)
                };
                Ok::<_, anyhow::Error>(base.trim_end_matches('/').to_string())
            })
            .await?;
        Ok(host.as_str())
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn list_indexes(&self) -> Result<Vec<String>> {
        let url = format!("{}/databases", self.controller_url);
        let response = self
            .client
            .get(&url)
            .header("Api-Key", &self.api_key)
            .send()
            .await?;
        let response = ProviderError::check(PROVIDER, response).await?;

        let names: Vec<String> = response.json().await?;
        Ok(names)
    }

    async fn create_index(&self, name: &str, dimension: usize) -> Result<()> {
        let url = format!("{}/databases", self.controller_url);
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .json(&CreateIndexRequest {
                name,
                dimension,
                metric: "cosine",
            })
            .send()
            .await?;
        ProviderError::check(PROVIDER, response).await?;
        Ok(())
    }

    #[tracing::instrument(name = "pinecone.query", err, skip(self, vector))]
    async fn query(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<Fragment>> {
        let url = format!("{}/query", self.data_url().await?);
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .json(&QueryRequest {
                vector,
                top_k,
                include_metadata: true,
                include_values: false,
                namespace: &self.namespace,
            })
            .send()
            .await?;
        let response = ProviderError::check(PROVIDER, response).await?;
        let body: QueryResponse = response.json().await?;

        let fragments = body
            .matches
            .into_iter()
            .map(|m| {
                let (text, metadata) = split_payload(m.metadata.unwrap_or_default());
                Fragment {
                    id: m.id,
                    score: m.score,
                    text,
                    metadata,
                }
            })
            .collect();
        Ok(fragments)
    }

    #[tracing::instrument(name = "pinecone.upsert", err, skip_all, fields(count = records.len()))]
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let vectors = records
            .into_iter()
            .map(|record| {
                let mut metadata = record.metadata;
                metadata.insert(TEXT_KEY.to_string(), JsonValue::String(record.text));
                PineconeVector {
                    id: record.id,
                    values: record.values,
                    metadata,
                }
            })
            .collect();

        let url = format!("{}/vectors/upsert", self.data_url().await?);
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .json(&UpsertRequest {
                vectors,
                namespace: &self.namespace,
            })
            .send()
            .await?;
        ProviderError::check(PROVIDER, response).await?;
        Ok(())
    }
}
