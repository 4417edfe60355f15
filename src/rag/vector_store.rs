use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::config::{Settings, VectorProvider};
use super::pinecone::PineconeStore;
use super::qdrant::QdrantStore;

/// Payload key the fragment text is stored under.
pub const TEXT_KEY: &str = "text";

/// A stored text chunk returned by similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: String,
    pub score: f32,
    pub text: String,
    #[serde(default)]
    pub metadata: JsonMap<String, JsonValue>,
}

/// A chunk ready to be written to the index.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub text: String,
    pub metadata: JsonMap<String, JsonValue>,
}

/// A remote vector collection plus the catalog it lives in.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn list_indexes(&self) -> Result<Vec<String>>;

    async fn create_index(&self, name: &str, dimension: usize) -> Result<()>;

    /// Nearest `top_k` fragments to `vector`, best first.
    async fn query(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<Fragment>>;

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()>;
}

/// Creates `name` with `dimension` unless the catalog already lists it.
#[tracing::instrument(name = "vector_store.ensure_index", err, skip(store))]
pub async fn ensure_index(store: &dyn VectorStore, name: &str, dimension: usize) -> Result<()> {
    let existing = store.list_indexes().await?;
    if existing.iter().any(|index| index == name) {
        tracing::info!("Index {} already exists", name);
        return Ok(());
    }

    tracing::info!("Creating index {} with dimension {}", name, dimension);
    store.create_index(name, dimension).await?;
    Ok(())
}

/// Builds the store selected by `index.provider`.
pub async fn connect(settings: &Settings) -> Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match settings.index.provider {
        VectorProvider::Pinecone => Arc::new(
            PineconeStore::new(
                settings.pinecone_controller_url(),
                &settings.pinecone_api_key,
                &settings.index.name,
                settings.index_timeout(),
            )?
            .with_namespace(&settings.index.namespace),
        ),
        VectorProvider::Qdrant => Arc::new(QdrantStore::new(
            &settings.index.qdrant_url,
            settings.index.qdrant_api_key.as_deref(),
            &settings.index.name,
            settings.index_timeout(),
        )?),
    };
    Ok(store)
}

/// Splits a stored payload into the fragment text and the remaining metadata.
pub fn split_payload(mut payload: JsonMap<String, JsonValue>) -> (String, JsonMap<String, JsonValue>) {
    let text = match payload.remove(TEXT_KEY) {
        Some(JsonValue::String(text)) => text,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    (text, payload)
}
