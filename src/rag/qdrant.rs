use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, CreateCollectionBuilder, Distance, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::{Map as JsonMap, Value as JsonValue};
use uuid::Uuid;

use super::vector_store::{Fragment, VectorRecord, VectorStore, TEXT_KEY};

/// Payload key keeping the caller's id, since Qdrant only accepts UUIDs and integers.
const RECORD_ID_KEY: &str = "record_id";

pub struct QdrantStore {
    client: Qdrant,
    collection_name: String,
}

impl QdrantStore {
    pub fn new(
        url: &str,
        api_key: Option<&str>,
        collection_name: &str,
        timeout: Duration,
    ) -> Result<Self> {
        tracing::info!("Building Qdrant client for URL: {}", url);
        let mut config = Qdrant::from_url(url).timeout(timeout);
        if let Some(key) = api_key {
            config = config.api_key(key.to_string());
        }
        let client = match config.build() {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("Qdrant client build failed: {:?}", e);
                anyhow::bail!("Qdrant client build failed: {}", e);
            }
        };

        Ok(Self {
            client,
            collection_name: collection_name.to_string(),
        })
    }
}

/// Qdrant point id for an arbitrary record id.
fn point_id(record_id: &str) -> String {
    match Uuid::parse_str(record_id) {
        Ok(uuid) => uuid.to_string(),
        Err(_) => Uuid::new_v5(&Uuid::NAMESPACE_OID, record_id.as_bytes()).to_string(),
    }
}

fn to_json(value: &QdrantValue) -> Option<JsonValue> {
    if let Some(s) = value.as_str() {
        return Some(JsonValue::String(s.clone()));
    }
    if let Some(i) = value.as_integer() {
        return Some(JsonValue::from(i));
    }
    if let Some(f) = value.as_double() {
        return Some(JsonValue::from(f));
    }
    value.as_bool().map(JsonValue::Bool)
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn list_indexes(&self) -> Result<Vec<String>> {
        let response = self.client.list_collections().await?;
        Ok(response.collections.into_iter().map(|c| c.name).collect())
    }

    async fn create_index(&self, name: &str, dimension: usize) -> Result<()> {
        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await?;
        Ok(())
    }

    #[tracing::instrument(name = "qdrant.query", err, skip(self, vector))]
    async fn query(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<Fragment>> {
        let search_result = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection_name, vector, top_k as u64)
                    .with_payload(true),
            )
            .await?;

        let mut fragments = Vec::new();
        for point in search_result.result {
            let mut text = String::new();
            let mut record_id = None;
            let mut metadata = JsonMap::new();
            for (key, value) in &point.payload {
                match key.as_str() {
                    TEXT_KEY => text = value.as_str().cloned().unwrap_or_default(),
                    RECORD_ID_KEY => record_id = value.as_str().cloned(),
                    _ => {
                        if let Some(json) = to_json(value) {
                            metadata.insert(key.clone(), json);
                        }
                    }
                }
            }

            let id = record_id.unwrap_or_else(|| match point.id.and_then(|id| id.point_id_options) {
                Some(PointIdOptions::Uuid(uuid)) => uuid,
                Some(PointIdOptions::Num(num)) => num.to_string(),
                None => String::new(),
            });

            fragments.push(Fragment {
                id,
                score: point.score,
                text,
                metadata,
            });
        }

        Ok(fragments)
    }

    #[tracing::instrument(name = "qdrant.upsert", err, skip_all, fields(count = records.len()))]
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = records
            .into_iter()
            .map(|record| {
                let mut payload_map = record.metadata;
                payload_map.insert(TEXT_KEY.to_string(), JsonValue::String(record.text));
                payload_map.insert(RECORD_ID_KEY.to_string(), JsonValue::String(record.id.clone()));
                PointStruct::new(point_id(&record.id), record.values, payload_map)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection_name, points).wait(true))
            .await?;
        Ok(())
    }
}
