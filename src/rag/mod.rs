pub mod embeddings;
pub mod pinecone;
pub mod prompt;
pub mod qdrant;
pub mod vector_store;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::config::Settings;
use crate::models::Message;
use crate::session::Turn;
use self::embeddings::Embed;
use self::vector_store::{Fragment, VectorRecord, VectorStore};

/// Hosted chat completion.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: Vec<Message>) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainAnswer {
    pub answer: String,
    pub sources: Vec<Fragment>,
}

/// Answers a question given the prior turns of the conversation.
#[async_trait]
pub trait Answerer: Send + Sync {
    async fn answer(&self, question: &str, history: &[Turn]) -> Result<ChainAnswer>;
}

#[derive(Debug, Clone)]
pub struct ChainOptions {
    pub top_k: usize,
    pub condense_question: bool,
    pub remember_turns: bool,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            top_k: 4,
            condense_question: false,
            remember_turns: false,
        }
    }
}

impl From<&Settings> for ChainOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            top_k: settings.index.top_k,
            condense_question: settings.chain.condense_question,
            remember_turns: settings.chain.remember_turns,
        }
    }
}

/// Retrieval followed by chat completion over the retrieved fragments.
pub struct RetrievalChain {
    embeddings: Arc<dyn Embed>,
    vector_store: Arc<dyn VectorStore>,
    llm: Arc<dyn ChatModel>,
    options: ChainOptions,
}

impl RetrievalChain {
    pub fn new(
        embeddings: Arc<dyn Embed>,
        vector_store: Arc<dyn VectorStore>,
        llm: Arc<dyn ChatModel>,
        options: ChainOptions,
    ) -> Self {
        Self {
            embeddings,
            vector_store,
            llm,
            options,
        }
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<Fragment>> {
        let query_embedding = self.embeddings.generate_single(query).await?;
        self.vector_store.query(query_embedding, self.options.top_k).await
    }

    async fn search_query(&self, question: &str, history: &[Turn]) -> Result<String> {
        if !self.options.condense_question || history.is_empty() {
            return Ok(question.to_string());
        }
        let standalone = self
            .llm
            .complete(prompt::condense_messages(history, question))
            .await?;
        tracing::debug!("Condensed question: {}", standalone);
        Ok(standalone.trim().to_string())
    }

    async fn remember(&self, question: &str, answer: &str) -> Result<()> {
        let text = format!("Human: {}\nAssistant: {}", question, answer);
        let values = self.embeddings.generate_single(&text).await?;

        let mut metadata = JsonMap::new();
        metadata.insert("kind".to_string(), JsonValue::String("turn".to_string()));
        metadata.insert(
            "created_at".to_string(),
            JsonValue::String(chrono::Utc::now().to_rfc3339()),
        );

        self.vector_store
            .upsert(vec![VectorRecord {
                id: uuid::Uuid::new_v4().to_string(),
                values,
                text,
                metadata,
            }])
            .await
    }
}

#[async_trait]
impl Answerer for RetrievalChain {
    #[tracing::instrument(name = "chain.answer", err, skip_all, fields(history = history.len()))]
    async fn answer(&self, question: &str, history: &[Turn]) -> Result<ChainAnswer> {
        let query = self.search_query(question, history).await?;
        let sources = self.retrieve(&query).await?;
        tracing::debug!("Retrieved {} fragments", sources.len());

        let messages = prompt::answer_messages(&sources, history, question);
        let answer = self.llm.complete(messages).await?;

        if self.options.remember_turns {
            if let Err(e) = self.remember(question, &answer).await {
                tracing::warn!("Failed to remember turn: {}", e);
            }
        }

        Ok(ChainAnswer { answer, sources })
    }
}
