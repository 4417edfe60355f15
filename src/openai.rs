use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;

use crate::config::Settings;
use crate::error::ProviderError;
use crate::models::{ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, Message};
use crate::rag::embeddings::Embed;
use crate::rag::ChatModel;

const PROVIDER: &str = "openai";

/// Client for an OpenAI-compatible `/embeddings` + `/chat/completions` API.
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    temperature: f32,
}

impl OpenAiClient {
    /// `timeout` bounds each whole request, including reading the body.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            chat_model: "gpt-3.5-turbo".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            temperature: 0.0,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = Self::new(
            &settings.openai.base_url,
            &settings.openai_api_key,
            settings.openai_timeout(),
        )?;
        Ok(client
            .with_chat_model(&settings.openai.chat_model)
            .with_embedding_model(&settings.openai.embedding_model)
            .with_temperature(settings.openai.temperature))
    }

    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let response = ProviderError::check(PROVIDER, response).await?;

        let chat_response: ChatResponse = response.json().await?;
        Ok(chat_response)
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    #[tracing::instrument(name = "openai.complete", err, skip_all, fields(model = %self.chat_model))]
    async fn complete(&self, messages: Vec<Message>) -> Result<String> {
        let request = ChatRequest {
            model: self.chat_model.clone(),
            messages,
            temperature: self.temperature,
        };

        let response = self.chat_completion(request).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::malformed(PROVIDER, "completion has no content"))?;

        Ok(content)
    }
}

#[async_trait]
impl Embed for OpenAiClient {
    #[tracing::instrument(name = "openai.embed", err, skip_all, fields(count = texts.len()))]
    async fn generate(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();
        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: self.embedding_model.clone(),
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let response = ProviderError::check(PROVIDER, response).await?;

        let mut body: EmbeddingResponse = response.json().await?;
        if body.data.len() != expected {
            return Err(ProviderError::malformed(
                PROVIDER,
                format!("expected {} embeddings, got {}", expected, body.data.len()),
            )
            .into());
        }
        body.data.sort_by_key(|d| d.index);

        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}
