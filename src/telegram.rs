use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ProviderError;
use crate::models::{
    GetUpdatesRequest, SendMessageRequest, TelegramMessage, TelegramResponse, Update, User,
};

/// Outbound side of the bot.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// Minimal Telegram Bot API client: identity, long polling and text replies.
pub struct TelegramApi {
    client: Client,
    base_url: String,
}

impl TelegramApi {
    /// `poll_timeout` is the long-poll window; the HTTP timeout is set above it.
    pub fn new(api_url: &str, token: &str, poll_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(poll_timeout + Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, method);
        // the URL carries the bot token, keep it out of error messages
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| e.without_url())?;

        // Bot API errors come back as non-2xx with a JSON envelope.
        let envelope: TelegramResponse<T> = response.json().await.map_err(|e| e.without_url())?;
        if !envelope.ok {
            return Err(ProviderError::Telegram {
                code: envelope.error_code.unwrap_or_default(),
                description: envelope.description.unwrap_or_default(),
            }
            .into());
        }

        envelope
            .result
            .ok_or_else(|| ProviderError::malformed("telegram", format!("{} returned no result", method)).into())
    }

    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", &serde_json::json!({})).await
    }

    /// Blocks up to `timeout` seconds waiting for updates at or after `offset`.
    pub async fn get_updates(&self, offset: Option<i64>, timeout: u64) -> Result<Vec<Update>> {
        let request = GetUpdatesRequest {
            offset,
            timeout,
            allowed_updates: vec!["message".to_string()],
        };
        self.call("getUpdates", &request).await
    }
}

#[async_trait]
impl Messenger for TelegramApi {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let _sent: TelegramMessage = self
            .call("sendMessage", &SendMessageRequest { chat_id, text })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(mock_server: &MockServer) -> TelegramApi {
        TelegramApi::new(&mock_server.uri(), "123:abc", Duration::from_secs(1)).unwrap()
    }

    #[tokio::test]
    async fn test_get_updates_passes_offset() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getUpdates"))
            .and(body_partial_json(json!({ "offset": 11, "timeout": 0 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [{
                    "update_id": 11,
                    "message": {
                        "message_id": 5,
                        "chat": { "id": 99, "type": "private" },
                        "from": { "id": 7, "is_bot": false, "username": "reader" },
                        "text": "/start",
                        "entities": [{ "type": "bot_command", "offset": 0, "length": 6 }]
                    }
                }]
            })))
            .mount(&mock_server)
            .await;

        let updates = api(&mock_server).get_updates(Some(11), 0).await.unwrap();
        assert_eq!(updates.len(), 1);
        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.chat.id, 99);
        assert_eq!(message.entities[0].kind, "bot_command");
    }

    #[tokio::test]
    async fn test_send_message() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({ "chat_id": 99, "text": "hello" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": { "message_id": 6, "chat": { "id": 99, "type": "private" }, "text": "hello" }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        api(&mock_server).send_message(99, "hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_error_envelope() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "ok": false,
                "error_code": 403,
                "description": "Forbidden: bot was blocked by the user"
            })))
            .mount(&mock_server)
            .await;

        let err = api(&mock_server).send_message(99, "hello").await.unwrap_err();
        match err.downcast_ref::<ProviderError>() {
            Some(ProviderError::Telegram { code, description }) => {
                assert_eq!(*code, 403);
                assert!(description.contains("blocked"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
