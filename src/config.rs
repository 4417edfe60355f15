use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;

pub const DEFAULT_INDEX_NAME: &str = "lila-memory";
/// Output size of `text-embedding-ada-002`.
pub const EMBEDDING_DIMENSION: usize = 1536;
pub const DEFAULT_GREETING: &str = "Привет! Я Лила 2.0 с памятью. Пиши что угодно.";

/// Settings key and the environment variable it is read from, verbatim.
const SECRETS: &[(&str, &str)] = &[
    ("openai_api_key", "OPENAI_API_KEY"),
    ("pinecone_api_key", "PINECONE_API_KEY"),
    ("pinecone_environment", "PINECONE_ENVIRONMENT"),
    ("telegram_bot_token", "TELEGRAM_BOT_TOKEN"),
];

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub openai_api_key: String,
    pub pinecone_api_key: String,
    pub pinecone_environment: String,
    pub telegram_bot_token: String,
    pub openai: OpenAiConfig,
    pub index: IndexConfig,
    pub telegram: TelegramConfig,
    pub chain: ChainConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    /// Whole-request timeout for chat and embedding calls.
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorProvider {
    Pinecone,
    Qdrant,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub provider: VectorProvider,
    pub name: String,
    pub dimension: usize,
    pub top_k: usize,
    /// Overrides the controller URL derived from the Pinecone environment.
    pub controller_url: Option<String>,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    /// Pinecone namespace for queries and upserts. Empty is the default namespace.
    pub namespace: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub api_url: String,
    pub poll_timeout_secs: u64,
    pub greeting: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    pub condense_question: bool,
    pub remember_turns: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct HealthConfig {
    pub addr: Option<String>,
}

impl Settings {
    /// Reads `.env`, `config/settings.*` and the process environment.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::build(None)
    }

    /// Same layering as [`Settings::load`] but with `vars` standing in for the
    /// process environment.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::build(Some(vars))
    }

    fn build(vars: Option<HashMap<String, String>>) -> Result<Self> {
        let lookup = |name: &str| match &vars {
            Some(map) => map.get(name).cloned(),
            None => std::env::var(name).ok(),
        };

        let mut builder = Config::builder()
            .set_default("openai.base_url", "https://api.openai.com/v1")?
            .set_default("openai.chat_model", "gpt-3.5-turbo")?
            .set_default("openai.embedding_model", "text-embedding-ada-002")?
            .set_default("openai.temperature", 0.0)?
            .set_default("openai.timeout_secs", 60)?
            .set_default("index.provider", "pinecone")?
            .set_default("index.name", DEFAULT_INDEX_NAME)?
            .set_default("index.dimension", EMBEDDING_DIMENSION as i64)?
            .set_default("index.top_k", 4)?
            .set_default("index.qdrant_url", "http://localhost:6334")?
            .set_default("index.namespace", "")?
            .set_default("index.timeout_secs", 30)?
            .set_default("telegram.api_url", "https://api.telegram.org")?
            .set_default("telegram.poll_timeout_secs", 10)?
            .set_default("telegram.greeting", DEFAULT_GREETING)?
            .set_default("chain.condense_question", false)?
            .set_default("chain.remember_turns", false)?
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("LILA")
                    .separator("__")
                    .try_parsing(true)
                    .source(vars.clone()),
            );

        for (key, var) in SECRETS {
            builder = builder.set_override_option(*key, lookup(var))?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    pub fn openai_timeout(&self) -> Duration {
        Duration::from_secs(self.openai.timeout_secs)
    }

    pub fn index_timeout(&self) -> Duration {
        Duration::from_secs(self.index.timeout_secs)
    }

    /// Pinecone controller for the configured environment.
    pub fn pinecone_controller_url(&self) -> String {
        match &self.index.controller_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://controller.{}.pinecone.io", self.pinecone_environment),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required_vars() -> HashMap<String, String> {
        HashMap::from([
            ("OPENAI_API_KEY".to_string(), "sk-test".to_string()),
            ("PINECONE_API_KEY".to_string(), "pc-test".to_string()),
            ("PINECONE_ENVIRONMENT".to_string(), "us-west1-gcp".to_string()),
            ("TELEGRAM_BOT_TOKEN".to_string(), "123:abc".to_string()),
        ])
    }

    #[test]
    fn test_loads_secrets_and_defaults() {
        let settings = Settings::from_vars(required_vars()).unwrap();

        assert_eq!(settings.openai_api_key, "sk-test");
        assert_eq!(settings.pinecone_api_key, "pc-test");
        assert_eq!(settings.pinecone_environment, "us-west1-gcp");
        assert_eq!(settings.telegram_bot_token, "123:abc");

        assert_eq!(settings.index.provider, VectorProvider::Pinecone);
        assert_eq!(settings.index.name, "lila-memory");
        assert_eq!(settings.index.dimension, 1536);
        assert_eq!(settings.openai.temperature, 0.0);
        assert_eq!(settings.telegram.greeting, DEFAULT_GREETING);
        assert!(!settings.chain.condense_question);
        assert!(settings.health.addr.is_none());
        assert_eq!(settings.index.namespace, "");
        assert_eq!(settings.openai_timeout(), Duration::from_secs(60));
        assert_eq!(settings.index_timeout(), Duration::from_secs(30));
        assert_eq!(
            settings.pinecone_controller_url(),
            "https://controller.us-west1-gcp.pinecone.io"
        );
    }

    #[test]
    fn test_each_missing_secret_fails() {
        for (key, var) in SECRETS {
            let mut vars = required_vars();
            assert!(vars.remove(*var).is_some(), "{} is not in the fixture", var);

            let err = match Settings::from_vars(vars) {
                Ok(_) => panic!("loaded without {}", var),
                Err(err) => err,
            };
            assert!(
                err.to_string().contains(*key),
                "error for missing {} does not name {}: {}",
                var,
                key,
                err
            );
        }
    }

    #[test]
    fn test_secrets_table_covers_required_vars() {
        let vars: Vec<&str> = SECRETS.iter().map(|(_, var)| *var).collect();
        assert_eq!(
            vars,
            ["OPENAI_API_KEY", "PINECONE_API_KEY", "PINECONE_ENVIRONMENT", "TELEGRAM_BOT_TOKEN"]
        );
    }

    #[test]
    fn test_prefixed_overrides() {
        let mut vars = required_vars();
        vars.insert("LILA__INDEX__PROVIDER".to_string(), "qdrant".to_string());
        vars.insert("LILA__INDEX__TOP_K".to_string(), "8".to_string());
        vars.insert("LILA__CHAIN__REMEMBER_TURNS".to_string(), "true".to_string());
        vars.insert("LILA__INDEX__NAMESPACE".to_string(), "notes".to_string());
        vars.insert("LILA__OPENAI__TIMEOUT_SECS".to_string(), "5".to_string());
        vars.insert(
            "LILA__INDEX__CONTROLLER_URL".to_string(),
            "http://localhost:9000/".to_string(),
        );

        let settings = Settings::from_vars(vars).unwrap();
        assert_eq!(settings.index.provider, VectorProvider::Qdrant);
        assert_eq!(settings.index.top_k, 8);
        assert!(settings.chain.remember_turns);
        assert_eq!(settings.index.namespace, "notes");
        assert_eq!(settings.openai_timeout(), Duration::from_secs(5));
        assert_eq!(settings.pinecone_controller_url(), "http://localhost:9000");
    }
}
