use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use lila_bot::bot::{self, Bot};
use lila_bot::config::Settings;
use lila_bot::health::{self, HealthState};
use lila_bot::openai::OpenAiClient;
use lila_bot::rag::vector_store::{self, ensure_index};
use lila_bot::rag::{ChainOptions, RetrievalChain};
use lila_bot::telegram::TelegramApi;

#[tokio::main]
async fn main() -> Result<()> {
    lila_bot::init_tracing();

    let settings = Settings::load()?;
    tracing::info!(
        "Using {:?} index {} and chat model {}",
        settings.index.provider,
        settings.index.name,
        settings.openai.chat_model
    );

    let store = vector_store::connect(&settings).await?;
    ensure_index(store.as_ref(), &settings.index.name, settings.index.dimension).await?;

    let openai = Arc::new(OpenAiClient::from_settings(&settings)?);
    let chain = RetrievalChain::new(
        openai.clone(),
        store,
        openai,
        ChainOptions::from(&settings),
    );

    let poll_timeout = settings.telegram.poll_timeout_secs;
    let telegram = Arc::new(TelegramApi::new(
        &settings.telegram.api_url,
        &settings.telegram_bot_token,
        Duration::from_secs(poll_timeout),
    )?);
    let me = telegram.get_me().await?;
    tracing::info!(
        "Authenticated as @{}",
        me.username.as_deref().unwrap_or("unknown")
    );

    let bot = Arc::new(
        Bot::new(
            Arc::new(chain),
            telegram.clone(),
            settings.telegram.greeting.clone(),
        )
        .with_username(me.username),
    );

    if let Some(addr) = settings.health.addr.clone() {
        let state = Arc::new(HealthState {
            bot: bot.clone(),
            index_name: settings.index.name.clone(),
        });
        tokio::spawn(async move {
            if let Err(e) = health::serve(&addr, state).await {
                tracing::error!("Health endpoint failed: {}", e);
            }
        });
    }

    tokio::select! {
        result = bot::run_polling(bot, telegram, poll_timeout) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }

    Ok(())
}
