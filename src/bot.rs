//! Update routing, the `/start` and text handlers, and the long-polling loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::{TelegramMessage, Update};
use crate::rag::Answerer;
use crate::session::{ChatId, SessionStore, Turn};
use crate::telegram::{Messenger, TelegramApi};

/// Pause after a failed `getUpdates` call before polling again.
const POLL_ERROR_DELAY: Duration = Duration::from_secs(1);

/// Which handler an update goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Start { chat_id: ChatId },
    Text { chat_id: ChatId, text: String },
    Ignore,
}

/// A leading bot command: lowercased name and the optional `@botname` target.
fn parse_command(message: &TelegramMessage) -> Option<(String, Option<&str>)> {
    let text = message.text.as_deref()?;
    let is_command = message
        .entities
        .iter()
        .any(|e| e.kind == "bot_command" && e.offset == 0);
    if !is_command {
        return None;
    }

    let token = text.split_whitespace().next()?.strip_prefix('/')?;
    let (name, target) = match token.split_once('@') {
        Some((name, target)) => (name, Some(target)),
        None => (token, None),
    };
    Some((name.to_lowercase(), target))
}

/// `bot_username` is our own `getMe` username. A command addressed to any
/// other bot is ignored.
pub fn route(update: &Update, bot_username: Option<&str>) -> Route {
    let Some(message) = &update.message else {
        return Route::Ignore;
    };
    let Some(text) = &message.text else {
        return Route::Ignore;
    };
    let chat_id = message.chat.id;

    match parse_command(message) {
        Some((name, target)) => {
            let for_us = match target {
                None => true,
                Some(target) => bot_username.is_some_and(|me| me.eq_ignore_ascii_case(target)),
            };
            if for_us && name == "start" {
                Route::Start { chat_id }
            } else {
                Route::Ignore
            }
        }
        None => Route::Text {
            chat_id,
            text: text.clone(),
        },
    }
}

pub struct Bot {
    chain: Arc<dyn Answerer>,
    messenger: Arc<dyn Messenger>,
    sessions: SessionStore,
    greeting: String,
    username: Option<String>,
}

impl Bot {
    pub fn new(
        chain: Arc<dyn Answerer>,
        messenger: Arc<dyn Messenger>,
        greeting: impl Into<String>,
    ) -> Self {
        Self {
            chain,
            messenger,
            sessions: SessionStore::new(),
            greeting: greeting.into(),
            username: None,
        }
    }

    /// Username reported by `getMe`, used to match `/start@botname`.
    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    #[tracing::instrument(name = "bot.update", err, skip_all, fields(update_id = update.update_id))]
    pub async fn handle_update(&self, update: Update) -> Result<()> {
        match route(&update, self.username.as_deref()) {
            Route::Start { chat_id } => self.handle_start(chat_id).await,
            Route::Text { chat_id, text } => self.handle_text(chat_id, &text).await,
            Route::Ignore => Ok(()),
        }
    }

    pub async fn handle_start(&self, chat_id: ChatId) -> Result<()> {
        self.messenger.send_message(chat_id, &self.greeting).await
    }

    pub async fn handle_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        let answer = {
            let mut history = self.sessions.lock(chat_id).await;
            let result = self.chain.answer(text, &history).await?;
            history.push(Turn::new(text, result.answer.clone()));
            tracing::info!(
                "Chat {} answered with {} sources, history length {}",
                chat_id,
                result.sources.len(),
                history.len()
            );
            result.answer
        };

        self.messenger.send_message(chat_id, &answer).await
    }
}

struct Worker {
    queue: mpsc::UnboundedSender<Update>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn(bot: Arc<Bot>) -> Self {
        let (queue, mut rx) = mpsc::unbounded_channel::<Update>();
        let handle = tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                // errors are already recorded by the handler span
                let _ = bot.handle_update(update).await;
            }
        });
        Self { queue, handle }
    }
}

/// Hands updates to one worker task per chat. A chat's updates are handled
/// one at a time in the order they were dispatched; chats run concurrently.
pub struct Dispatcher {
    bot: Arc<Bot>,
    workers: HashMap<ChatId, Worker>,
}

impl Dispatcher {
    pub fn new(bot: Arc<Bot>) -> Self {
        Self {
            bot,
            workers: HashMap::new(),
        }
    }

    pub fn dispatch(&mut self, update: Update) {
        let Some(chat_id) = update.message.as_ref().map(|m| m.chat.id) else {
            tracing::debug!("Skipping update {} without a message", update.update_id);
            return;
        };

        let bot = &self.bot;
        let worker = self
            .workers
            .entry(chat_id)
            .or_insert_with(|| Worker::spawn(bot.clone()));
        if let Err(mpsc::error::SendError(update)) = worker.queue.send(update) {
            // the worker died (a handler panicked), start a fresh one
            tracing::warn!("Restarting worker for chat {}", chat_id);
            let worker = Worker::spawn(self.bot.clone());
            let _ = worker.queue.send(update);
            self.workers.insert(chat_id, worker);
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Closes every queue and waits for the queued updates to be handled.
    pub async fn shutdown(self) {
        for (_, worker) in self.workers {
            drop(worker.queue);
            let _ = worker.handle.await;
        }
    }
}

/// Polls until the surrounding task is dropped.
pub async fn run_polling(bot: Arc<Bot>, api: Arc<TelegramApi>, poll_timeout: u64) -> Result<()> {
    let mut offset: Option<i64> = None;
    let mut dispatcher = Dispatcher::new(bot);
    tracing::info!("Polling for updates");

    loop {
        let updates = match api.get_updates(offset, poll_timeout).await {
            Ok(updates) => updates,
            Err(e) => {
                tracing::error!("getUpdates failed: {}", e);
                tokio::time::sleep(POLL_ERROR_DELAY).await;
                continue;
            }
        };

        for update in updates {
            offset = Some(update.update_id + 1);
            dispatcher.dispatch(update);
        }
    }
}
