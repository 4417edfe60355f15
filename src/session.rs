//! Per-chat conversation history, held in memory for the life of the process.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One answered question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

impl Turn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

pub type ChatId = i64;

/// Maps chat ids to their history. Histories only ever grow by appending.
#[derive(Debug, Default)]
pub struct SessionStore {
    chats: Mutex<HashMap<ChatId, Arc<Mutex<Vec<Turn>>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, chat_id: ChatId) -> Arc<Mutex<Vec<Turn>>> {
        let mut chats = self.chats.lock().await;
        chats.entry(chat_id).or_default().clone()
    }

    /// Exclusive access to a chat's history. Holding the guard across a whole
    /// turn keeps updates from the same chat in order.
    pub async fn lock(&self, chat_id: ChatId) -> OwnedMutexGuard<Vec<Turn>> {
        self.entry(chat_id).await.lock_owned().await
    }

    /// Snapshot of the history; empty for chats never seen.
    pub async fn history(&self, chat_id: ChatId) -> Vec<Turn> {
        let session = {
            let chats = self.chats.lock().await;
            chats.get(&chat_id).cloned()
        };
        match session {
            Some(session) => session.lock().await.clone(),
            None => Vec::new(),
        }
    }

    pub async fn append(&self, chat_id: ChatId, turn: Turn) {
        self.lock(chat_id).await.push(turn);
    }

    pub async fn len(&self, chat_id: ChatId) -> usize {
        self.history(chat_id).await.len()
    }

    pub async fn chat_count(&self) -> usize {
        self.chats.lock().await.len()
    }
}
