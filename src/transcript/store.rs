//! Chat persistence boundary.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{Transcript, TranscriptMessage};
use crate::error::ThreadRunError;

/// A saved chat, keyed by `chat_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub chat_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub messages: Vec<TranscriptMessage>,
    pub saved_at: DateTime<Utc>,
}

impl ChatRecord {
    /// An empty chat with no history yet.
    pub fn new(chat_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            user_id: user_id.into(),
            thread_id: None,
            messages: Vec::new(),
            saved_at: Utc::now(),
        }
    }

    /// Record holding a single turn. Unanswered tool calls are stripped.
    pub fn from_transcript(
        chat_id: impl Into<String>,
        user_id: impl Into<String>,
        thread_id: Option<String>,
        transcript: &Transcript,
    ) -> Self {
        let mut record = Self::new(chat_id, user_id);
        record.append_turn(thread_id, transcript);
        record
    }

    /// Append a finished turn after the existing history. Unanswered tool
    /// calls of the turn are stripped; a missing `thread_id` keeps the
    /// current one.
    pub fn append_turn(&mut self, thread_id: Option<String>, transcript: &Transcript) {
        if thread_id.is_some() {
            self.thread_id = thread_id;
        }
        self.messages
            .extend(transcript.without_incomplete_tool_calls().into_messages());
        self.saved_at = Utc::now();
    }
}

/// External storage for chats. The orchestrator never calls this itself.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Store `record`, replacing any previous record with the same id.
    async fn save_chat(&self, record: ChatRecord) -> Result<(), ThreadRunError>;

    async fn load_chat(&self, chat_id: &str) -> Result<Option<ChatRecord>, ThreadRunError>;

    /// Append one turn to the stored chat (creating it if needed) and save
    /// the whole conversation.
    async fn save_turn(
        &self,
        chat_id: &str,
        user_id: &str,
        thread_id: Option<String>,
        transcript: &Transcript,
    ) -> Result<ChatRecord, ThreadRunError> {
        let mut record = self
            .load_chat(chat_id)
            .await?
            .unwrap_or_else(|| ChatRecord::new(chat_id, user_id));
        if record.user_id != user_id {
            return Err(ThreadRunError::InvalidState(format!(
                "chat '{chat_id}' belongs to another user"
            )));
        }
        record.append_turn(thread_id, transcript);
        self.save_chat(record.clone()).await?;
        Ok(record)
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryChatStore {
    chats: RwLock<HashMap<String, ChatRecord>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn save_chat(&self, record: ChatRecord) -> Result<(), ThreadRunError> {
        let mut chats = self.chats.write().await;
        if let Some(existing) = chats.get(&record.chat_id) {
            if existing.user_id != record.user_id {
                return Err(ThreadRunError::InvalidState(format!(
                    "chat '{}' belongs to another user",
                    record.chat_id
                )));
            }
        }
        chats.insert(record.chat_id.clone(), record);
        Ok(())
    }

    async fn load_chat(&self, chat_id: &str) -> Result<Option<ChatRecord>, ThreadRunError> {
        Ok(self.chats.read().await.get(chat_id).cloned())
    }
}
