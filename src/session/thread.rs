//! Append-only conversation thread.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::{Message, MessageRole};

/// The ordered `{role, content}` history of one conversation.
///
/// Entries are only ever appended. The one exception is the trailing assistant entry of the
/// turn in flight, whose content may grow while the answer streams in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    id: String,
    messages: Vec<Message>,
    created_at: DateTime<Utc>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// Start an empty conversation with a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self::from_messages(Vec::new())
    }

    /// Continue a conversation from an existing history.
    #[must_use]
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            messages,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Append the user's question.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    /// Open the assistant entry for the current turn.
    pub fn begin_assistant(&mut self) {
        self.messages.push(Message::assistant(String::new()));
    }

    /// Extend the trailing assistant entry.
    ///
    /// Opens one first if the history does not end with an assistant entry.
    pub fn append_assistant(&mut self, text: &str) {
        match self.messages.last_mut() {
            Some(last) if last.role == MessageRole::Assistant => last.content.push_str(text),
            _ => self.messages.push(Message::assistant(text)),
        }
    }

    /// Content of the trailing assistant entry, if the history ends with one.
    #[must_use]
    pub fn last_answer(&self) -> Option<&str> {
        self.messages
            .last()
            .filter(|m| m.role == MessageRole::Assistant)
            .map(|m| m.content.as_str())
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Owned copy of the history, as emitted to consumers.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl From<Conversation> for Vec<Message> {
    fn from(conversation: Conversation) -> Self {
        conversation.messages
    }
}
