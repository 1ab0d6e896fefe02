use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::DEFAULT_TITLE;
use crate::types::message::{Message, MessageId};

/// One persisted conversation thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl ConversationSession {
    /// Create an empty session with the default title
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            topic: None,
            last_updated: Utc::now(),
        }
    }

    /// Append a message and bump `last_updated`
    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
        self.touch();
    }

    /// Insert or grow the in-flight streaming reply
    ///
    /// If no message with `message_id` exists yet it is appended at the tail;
    /// otherwise its content is replaced by the full buffer. `last_updated`
    /// is not bumped per fragment.
    pub fn upsert_streaming(&mut self, message_id: &str, buffer: &str) {
        match self.messages.iter_mut().find(|m| m.id == message_id) {
            Some(existing) => existing.content = buffer.to_string(),
            None => self
                .messages
                .push(Message::model_with_id(message_id, buffer)),
        }
    }

    /// Refresh the recency stamp
    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    /// Whether the title is still the placeholder
    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_TITLE
    }

    /// The last `n` messages in order
    pub fn recent_messages(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Last user-authored message, if any
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::types::message::Role::User)
    }

    /// Find a message by id
    pub fn message(&self, message_id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == message_id)
    }
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new()
    }
}
