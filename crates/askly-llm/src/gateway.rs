//! # ModelGateway trait
//!
//! The seam between the chat engine and any model backend. One streaming
//! call for replies, three one-shot calls for background analysis.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use askly_core::{Memory, MemoryDraft, Message, TopicDetection};

use crate::error::Result;

/// Stream of reply text fragments
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Model backend contract
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Stream a chat reply for the given history
    ///
    /// Implementations receive the full message list and should window it
    /// themselves; memories and the current topic feed the system
    /// instruction.
    async fn stream_chat(
        &self,
        history: &[Message],
        memories: &[Memory],
        topic: Option<&str>,
    ) -> Result<TokenStream>;

    /// Analyze a recent window for a topic change
    ///
    /// With fewer than two messages there is nothing to compare, so the
    /// detection trivially reports no change.
    async fn detect_topic(
        &self,
        recent: &[Message],
        current_topic: Option<&str>,
    ) -> Result<TopicDetection>;

    /// Extract memory candidates from one user/assistant exchange
    async fn extract_memories(
        &self,
        user_message: &str,
        model_reply: &str,
    ) -> Result<Vec<MemoryDraft>>;

    /// Generate a short session title from the opening messages
    async fn generate_title(&self, opening: &[Message]) -> Result<String>;
}
