//! # Storage trait
//!
//! Durable key-value persistence of the two application blobs: the session
//! map and the memory list. Implementations must load a corrupt or absent
//! blob as an empty collection rather than failing.

use std::collections::HashMap;

use async_trait::async_trait;

use askly_core::{ConversationSession, Memory};

use crate::error::StorageResult;

/// Persistent store contract
#[async_trait]
pub trait Storage: Send + Sync {
    /// Load the full session map
    async fn load_sessions(&self) -> StorageResult<HashMap<String, ConversationSession>>;

    /// Persist the full session map (whole-blob replace)
    async fn save_sessions(
        &self,
        sessions: &HashMap<String, ConversationSession>,
    ) -> StorageResult<()>;

    /// Load the memory list
    async fn load_memories(&self) -> StorageResult<Vec<Memory>>;

    /// Persist the memory list (whole-blob replace)
    async fn save_memories(&self, memories: &[Memory]) -> StorageResult<()>;

    /// Remove both blobs
    async fn clear(&self) -> StorageResult<()>;
}
