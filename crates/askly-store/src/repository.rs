//! # Repository
//!
//! In-memory working set over a [`Storage`] backend. Sessions live in a
//! `DashMap` keyed by id, memories in a single `RwLock`ed vector. Every
//! mutating call persists the whole blob before returning, so the backend
//! always reflects the last completed operation.
//!
//! Locking rule: take a per-blob async write lock first, then mutate and
//! clone under the sync guard, drop it, and await the storage write while
//! still holding the write lock. Serializing snapshot-then-write this way
//! keeps the store converged when writes from different tasks race: the
//! later writer snapshots after the earlier write lands, so the last write
//! always carries the freshest state. No sync lock is held across an
//! await point.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

use askly_core::{ConversationSession, Memory, Message, INITIAL_GREETING};

use crate::error::{StorageError, StorageResult};
use crate::storage::Storage;

/// Maximum number of memories retained after a save
pub const MEMORY_CAP: usize = 50;

/// Shared session and memory repository
pub struct Repository {
    storage: Arc<dyn Storage>,
    sessions: DashMap<String, ConversationSession>,
    memories: RwLock<Vec<Memory>>,
    sessions_write: Mutex<()>,
    memories_write: Mutex<()>,
}

impl Repository {
    /// Hydrate the repository from storage
    pub async fn load(storage: Arc<dyn Storage>) -> StorageResult<Self> {
        let sessions_map = storage.load_sessions().await?;
        let memories = storage.load_memories().await?;
        info!(
            "Repository loaded: {} sessions, {} memories",
            sessions_map.len(),
            memories.len()
        );

        let sessions = DashMap::new();
        for (id, session) in sessions_map {
            sessions.insert(id, session);
        }

        Ok(Self {
            storage,
            sessions,
            memories: RwLock::new(memories),
            sessions_write: Mutex::new(()),
            memories_write: Mutex::new(()),
        })
    }

    /// All sessions, most recently updated first
    pub fn sessions_by_recency(&self) -> Vec<ConversationSession> {
        let mut sessions: Vec<ConversationSession> =
            self.sessions.iter().map(|e| e.value().clone()).collect();
        sessions.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        sessions
    }

    /// Snapshot of one session
    pub fn session(&self, session_id: &str) -> Option<ConversationSession> {
        self.sessions.get(session_id).map(|e| e.value().clone())
    }

    /// The most recently updated session, if any exist
    pub fn most_recent(&self) -> Option<ConversationSession> {
        self.sessions
            .iter()
            .max_by(|a, b| a.value().last_updated.cmp(&b.value().last_updated))
            .map(|e| e.value().clone())
    }

    /// Create a fresh session seeded with the greeting message
    pub async fn create_session(&self) -> StorageResult<ConversationSession> {
        let mut session = ConversationSession::new();
        session.push_message(Message::model(INITIAL_GREETING));

        self.sessions.insert(session.id.clone(), session.clone());
        self.persist_sessions().await?;
        debug!("Created session {}", session.id);
        Ok(session)
    }

    /// Insert or replace a session record and persist
    pub async fn save_session(&self, session: ConversationSession) -> StorageResult<()> {
        self.sessions.insert(session.id.clone(), session);
        self.persist_sessions().await
    }

    /// Remove a session and persist
    pub async fn delete_session(&self, session_id: &str) -> StorageResult<()> {
        if self.sessions.remove(session_id).is_none() {
            return Err(StorageError::SessionNotFound {
                id: session_id.to_string(),
            });
        }
        self.persist_sessions().await?;
        debug!("Deleted session {}", session_id);
        Ok(())
    }

    /// Apply a streaming fragment buffer to the live session only
    ///
    /// Not persisted: stream progress is in-memory state until the
    /// completed reply is committed.
    pub fn update_streaming(
        &self,
        session_id: &str,
        message_id: &str,
        buffer: &str,
    ) -> StorageResult<()> {
        let mut entry =
            self.sessions
                .get_mut(session_id)
                .ok_or_else(|| StorageError::SessionNotFound {
                    id: session_id.to_string(),
                })?;
        entry.upsert_streaming(message_id, buffer);
        Ok(())
    }

    /// Finalize the session's current state and persist
    pub async fn commit_session(&self, session_id: &str) -> StorageResult<ConversationSession> {
        let session = {
            let mut entry =
                self.sessions
                    .get_mut(session_id)
                    .ok_or_else(|| StorageError::SessionNotFound {
                        id: session_id.to_string(),
                    })?;
            entry.touch();
            entry.clone()
        };
        self.persist_sessions().await?;
        Ok(session)
    }

    /// Set the session topic and persist
    pub async fn set_topic(&self, session_id: &str, topic: &str) -> StorageResult<()> {
        {
            let mut entry =
                self.sessions
                    .get_mut(session_id)
                    .ok_or_else(|| StorageError::SessionNotFound {
                        id: session_id.to_string(),
                    })?;
            entry.topic = Some(topic.to_string());
        }
        self.persist_sessions().await
    }

    /// Replace a still-placeholder title and persist
    ///
    /// Returns false without writing when the session already carries a
    /// real title, which keeps a late title generation from clobbering it.
    pub async fn set_title_if_default(
        &self,
        session_id: &str,
        title: &str,
    ) -> StorageResult<bool> {
        let updated = {
            let mut entry =
                self.sessions
                    .get_mut(session_id)
                    .ok_or_else(|| StorageError::SessionNotFound {
                        id: session_id.to_string(),
                    })?;
            if entry.has_default_title() {
                entry.title = title.to_string();
                true
            } else {
                false
            }
        };
        if updated {
            self.persist_sessions().await?;
        }
        Ok(updated)
    }

    /// Snapshot of the memory list (stored order: importance descending)
    pub fn memories(&self) -> Vec<Memory> {
        self.memories.read().clone()
    }

    /// Add one memory, dedup by exact content, re-rank and cap
    ///
    /// Returns false when nothing was retained: either the content already
    /// exists, or the new entry ranked below the cap and was evicted
    /// immediately. The sort is stable, so among equal-importance entries
    /// the earlier-inserted ones survive the cap.
    pub async fn save_memory(&self, memory: Memory) -> StorageResult<bool> {
        let _write = self.memories_write.lock().await;
        let snapshot = {
            let mut memories = self.memories.write();
            if memories.iter().any(|m| m.content == memory.content) {
                return Ok(false);
            }
            let id = memory.id.clone();
            memories.push(memory);
            memories.sort_by(|a, b| b.importance.total_cmp(&a.importance));
            memories.truncate(MEMORY_CAP);
            // An immediately-evicted entry leaves the ranked list as it was
            if !memories.iter().any(|m| m.id == id) {
                return Ok(false);
            }
            memories.clone()
        };
        self.storage.save_memories(&snapshot).await?;
        Ok(true)
    }

    /// Remove every memory and persist the empty list
    pub async fn clear_memories(&self) -> StorageResult<()> {
        let _write = self.memories_write.lock().await;
        {
            self.memories.write().clear();
        }
        self.storage.save_memories(&[]).await?;
        info!("Cleared all memories");
        Ok(())
    }

    async fn persist_sessions(&self) -> StorageResult<()> {
        let _write = self.sessions_write.lock().await;
        let snapshot: HashMap<String, ConversationSession> = self
            .sessions
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        self.storage.save_sessions(&snapshot).await
    }
}
