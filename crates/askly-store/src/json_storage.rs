//! # JsonStorage implementation
//!
//! File-backed storage: two JSON blobs under a base directory.
//!
//! Storage structure:
//! ```text
//! <base_path>/
//! ├── sessions.json      # session id -> ConversationSession
//! └── memories.json      # list of Memory
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info, warn};

use askly_core::{ConversationSession, Memory};

use crate::error::StorageResult;
use crate::storage::Storage;

const SESSIONS_FILE: &str = "sessions.json";
const MEMORIES_FILE: &str = "memories.json";

/// JSON-file storage rooted at a (tilde-expandable) base directory
pub struct JsonStorage {
    base_path: PathBuf,
}

impl JsonStorage {
    /// Create the storage, ensuring the base directory exists
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path: PathBuf = base_path.into();
        let expanded = shellexpand::tilde(&base_path.to_string_lossy().to_string()).to_string();
        let base_path = PathBuf::from(expanded);

        fs::create_dir_all(&base_path).await?;
        info!("JsonStorage initialized at {:?}", base_path);

        Ok(Self { base_path })
    }

    fn sessions_path(&self) -> PathBuf {
        self.base_path.join(SESSIONS_FILE)
    }

    fn memories_path(&self) -> PathBuf {
        self.base_path.join(MEMORIES_FILE)
    }

    /// Load and parse a blob, treating absence or corruption as empty
    async fn load_blob<T: serde::de::DeserializeOwned + Default>(&self, path: PathBuf) -> T {
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return T::default(),
            Err(err) => {
                warn!("Failed to read {:?}: {}", path, err);
                return T::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(err) => {
                warn!("Discarding corrupt blob {:?}: {}", path, err);
                T::default()
            }
        }
    }

    async fn save_blob<T: serde::Serialize>(&self, path: PathBuf, value: &T) -> StorageResult<()> {
        let content = serde_json::to_string_pretty(value)?;
        fs::write(&path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for JsonStorage {
    async fn load_sessions(&self) -> StorageResult<HashMap<String, ConversationSession>> {
        Ok(self.load_blob(self.sessions_path()).await)
    }

    async fn save_sessions(
        &self,
        sessions: &HashMap<String, ConversationSession>,
    ) -> StorageResult<()> {
        self.save_blob(self.sessions_path(), sessions).await?;
        debug!("Saved {} sessions", sessions.len());
        Ok(())
    }

    async fn load_memories(&self) -> StorageResult<Vec<Memory>> {
        Ok(self.load_blob(self.memories_path()).await)
    }

    async fn save_memories(&self, memories: &[Memory]) -> StorageResult<()> {
        self.save_blob(self.memories_path(), &memories).await?;
        debug!("Saved {} memories", memories.len());
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        for path in [self.sessions_path(), self.memories_path()] {
            if path.exists() {
                fs::remove_file(&path).await?;
            }
        }
        info!("Cleared storage at {:?}", self.base_path);
        Ok(())
    }
}
