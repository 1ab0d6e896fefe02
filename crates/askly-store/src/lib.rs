//! # Askly Store
//!
//! Persistence layer: the [`Storage`] contract, a JSON-file backend, and
//! the [`Repository`] working set the chat engine operates on.
//!
//! ## Design
//!
//! - Whole-blob persistence: sessions and memories are each one JSON file,
//!   rewritten in full on every mutation
//! - Tolerant loads: a missing or corrupt blob hydrates as empty
//! - Memory hygiene lives in [`Repository::save_memory`]: exact-content
//!   dedup, importance ranking, and the 50-entry cap

pub mod error;
pub mod json_storage;
pub mod repository;
pub mod storage;

pub use error::{StorageError, StorageResult};
pub use json_storage::JsonStorage;
pub use repository::{Repository, MEMORY_CAP};
pub use storage::Storage;

use std::path::PathBuf;

/// Default on-disk location for Askly data
pub fn default_storage_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".askly")
}
