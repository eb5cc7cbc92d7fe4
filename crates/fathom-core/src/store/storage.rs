//! Key-value backends for the conversation store.
//!
//! Durable state lives in two logical tables addressed by string keys
//! under a fixed namespace: the summary index and one detail record per
//! conversation.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Key holding the conversation summary index.
pub const SUMMARY_INDEX_KEY: &str = "fathom-conversations";

/// Prefix for per-conversation detail keys.
pub const DETAIL_KEY_PREFIX: &str = "fathom-conversation-details";

/// Returns the detail key for a conversation id.
pub fn detail_key(conversation_id: &str) -> String {
    format!("{DETAIL_KEY_PREFIX}-{conversation_id}")
}

/// Minimal storage collaborator the conversation store writes through.
///
/// Failures surface as errors here and are caught at the store boundary;
/// they must never corrupt in-memory state.
pub trait KvStorage {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
    /// All keys currently present, in no particular order.
    fn keys(&self) -> Result<Vec<String>>;
}

/// In-memory backend, used in tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }
}

/// File-backed storage: one JSON file per key under a directory.
///
/// Keys are already namespaced and filesystem-safe, so the mapping is
/// `<dir>/<key>.json`.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Opens (creating if needed) a storage directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create storage directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Opens the default conversations directory under the fathom home.
    pub fn open_default() -> Result<Self> {
        Self::new(crate::config::paths::conversations_dir())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KvStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        fs::write(&path, value).with_context(|| format!("Failed to write {}", path.display()))
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read {}", self.dir.display()))?
        {
            let path = entry.context("Failed to read directory entry")?.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(stem) = path.file_stem()
            {
                keys.push(stem.to_string_lossy().to_string());
            }
        }
        Ok(keys)
    }
}
