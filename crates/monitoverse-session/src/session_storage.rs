//! Durable key/value storage backing the session store.
//!
//! Mirrors the browser local-storage contract: string keys, string values,
//! last-writer-wins. The file-backed implementation re-reads the file on every
//! access so separately running dashboard views observe each other's writes.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use monitoverse_core::write_private_text_atomic;
use serde::{Deserialize, Serialize};

pub const SESSION_STORAGE_SCHEMA_VERSION: u32 = 1;
pub const SESSION_USER_KEY: &str = "user";
pub const SESSION_TOKEN_KEY: &str = "token";

/// Key/value persistence used by [`crate::SessionStore`].
pub trait SessionStorage: Send {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&mut self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct MemorySessionStorage {
    items: BTreeMap<String, String>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items<I, K, V>(items: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            items: items
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<()> {
        self.items.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionStorageFile {
    schema_version: u32,
    #[serde(default)]
    items: BTreeMap<String, String>,
}

impl Default for SessionStorageFile {
    fn default() -> Self {
        Self {
            schema_version: SESSION_STORAGE_SCHEMA_VERSION,
            items: BTreeMap::new(),
        }
    }
}

/// JSON file storage, written atomically with owner-only permissions.
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<SessionStorageFile> {
        if !self.path.exists() {
            return Ok(SessionStorageFile::default());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read session storage {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(SessionStorageFile::default());
        }
        let file = serde_json::from_str::<SessionStorageFile>(&raw).with_context(|| {
            format!("failed to parse session storage {}", self.path.display())
        })?;
        if file.schema_version != SESSION_STORAGE_SCHEMA_VERSION {
            bail!(
                "unsupported session storage schema: expected {}, found {}",
                SESSION_STORAGE_SCHEMA_VERSION,
                file.schema_version
            );
        }
        Ok(file)
    }

    /// Loads the current file for a write, starting over when it is unreadable.
    ///
    /// The flag reports whether the on-disk file was discarded.
    fn load_for_update(&self) -> (SessionStorageFile, bool) {
        match self.load() {
            Ok(file) => (file, false),
            Err(error) => {
                tracing::warn!(
                    session_storage = %self.path.display(),
                    error = %error,
                    "discarding unreadable session storage"
                );
                (SessionStorageFile::default(), true)
            }
        }
    }

    fn save(&self, file: &SessionStorageFile) -> Result<()> {
        let mut payload =
            serde_json::to_string_pretty(file).context("failed to serialize session storage")?;
        payload.push('\n');
        write_private_text_atomic(&self.path, &payload).with_context(|| {
            format!("failed to write session storage {}", self.path.display())
        })
    }
}

impl SessionStorage for FileSessionStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
        let (mut file, _) = self.load_for_update();
        file.items.insert(key.to_string(), value.to_string());
        tracing::debug!(
            session_storage = %self.path.display(),
            key,
            entries = file.items.len(),
            "saving session storage item"
        );
        self.save(&file)
    }

    fn remove_item(&mut self, key: &str) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let (mut file, discarded) = self.load_for_update();
        if file.items.remove(key).is_none() && !discarded {
            return Ok(());
        }
        tracing::debug!(
            session_storage = %self.path.display(),
            key,
            entries = file.items.len(),
            "removing session storage item"
        );
        self.save(&file)
    }
}
