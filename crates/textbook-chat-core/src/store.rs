//! Session-scoped key/value storage.
//!
//! Everything the chat widget remembers between page views (history, open flag,
//! persona) goes through a [`SessionStore`]. Values are plain strings; callers
//! own their encoding.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const MESSAGES_KEY: &str = "chatbot_messages";
pub const IS_OPEN_KEY: &str = "chatbot_is_open";
pub const PERSONA_KEY: &str = "chatbot_persona";

pub trait SessionStore: Send + Sync {
    /// Returns `None` when the key has never been written or was cleared.
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&self, key: &str, value: &str) -> Result<()>;
    /// Removing a missing key is not an error.
    fn clear(&self, key: &str) -> Result<()>;
}

/// In-memory store. The binary falls back to it when the session directory
/// cannot be created.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values
            .lock()
            .map(|values| values.contains_key(key))
            .unwrap_or(false)
    }
}

impl SessionStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|e| anyhow!("session store lock poisoned: {}", e))?;
        Ok(values.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| anyhow!("session store lock poisoned: {}", e))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| anyhow!("session store lock poisoned: {}", e))?;
        values.remove(key);
        Ok(())
    }
}

/// One file per key inside a session directory.
///
/// A store from [`FileStore::ephemeral`] belongs to the running process: it gets
/// its own directory and removes it on drop, so nothing outlives the session.
/// [`FileStore::open`] keeps whatever it finds and leaves it behind.
pub struct FileStore {
    dir: PathBuf,
    remove_on_drop: bool,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| anyhow!("Failed to create session directory {:?}: {}", dir, e))?;
        Ok(Self {
            dir,
            remove_on_drop: false,
        })
    }

    /// A fresh store under `root` keyed to this process id. Leftovers from a
    /// crashed run with the same id are discarded first.
    pub fn ephemeral(root: impl AsRef<Path>) -> Result<Self> {
        let dir = root.as_ref().join(format!("run-{}", std::process::id()));
        remove_dir(&dir)?;
        let mut store = Self::open(dir)?;
        store.remove_on_drop = true;
        Ok(store)
    }

    /// Default session directory: `<cache>/ask-textbook/session`.
    pub fn default_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow!("Could not determine cache directory"))?;

        Ok(cache_dir.join("ask-textbook").join("session"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// End the session: drop every persisted value.
    pub fn destroy(self) -> Result<()> {
        remove_dir(&self.dir)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if !self.remove_on_drop {
            return;
        }
        match remove_dir(&self.dir) {
            Ok(()) => tracing::debug!(dir = %self.dir.display(), "session directory removed"),
            Err(e) => tracing::warn!(error = %e, "could not remove session directory"),
        }
    }
}

fn remove_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(anyhow!("Failed to remove session directory {:?}: {}", dir, e)),
    }
}

impl SessionStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        // Write then rename so a crash never leaves half a history behind.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
