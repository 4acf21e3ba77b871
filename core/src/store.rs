use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use crate::error::{PostNotesError, Result};
use crate::note::ItemId;

/// Key-value storage owned by the host: per-item meta values and global options
pub trait MetaStore: Send + Sync {
    /// Reads one meta value of an item
    fn get_meta(&self, item: ItemId, key: &str) -> Result<Option<String>>;

    /// Writes one meta value of an item, replacing any previous value
    fn set_meta(&self, item: ItemId, key: &str, value: &str) -> Result<()>;

    /// Reads a global option
    fn get_option(&self, name: &str) -> Result<Option<Value>>;

    /// Writes a global option, replacing any previous value
    fn set_option(&self, name: &str, value: &Value) -> Result<()>;

    /// Removes a global option
    fn delete_option(&self, name: &str) -> Result<()>;
}

pub type SharedStore = Arc<dyn MetaStore>;

/// Everything a store holds, in the shape it is written to disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreData {
    /// Meta values keyed by item ID, then by meta key
    #[serde(default)]
    pub meta: BTreeMap<ItemId, BTreeMap<String, String>>,
    #[serde(default)]
    pub options: BTreeMap<String, Value>,
}

impl StoreData {
    fn get_meta(&self, item: ItemId, key: &str) -> Option<String> {
        self.meta.get(&item).and_then(|values| values.get(key)).cloned()
    }

    fn set_meta(&mut self, item: ItemId, key: &str, value: &str) {
        self.meta
            .entry(item)
            .or_default()
            .insert(key.to_string(), value.to_string());
    }
}

fn lock(data: &Mutex<StoreData>) -> Result<MutexGuard<'_, StoreData>> {
    data.lock()
        .map_err(|_| PostNotesError::Storage("store lock poisoned".to_string()))
}

/// In-process store, used by tests and by hosts that persist elsewhere
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Creates a store pre-filled with the given contents
    pub fn with_data(data: StoreData) -> Self {
        MemoryStore {
            data: Mutex::new(data),
        }
    }
}

impl MetaStore for MemoryStore {
    fn get_meta(&self, item: ItemId, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.data)?.get_meta(item, key))
    }

    fn set_meta(&self, item: ItemId, key: &str, value: &str) -> Result<()> {
        lock(&self.data)?.set_meta(item, key, value);
        Ok(())
    }

    fn get_option(&self, name: &str) -> Result<Option<Value>> {
        Ok(lock(&self.data)?.options.get(name).cloned())
    }

    fn set_option(&self, name: &str, value: &Value) -> Result<()> {
        lock(&self.data)?.options.insert(name.to_string(), value.clone());
        Ok(())
    }

    fn delete_option(&self, name: &str) -> Result<()> {
        lock(&self.data)?.options.remove(name);
        Ok(())
    }
}

/// Store backed by a single JSON file, rewritten after every change
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl FileStore {
    /// Opens the store at `path`, starting empty if the file does not exist yet
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let data = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            StoreData::default()
        };

        tracing::debug!("Opened note store at {:?}", path);

        Ok(FileStore {
            path,
            data: Mutex::new(data),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_file(path: &Path) -> Result<StoreData> {
        let contents = std::fs::read_to_string(path)?;
        let data = serde_json::from_str(&contents)?;
        Ok(data)
    }

    fn persist(&self, data: &StoreData) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Applies a change and writes the file. The in-memory copy is only
    /// updated once the file write succeeded.
    fn mutate<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut StoreData),
    {
        let mut guard = lock(&self.data)?;
        let mut next = guard.clone();
        change(&mut next);
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }
}

impl MetaStore for FileStore {
    fn get_meta(&self, item: ItemId, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.data)?.get_meta(item, key))
    }

    fn set_meta(&self, item: ItemId, key: &str, value: &str) -> Result<()> {
        self.mutate(|data| data.set_meta(item, key, value))
    }

    fn get_option(&self, name: &str) -> Result<Option<Value>> {
        Ok(lock(&self.data)?.options.get(name).cloned())
    }

    fn set_option(&self, name: &str, value: &Value) -> Result<()> {
        self.mutate(|data| {
            data.options.insert(name.to_string(), value.clone());
        })
    }

    fn delete_option(&self, name: &str) -> Result<()> {
        self.mutate(|data| {
            data.options.remove(name);
        })
    }
}
