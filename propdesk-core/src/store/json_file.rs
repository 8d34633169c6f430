use super::{Collections, DocumentStore, StoreError, WriteBatch};
use parking_lot::RwLock;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Store backed by a single pretty-printed JSON file.
///
/// Each commit writes the full document set to a sibling temp file and
/// renames it over the original, so a crash never leaves a half-written file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    collections: RwLock<Collections>,
}

impl JsonFileStore {
    /// Open `path`, starting empty if the file does not exist yet.
    ///
    /// A file that exists but does not parse is an error rather than an empty
    /// store: account balances must never silently reset.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let collections = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => Collections::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Collections::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, collections: RwLock::new(collections) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(&self, collections: &Collections) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(collections)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl DocumentStore for JsonFileStore {
    fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StoreError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|docs| docs.iter().map(|(id, doc)| (id.clone(), doc.clone())).collect())
            .unwrap_or_default())
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let ops = batch.len();
        let mut guard = self.collections.write();
        let mut next = guard.clone();
        batch.apply_to(&mut next);
        // memory only moves forward once the file is on disk
        self.write_file(&next)?;
        *guard = next;
        debug!(path = %self.path.display(), ops, "batch committed");
        Ok(())
    }
}
