use super::{Collections, DocumentStore, StoreError, WriteBatch};
use parking_lot::RwLock;
use serde_json::Value;

/// In-process store. Commits hold the write lock for the whole batch.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every document, for inspection in tests.
    pub fn snapshot(&self) -> Collections {
        self.collections.read().clone()
    }
}

impl DocumentStore for MemoryStore {
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
        batch.apply_to(&mut self.collections.write());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{get_as, list_as};
    use serde_json::json;

    #[test]
    fn typed_reads() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put("nums", "b", &2u32).unwrap();
        batch.put("nums", "a", &1u32).unwrap();
        store.commit(batch).unwrap();

        assert_eq!(get_as::<u32>(&store, "nums", "a").unwrap(), Some(1));
        assert_eq!(get_as::<u32>(&store, "nums", "zz").unwrap(), None);
        let all = list_as::<u32>(&store, "nums").unwrap();
        assert_eq!(all, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
        assert!(store.list("missing").unwrap().is_empty());
    }

    #[test]
    fn malformed_document_reports_location() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put("nums", "x", &json!("not a number")).unwrap();
        store.commit(batch).unwrap();
        let err = get_as::<u32>(&store, "nums", "x").unwrap_err();
        assert!(err.to_string().contains("nums/x"));
    }
}
