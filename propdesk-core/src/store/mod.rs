//! Document store: named collections of JSON documents keyed by id.
//!
//! Writes go through a [`WriteBatch`] that lands atomically: either every
//! put/delete in the batch is applied or none is.

mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("document {collection}/{id} is malformed: {source}")]
    Decode {
        collection: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Collection paths used by the desk.
pub mod paths {
    pub const CHALLENGES: &str = "prop_challenges";
    pub const SYSTEM_WALLETS: &str = "system_wallets";
    pub const LIQUIDATION_LOG: &str = "liquidation_log";
    pub const TRANSACTIONS: &str = "transactions";

    pub fn participants(challenge_id: &str) -> String {
        format!("{CHALLENGES}/{challenge_id}/participants")
    }

    pub fn wallets(user_id: &str) -> String {
        format!("users/{user_id}/wallets")
    }
}

/// All documents, grouped by collection path.
pub type Collections = BTreeMap<String, BTreeMap<String, Value>>;

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put { collection: String, id: String, doc: Value },
    Delete { collection: String, id: String },
}

/// Ordered set of writes committed as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<T: Serialize>(
        &mut self,
        collection: impl Into<String>,
        id: impl Into<String>,
        doc: &T,
    ) -> Result<&mut Self, StoreError> {
        self.ops.push(WriteOp::Put {
            collection: collection.into(),
            id: id.into(),
            doc: serde_json::to_value(doc)?,
        });
        Ok(self)
    }

    pub fn delete(&mut self, collection: impl Into<String>, id: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Delete { collection: collection.into(), id: id.into() });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Apply every op to `collections` in order. Later puts win.
    pub fn apply_to(self, collections: &mut Collections) {
        for op in self.ops {
            match op {
                WriteOp::Put { collection, id, doc } => {
                    collections.entry(collection).or_default().insert(id, doc);
                }
                WriteOp::Delete { collection, id } => {
                    if let Some(docs) = collections.get_mut(&collection) {
                        docs.remove(&id);
                    }
                }
            }
        }
    }
}

pub trait DocumentStore: Send + Sync {
    fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// Every document in `collection`, ordered by id.
    fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StoreError>;

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

fn decode<T: DeserializeOwned>(collection: &str, id: &str, doc: Value) -> Result<T, StoreError> {
    serde_json::from_value(doc).map_err(|source| StoreError::Decode {
        collection: collection.to_string(),
        id: id.to_string(),
        source,
    })
}

/// Typed `get`.
pub fn get_as<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<Option<T>, StoreError> {
    store
        .get(collection, id)?
        .map(|doc| decode(collection, id, doc))
        .transpose()
}

/// Typed `list`.
pub fn list_as<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
) -> Result<Vec<(String, T)>, StoreError> {
    store
        .list(collection)?
        .into_iter()
        .map(|(id, doc)| {
            let value = decode(collection, &id, doc)?;
            Ok((id, value))
        })
        .collect()
}
