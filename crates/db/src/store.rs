// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use fen_common::model::WorldError;

/// The collections the world persists into. Each gets its own partition in
/// the backing store.
pub mod collections {
    pub const CLASSES: &str = "classes";
    pub const OBJECTS: &str = "objects";
    pub const PLAYERS: &str = "players";
    pub const VERBS: &str = "verbs";
    pub const FUNCTIONS: &str = "functions";
    pub const COUNTERS: &str = "counters";
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store i/o failure: {0}")]
    Io(String),
    #[error("corrupt document in {collection}/{key}: {detail}")]
    Corrupt {
        collection: String,
        key: String,
        detail: String,
    },
}

impl From<StoreError> for WorldError {
    fn from(e: StoreError) -> Self {
        WorldError::Io(e.to_string())
    }
}

/// The persistence port: named collections of documents, keyed by opaque
/// identity strings, plus a scoped transaction whose writes land atomically.
///
/// Documents are byte blobs at this level; the typed helpers below put JSON
/// encoding in one place.
pub trait ObjectStore: Send + Sync {
    fn get(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Scan a collection, in key order, returning every (key, document) the
    /// predicate accepts.
    fn find(
        &self,
        collection: &str,
        predicate: &dyn Fn(&str, &[u8]) -> bool,
    ) -> Result<Vec<(String, Vec<u8>)>, StoreError>;

    fn upsert(&self, collection: &str, key: &str, document: &[u8]) -> Result<(), StoreError>;

    fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError>;

    /// Apply a batch of writes atomically: all land or none do.
    fn apply(&self, ops: &[TxOp]) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub enum TxOp {
    Upsert {
        collection: String,
        key: String,
        document: Vec<u8>,
    },
    Delete {
        collection: String,
        key: String,
    },
}

/// A scoped transaction over an [`ObjectStore`]. Writes are buffered and
/// visible to this transaction's own reads; `commit` applies them atomically.
pub struct StoreTx<'a> {
    store: &'a dyn ObjectStore,
    ops: Vec<TxOp>,
}

impl<'a> StoreTx<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self {
            store,
            ops: Vec::new(),
        }
    }

    pub fn get(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        // Later buffered ops win over earlier ones and over the store.
        for op in self.ops.iter().rev() {
            match op {
                TxOp::Upsert {
                    collection: c,
                    key: k,
                    document,
                } if c == collection && k == key => return Ok(Some(document.clone())),
                TxOp::Delete {
                    collection: c,
                    key: k,
                } if c == collection && k == key => return Ok(None),
                _ => {}
            }
        }
        self.store.get(collection, key)
    }

    pub fn upsert(&mut self, collection: &str, key: &str, document: Vec<u8>) {
        self.ops.push(TxOp::Upsert {
            collection: collection.to_string(),
            key: key.to_string(),
            document,
        });
    }

    pub fn delete(&mut self, collection: &str, key: &str) {
        self.ops.push(TxOp::Delete {
            collection: collection.to_string(),
            key: key.to_string(),
        });
    }

    pub fn commit(self) -> Result<(), StoreError> {
        if self.ops.is_empty() {
            return Ok(());
        }
        self.store.apply(&self.ops)
    }
}

pub fn get_doc<T: DeserializeOwned>(
    store: &dyn ObjectStore,
    collection: &str,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let Some(raw) = store.get(collection, key)? else {
        return Ok(None);
    };
    decode(collection, key, &raw).map(Some)
}

pub fn put_doc<T: Serialize>(
    store: &dyn ObjectStore,
    collection: &str,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    store.upsert(collection, key, &encode(value))
}

/// Decode every document in a collection and keep those the predicate
/// accepts, in key order.
pub fn find_docs<T: DeserializeOwned>(
    store: &dyn ObjectStore,
    collection: &str,
    predicate: impl Fn(&T) -> bool,
) -> Result<Vec<T>, StoreError> {
    let raw = store.find(collection, &|_, _| true)?;
    let mut out = Vec::new();
    for (key, bytes) in raw {
        let doc: T = decode(collection, &key, &bytes)?;
        if predicate(&doc) {
            out.push(doc);
        }
    }
    Ok(out)
}

pub fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("document serialization cannot fail")
}

pub fn decode<T: DeserializeOwned>(
    collection: &str,
    key: &str,
    bytes: &[u8],
) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupt {
        collection: collection.to_string(),
        key: key.to_string(),
        detail: e.to_string(),
    })
}
