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

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::store::{ObjectStore, StoreError, TxOp};

/// A transient, in-memory store. Backs unit tests and scratch worlds; same
/// key ordering semantics as the fjall provider.
#[derive(Default)]
pub struct MemStore {
    collections: RwLock<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectStore for MemStore {
    fn get(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let collections = self.collections.read().unwrap();
        Ok(collections
            .get(collection)
            .and_then(|c| c.get(key))
            .cloned())
    }

    fn find(
        &self,
        collection: &str,
        predicate: &dyn Fn(&str, &[u8]) -> bool,
    ) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let collections = self.collections.read().unwrap();
        let Some(coll) = collections.get(collection) else {
            return Ok(vec![]);
        };
        Ok(coll
            .iter()
            .filter(|(k, v)| predicate(k, v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn upsert(&self, collection: &str, key: &str, document: &[u8]) -> Result<(), StoreError> {
        let mut collections = self.collections.write().unwrap();
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), document.to_vec());
        Ok(())
    }

    fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.write().unwrap();
        if let Some(coll) = collections.get_mut(collection) {
            coll.remove(key);
        }
        Ok(())
    }

    fn apply(&self, ops: &[TxOp]) -> Result<(), StoreError> {
        // One write lock for the whole batch makes it atomic to readers.
        let mut collections = self.collections.write().unwrap();
        for op in ops {
            match op {
                TxOp::Upsert {
                    collection,
                    key,
                    document,
                } => {
                    collections
                        .entry(collection.clone())
                        .or_default()
                        .insert(key.clone(), document.clone());
                }
                TxOp::Delete { collection, key } => {
                    if let Some(coll) = collections.get_mut(collection) {
                        coll.remove(key);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::store::StoreTx;

    use super::*;

    #[test]
    fn test_get_upsert_delete() {
        let store = MemStore::new();
        assert_eq!(store.get("objects", "a").unwrap(), None);
        store.upsert("objects", "a", b"one").unwrap();
        assert_eq!(store.get("objects", "a").unwrap(), Some(b"one".to_vec()));
        store.delete("objects", "a").unwrap();
        assert_eq!(store.get("objects", "a").unwrap(), None);
    }

    #[test]
    fn test_find_in_key_order() {
        let store = MemStore::new();
        store.upsert("objects", "b", b"2").unwrap();
        store.upsert("objects", "a", b"1").unwrap();
        store.upsert("objects", "c", b"3").unwrap();
        let all = store.find("objects", &|_, _| true).unwrap();
        let keys: Vec<&str> = all.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_tx_reads_see_own_writes() {
        let store = MemStore::new();
        store.upsert("counters", "dbref", b"1").unwrap();
        let mut tx = StoreTx::new(&store);
        tx.upsert("counters", "dbref", b"2".to_vec());
        assert_eq!(tx.get("counters", "dbref").unwrap(), Some(b"2".to_vec()));
        // Not visible outside until commit.
        assert_eq!(store.get("counters", "dbref").unwrap(), Some(b"1".to_vec()));
        tx.commit().unwrap();
        assert_eq!(store.get("counters", "dbref").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_tx_delete_shadows_store() {
        let store = MemStore::new();
        store.upsert("objects", "a", b"1").unwrap();
        let mut tx = StoreTx::new(&store);
        tx.delete("objects", "a");
        assert_eq!(tx.get("objects", "a").unwrap(), None);
        tx.commit().unwrap();
        assert_eq!(store.get("objects", "a").unwrap(), None);
    }
}
