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

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::info;

use crate::store::{ObjectStore, StoreError, TxOp};

/// The on-disk store provider: one fjall partition per collection, batch
/// writes for transactionality.
pub struct FjallStore {
    keyspace: Keyspace,
    partitions: RwLock<HashMap<String, PartitionHandle>>,
}

impl FjallStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        info!(?path, "Opening world database");
        let keyspace = fjall::Config::new(path)
            .open()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(Self {
            keyspace,
            partitions: RwLock::new(HashMap::new()),
        })
    }

    fn partition(&self, name: &str) -> Result<PartitionHandle, StoreError> {
        {
            let partitions = self.partitions.read().unwrap();
            if let Some(p) = partitions.get(name) {
                return Ok(p.clone());
            }
        }
        let partition = self
            .keyspace
            .open_partition(name, PartitionCreateOptions::default())
            .map_err(|e| StoreError::Io(e.to_string()))?;
        self.partitions
            .write()
            .unwrap()
            .insert(name.to_string(), partition.clone());
        Ok(partition)
    }
}

impl ObjectStore for FjallStore {
    fn get(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let partition = self.partition(collection)?;
        let value = partition
            .get(key)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(value.map(|v| v.to_vec()))
    }

    fn find(
        &self,
        collection: &str,
        predicate: &dyn Fn(&str, &[u8]) -> bool,
    ) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let partition = self.partition(collection)?;
        let mut out = Vec::new();
        for entry in partition.iter() {
            let (key, value) = entry.map_err(|e| StoreError::Io(e.to_string()))?;
            let key = String::from_utf8_lossy(&key).to_string();
            if predicate(&key, &value) {
                out.push((key, value.to_vec()));
            }
        }
        Ok(out)
    }

    fn upsert(&self, collection: &str, key: &str, document: &[u8]) -> Result<(), StoreError> {
        let partition = self.partition(collection)?;
        partition
            .insert(key, document)
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        let partition = self.partition(collection)?;
        partition
            .remove(key)
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    fn apply(&self, ops: &[TxOp]) -> Result<(), StoreError> {
        let mut batch = self.keyspace.batch();
        for op in ops {
            match op {
                TxOp::Upsert {
                    collection,
                    key,
                    document,
                } => {
                    let partition = self.partition(collection)?;
                    batch.insert(&partition, key.as_bytes(), document.as_slice());
                }
                TxOp::Delete { collection, key } => {
                    let partition = self.partition(collection)?;
                    batch.remove(&partition, key.as_bytes());
                }
            }
        }
        batch.commit().map_err(|e| StoreError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreTx;

    #[test]
    fn test_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FjallStore::open(dir.path()).unwrap();
            store.upsert("objects", "a", b"hello").unwrap();
        }
        let store = FjallStore::open(dir.path()).unwrap();
        assert_eq!(store.get("objects", "a").unwrap(), Some(b"hello".to_vec()));
    }

    #[test]
    fn test_batch_commit_lands_all_ops() {
        let dir = tempfile::tempdir().unwrap();
        let store = FjallStore::open(dir.path()).unwrap();
        store.upsert("objects", "gone", b"x").unwrap();
        let mut tx = StoreTx::new(&store);
        tx.upsert("objects", "a", b"1".to_vec());
        tx.upsert("counters", "dbref", b"9".to_vec());
        tx.delete("objects", "gone");
        tx.commit().unwrap();
        assert_eq!(store.get("objects", "a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get("counters", "dbref").unwrap(), Some(b"9".to_vec()));
        assert_eq!(store.get("objects", "gone").unwrap(), None);
    }
}
