use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{Column, KeyValueStore, PrefixVisitor, StoreError, WriteBatch, WriteOp};

type ColumnMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-process store; one ordered map per column behind a single lock so a
/// batch becomes visible all at once.
pub struct MemoryStore {
    columns: RwLock<Vec<ColumnMap>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            columns: RwLock::new(vec![ColumnMap::new(); Column::ALL.len()]),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held in `column`.
    pub fn len(&self, column: Column) -> Result<usize, StoreError> {
        Ok(self.read()?[column.index()].len())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<ColumnMap>>, StoreError> {
        self.columns
            .read()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<ColumnMap>>, StoreError> {
        self.columns
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.read()?[column.index()].get(key).cloned())
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.write()?[column.index()].insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        self.write()?[column.index()].remove(key);
        Ok(())
    }

    fn for_each_prefix<'a>(
        &self,
        column: Column,
        prefix: &[u8],
        visitor: &mut PrefixVisitor<'a>,
    ) -> Result<(), StoreError> {
        let guard = self.read()?;
        let entries = guard[column.index()]
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix));
        for (key, value) in entries {
            visitor(key, value)?;
        }
        Ok(())
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut guard = self.write()?;
        for op in batch.iter() {
            match op {
                WriteOp::Put { column, key, value } => {
                    guard[column.index()].insert(key.as_slice().to_vec(), value.as_slice().to_vec());
                }
                WriteOp::Delete { column, key } => {
                    guard[column.index()].remove(key.as_slice());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_walk_stays_inside_column() {
        let store = MemoryStore::new();
        store.put(Column::Utxo, b"ab1", b"x").expect("put");
        store.put(Column::Utxo, b"ab2", b"y").expect("put");
        store.put(Column::Utxo, b"ac", b"z").expect("put");
        store.put(Column::Block, b"ab3", b"w").expect("put");

        let mut seen = Vec::new();
        store
            .for_each_prefix(Column::Utxo, b"ab", &mut |key, _| {
                seen.push(key.to_vec());
                Ok(())
            })
            .expect("walk");
        assert_eq!(seen, vec![b"ab1".to_vec(), b"ab2".to_vec()]);
    }

    #[test]
    fn batch_applies_in_order() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put(Column::Meta, b"k", b"first".as_slice());
        batch.delete(Column::Meta, b"k");
        batch.put(Column::Meta, b"k", b"second".as_slice());
        store.write_batch(&batch).expect("commit");
        assert_eq!(
            store.get(Column::Meta, b"k").expect("get"),
            Some(b"second".to_vec())
        );
        assert_eq!(store.len(Column::Meta).expect("len"), 1);
    }
}
