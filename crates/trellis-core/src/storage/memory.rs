//! # In-Memory Record Store
//!
//! An ordered map behind a lock. Counts calls per operation so tests can
//! check how many physical round trips the engine made.

use super::{IdAllocator, RecordStore, TransactionTable};
use crate::primitives::{DEFAULT_TRANSACTION_GROUP_LIMIT, FIRST_ALLOCATED_ID};
use crate::record::Record;
use crate::{Key, StoreError, StoreResult, TxnId};
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Number of calls made to each store operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub put: usize,
    pub put_all: usize,
    pub get: usize,
    pub delete: usize,
}

#[derive(Debug, Default)]
struct Counters {
    put: AtomicUsize,
    put_all: AtomicUsize,
    get: AtomicUsize,
    delete: AtomicUsize,
}

/// A record store held entirely in memory.
#[derive(Debug)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<Key, Record>>,
    ids: IdAllocator,
    txns: TransactionTable,
    calls: Counters,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_group_limit(DEFAULT_TRANSACTION_GROUP_LIMIT)
    }

    /// A store whose transactions may touch at most `limit` partition groups.
    #[must_use]
    pub fn with_group_limit(limit: usize) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            ids: IdAllocator::starting_at(FIRST_ALLOCATED_ID),
            txns: TransactionTable::new(limit),
            calls: Counters::default(),
        }
    }

    /// Calls made so far.
    #[must_use]
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            put: self.calls.put.load(Ordering::Relaxed),
            put_all: self.calls.put_all.load(Ordering::Relaxed),
            get: self.calls.get.load(Ordering::Relaxed),
            delete: self.calls.delete.load(Ordering::Relaxed),
        }
    }

    /// Committed records.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.records.read().map_err(|_| StoreError::Poisoned)?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Keys of committed records, in key order.
    pub fn keys(&self) -> StoreResult<Vec<Key>> {
        Ok(self
            .records
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .keys()
            .cloned()
            .collect())
    }

    fn complete(&self, record: Record) -> StoreResult<Record> {
        let key = self.ids.allocate(&record.key)?;
        Ok(Record::new(key, record.properties))
    }

    fn write(&self, txn: Option<TxnId>, records: Vec<Record>) -> StoreResult<Vec<Key>> {
        let records = records
            .into_iter()
            .map(|record| self.complete(record))
            .collect::<StoreResult<Vec<_>>>()?;
        let keys: Vec<Key> = records.iter().map(|r| r.key.clone()).collect();

        match txn {
            Some(txn) => self.txns.with(txn, |staged, limit| {
                staged.touch_all(&keys, limit)?;
                for record in records {
                    staged.stage_put(record);
                }
                Ok(())
            })?,
            None => {
                let mut committed = self.records.write().map_err(|_| StoreError::Poisoned)?;
                for record in records {
                    committed.insert(record.key.clone(), record);
                }
            }
        }
        Ok(keys)
    }
}

impl RecordStore for MemoryStore {
    fn put(&self, txn: Option<TxnId>, record: Record) -> StoreResult<Key> {
        self.calls.put.fetch_add(1, Ordering::Relaxed);
        self.write(txn, vec![record])?
            .pop()
            .ok_or_else(|| StoreError::Io("put produced no key".to_string()))
    }

    fn put_all(&self, txn: Option<TxnId>, records: Vec<Record>) -> StoreResult<Vec<Key>> {
        self.calls.put_all.fetch_add(1, Ordering::Relaxed);
        self.write(txn, records)
    }

    fn get(&self, txn: Option<TxnId>, key: &Key) -> StoreResult<Option<Record>> {
        self.calls.get.fetch_add(1, Ordering::Relaxed);
        if let Some(txn) = txn {
            let staged = self.txns.with(txn, |staged, limit| {
                staged.touch(key, limit)?;
                Ok(staged.staged(key).map(|r| r.cloned()))
            })?;
            if let Some(staged) = staged {
                return Ok(staged);
            }
        }
        Ok(self
            .records
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .get(key)
            .cloned())
    }

    fn delete(&self, txn: Option<TxnId>, keys: &[Key]) -> StoreResult<()> {
        self.calls.delete.fetch_add(1, Ordering::Relaxed);
        match txn {
            Some(txn) => self.txns.with(txn, |staged, limit| {
                staged.touch_all(keys, limit)?;
                for key in keys {
                    staged.stage_delete(key.clone());
                }
                Ok(())
            }),
            None => {
                let mut committed = self.records.write().map_err(|_| StoreError::Poisoned)?;
                for key in keys {
                    committed.remove(key);
                }
                Ok(())
            }
        }
    }

    fn allocate(&self, key: &Key) -> StoreResult<Key> {
        self.ids.allocate(key)
    }

    fn begin_transaction(&self) -> StoreResult<TxnId> {
        self.txns.begin()
    }

    fn commit(&self, txn: TxnId) -> StoreResult<()> {
        let staged = self.txns.finish(txn)?;
        let mut committed = self.records.write().map_err(|_| StoreError::Poisoned)?;
        for (key, write) in staged.into_writes() {
            match write {
                Some(record) => {
                    committed.insert(key, record);
                }
                None => {
                    committed.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn rollback(&self, txn: TxnId) -> StoreResult<()> {
        self.txns.finish(txn).map(drop)
    }

    fn transaction_groups(&self, txn: TxnId) -> StoreResult<Vec<Key>> {
        self.txns.groups(txn)
    }
}

// =============================================================================
// TESTS
// =============================================================================
