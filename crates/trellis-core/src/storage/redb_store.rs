//! # redb-backed Record Store
//!
//! A disk-backed record store using the redb embedded database:
//! - ACID write transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Records live in one table keyed by the postcard encoding of their key;
//! values carry the record format header. Store transactions are staged in
//! memory and applied in a single redb write transaction on commit, so an
//! open store transaction never holds redb's writer lock.

use super::{IdAllocator, RecordStore, TransactionTable};
use crate::formats::{key_from_bytes, key_to_bytes, record_from_bytes, record_to_bytes};
use crate::primitives::{DEFAULT_TRANSACTION_GROUP_LIMIT, FIRST_ALLOCATED_ID};
use crate::record::Record;
use crate::{Key, StoreError, StoreResult, TxnId};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;
use tracing::debug;

/// Table for records: encoded Key -> header-prefixed record bytes
const RECORDS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("records");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_ID: &str = "next_id";

fn io_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::Io(e.to_string())
}

/// A disk-backed record store.
pub struct RedbStore {
    db: Database,
    ids: IdAllocator,
    txns: TransactionTable,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("next_id", &self.ids.peek())
            .field("group_limit", &self.txns.group_limit())
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a record database at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_group_limit(path, DEFAULT_TRANSACTION_GROUP_LIMIT)
    }

    /// Open with a custom partition-group limit for transactions.
    pub fn open_with_group_limit(path: impl AsRef<Path>, group_limit: usize) -> StoreResult<Self> {
        let db = Database::create(path.as_ref()).map_err(io_error)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(io_error)?;
            let _ = write_txn.open_table(RECORDS).map_err(io_error)?;
            let _ = write_txn.open_table(METADATA).map_err(io_error)?;
            write_txn.commit().map_err(io_error)?;
        }

        let next_id = {
            let read_txn = db.begin_read().map_err(io_error)?;
            let table = read_txn.open_table(METADATA).map_err(io_error)?;
            table
                .get(NEXT_ID)
                .map_err(io_error)?
                .map_or(FIRST_ALLOCATED_ID, |v| v.value())
        };
        debug!(path = %path.as_ref().display(), next_id, "opened record database");

        Ok(Self {
            db,
            ids: IdAllocator::starting_at(next_id),
            txns: TransactionTable::new(group_limit),
        })
    }

    /// Number of committed records.
    pub fn len(&self) -> StoreResult<u64> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let table = read_txn.open_table(RECORDS).map_err(io_error)?;
        table.len().map_err(io_error)
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Every committed record, in encoded-key order.
    pub fn records(&self) -> StoreResult<Vec<Record>> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let table = read_txn.open_table(RECORDS).map_err(io_error)?;
        let mut records = Vec::new();
        for entry in table.iter().map_err(io_error)? {
            let (key, value) = entry.map_err(io_error)?;
            let record = record_from_bytes(value.value())?;
            if key_from_bytes(key.value())? != record.key {
                return Err(StoreError::Corrupt(format!(
                    "record {} stored under a different key",
                    record.key
                )));
            }
            records.push(record);
        }
        Ok(records)
    }

    fn read_committed(&self, key: &Key) -> StoreResult<Option<Record>> {
        let key_bytes = key_to_bytes(key)?;
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let table = read_txn.open_table(RECORDS).map_err(io_error)?;
        table
            .get(key_bytes.as_slice())
            .map_err(io_error)?
            .map(|data| record_from_bytes(data.value()))
            .transpose()
    }

    /// Apply writes (`None` deletes) in one redb write transaction and
    /// persist the id counter alongside them.
    fn apply(&self, writes: impl IntoIterator<Item = (Key, Option<Record>)>) -> StoreResult<()> {
        let write_txn = self.db.begin_write().map_err(io_error)?;
        {
            let mut table = write_txn.open_table(RECORDS).map_err(io_error)?;
            for (key, record) in writes {
                let key_bytes = key_to_bytes(&key)?;
                match record {
                    Some(record) => {
                        let bytes = record_to_bytes(&record)?;
                        table
                            .insert(key_bytes.as_slice(), bytes.as_slice())
                            .map_err(io_error)?;
                    }
                    None => {
                        table.remove(key_bytes.as_slice()).map_err(io_error)?;
                    }
                }
            }
            let mut meta = write_txn.open_table(METADATA).map_err(io_error)?;
            meta.insert(NEXT_ID, self.ids.peek()).map_err(io_error)?;
        }
        write_txn.commit().map_err(io_error)
    }

    fn write(&self, txn: Option<TxnId>, records: Vec<Record>) -> StoreResult<Vec<Key>> {
        let records = records
            .into_iter()
            .map(|record| {
                self.ids
                    .allocate(&record.key)
                    .map(|key| Record::new(key, record.properties))
            })
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
            None => self.apply(records.into_iter().map(|r| (r.key.clone(), Some(r))))?,
        }
        Ok(keys)
    }
}

impl RecordStore for RedbStore {
    fn put(&self, txn: Option<TxnId>, record: Record) -> StoreResult<Key> {
        self.write(txn, vec![record])?
            .pop()
            .ok_or_else(|| StoreError::Io("put produced no key".to_string()))
    }

    fn put_all(&self, txn: Option<TxnId>, records: Vec<Record>) -> StoreResult<Vec<Key>> {
        self.write(txn, records)
    }

    fn get(&self, txn: Option<TxnId>, key: &Key) -> StoreResult<Option<Record>> {
        if let Some(txn) = txn {
            let staged = self.txns.with(txn, |staged, limit| {
                staged.touch(key, limit)?;
                Ok(staged.staged(key).map(|r| r.cloned()))
            })?;
            if let Some(staged) = staged {
                return Ok(staged);
            }
        }
        self.read_committed(key)
    }

    fn get_all(&self, txn: Option<TxnId>, keys: &[Key]) -> StoreResult<Vec<Option<Record>>> {
        if txn.is_some() {
            return keys.iter().map(|key| self.get(txn, key)).collect();
        }
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let table = read_txn.open_table(RECORDS).map_err(io_error)?;
        keys.iter()
            .map(|key| {
                let key_bytes = key_to_bytes(key)?;
                table
                    .get(key_bytes.as_slice())
                    .map_err(io_error)?
                    .map(|data| record_from_bytes(data.value()))
                    .transpose()
            })
            .collect()
    }

    fn delete(&self, txn: Option<TxnId>, keys: &[Key]) -> StoreResult<()> {
        match txn {
            Some(txn) => self.txns.with(txn, |staged, limit| {
                staged.touch_all(keys, limit)?;
                for key in keys {
                    staged.stage_delete(key.clone());
                }
                Ok(())
            }),
            None => self.apply(keys.iter().map(|key| (key.clone(), None))),
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
        debug!(%txn, groups = staged.groups().len(), "committing staged writes");
        self.apply(staged.into_writes())
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
