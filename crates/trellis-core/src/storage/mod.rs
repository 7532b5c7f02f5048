//! # Record Stores
//!
//! The backend boundary: a flat key/record store with transactions scoped to
//! a bounded set of partition groups.
//!
//! Stores take `&self` so several independent sessions can share one store
//! through an `Arc`. Every data operation names the transaction it belongs
//! to, if any. Transactions stage their writes and apply them atomically on
//! commit; a transaction that touches more partition groups (key roots) than
//! the store allows fails with `StoreError::TooManyGroups`.

pub mod memory;
pub mod redb_store;

pub use memory::{CallCounts, MemoryStore};
pub use redb_store::RedbStore;

use crate::record::Record;
use crate::{Key, StoreError, StoreResult, TxnId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// STORE TRAIT
// =============================================================================

/// A schemaless key/record store.
pub trait RecordStore: Send + Sync {
    /// Write one record. An incomplete key is completed by the store; the
    /// key written under is returned.
    fn put(&self, txn: Option<TxnId>, record: Record) -> StoreResult<Key>;

    /// Write several records in one physical call. Returned keys are in
    /// input order.
    fn put_all(&self, txn: Option<TxnId>, records: Vec<Record>) -> StoreResult<Vec<Key>>;

    fn get(&self, txn: Option<TxnId>, key: &Key) -> StoreResult<Option<Record>>;

    /// Read several records; results are in input order.
    fn get_all(&self, txn: Option<TxnId>, keys: &[Key]) -> StoreResult<Vec<Option<Record>>> {
        keys.iter().map(|key| self.get(txn, key)).collect()
    }

    /// Delete records. Missing keys are ignored.
    fn delete(&self, txn: Option<TxnId>, keys: &[Key]) -> StoreResult<()>;

    /// Assign an identifier to an incomplete key without writing anything.
    /// A key that is already complete is returned unchanged.
    fn allocate(&self, key: &Key) -> StoreResult<Key>;

    fn begin_transaction(&self) -> StoreResult<TxnId>;

    /// Apply every write staged in `txn` atomically.
    fn commit(&self, txn: TxnId) -> StoreResult<()>;

    /// Discard every write staged in `txn`.
    fn rollback(&self, txn: TxnId) -> StoreResult<()>;

    /// Root keys of the partition groups `txn` has touched so far.
    fn transaction_groups(&self, txn: TxnId) -> StoreResult<Vec<Key>>;
}

// =============================================================================
// STAGED TRANSACTIONS
// =============================================================================

/// Writes and group usage of one open transaction.
#[derive(Debug, Default)]
pub struct StagedTransaction {
    /// `None` stages a delete.
    writes: BTreeMap<Key, Option<Record>>,
    groups: BTreeSet<Key>,
}

impl StagedTransaction {
    /// Count the partition group of `key` against `limit`.
    pub fn touch(&mut self, key: &Key, limit: usize) -> StoreResult<()> {
        self.touch_all(std::slice::from_ref(key), limit)
    }

    /// Count the partition groups of `keys` against `limit`. Nothing is
    /// counted unless every group fits.
    pub fn touch_all(&mut self, keys: &[Key], limit: usize) -> StoreResult<()> {
        let fresh: BTreeSet<&Key> = keys
            .iter()
            .map(Key::root)
            .filter(|root| !self.groups.contains(*root))
            .collect();
        let touched = self.groups.len() + fresh.len();
        if touched > limit {
            return Err(StoreError::TooManyGroups { limit, touched });
        }
        self.groups.extend(fresh.into_iter().cloned());
        Ok(())
    }

    pub fn stage_put(&mut self, record: Record) {
        self.writes.insert(record.key.clone(), Some(record));
    }

    pub fn stage_delete(&mut self, key: Key) {
        self.writes.insert(key, None);
    }

    /// What this transaction has staged for `key`: `Some(None)` is a
    /// staged delete, `None` means nothing staged.
    #[must_use]
    pub fn staged(&self, key: &Key) -> Option<Option<&Record>> {
        self.writes.get(key).map(Option::as_ref)
    }

    #[must_use]
    pub fn groups(&self) -> Vec<Key> {
        self.groups.iter().cloned().collect()
    }

    /// Staged writes in key order.
    pub fn into_writes(self) -> impl Iterator<Item = (Key, Option<Record>)> {
        self.writes.into_iter()
    }
}

/// Open transactions of one store.
#[derive(Debug)]
pub struct TransactionTable {
    open: Mutex<BTreeMap<TxnId, StagedTransaction>>,
    next: AtomicU64,
    group_limit: usize,
}

impl TransactionTable {
    #[must_use]
    pub fn new(group_limit: usize) -> Self {
        Self {
            open: Mutex::new(BTreeMap::new()),
            next: AtomicU64::new(1),
            group_limit,
        }
    }

    #[must_use]
    pub fn group_limit(&self) -> usize {
        self.group_limit
    }

    pub fn begin(&self) -> StoreResult<TxnId> {
        let txn = TxnId(self.next.fetch_add(1, Ordering::Relaxed));
        self.open
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .insert(txn, StagedTransaction::default());
        Ok(txn)
    }

    /// Run `f` against the staged state of `txn`.
    pub fn with<T>(
        &self,
        txn: TxnId,
        f: impl FnOnce(&mut StagedTransaction, usize) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut open = self.open.lock().map_err(|_| StoreError::Poisoned)?;
        let staged = open
            .get_mut(&txn)
            .ok_or(StoreError::UnknownTransaction(txn))?;
        f(staged, self.group_limit)
    }

    /// Close `txn` and hand back what it staged.
    pub fn finish(&self, txn: TxnId) -> StoreResult<StagedTransaction> {
        self.open
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .remove(&txn)
            .ok_or(StoreError::UnknownTransaction(txn))
    }

    pub fn groups(&self, txn: TxnId) -> StoreResult<Vec<Key>> {
        self.with(txn, |staged, _| Ok(staged.groups()))
    }
}

/// Sequential identifier source shared by the stores.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    #[must_use]
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// The identifier the next allocation will return.
    #[must_use]
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }

    /// Complete `key` with a fresh identifier. Keys under an incomplete
    /// parent cannot be allocated.
    pub fn allocate(&self, key: &Key) -> StoreResult<Key> {
        if key.parent().is_some_and(|parent| !parent.is_complete()) {
            return Err(StoreError::InvalidKey(key.clone()));
        }
        if key.id().is_some() {
            return Ok(key.clone());
        }
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        Ok(key.completed(id))
    }
}

// =============================================================================
// TESTS
// =============================================================================
