//! The sorted key-value substrate the engine sits on.
//!
//! The core treats the substrate as a black box: a sorted map from
//! [`Address`] to a byte blob with batched point reads, batched writes,
//! range scans and optimistic transactions. [`MemEngine`] is the
//! reference implementation; embedded B-tree/LSM engines plug in behind
//! the same trait.

mod mem;

pub use mem::{MemEngine, MemEngineMetricsSnapshot, MemEngineOptions, MemTxn};

use crate::arena::Arena;
use crate::error::Result;
use crate::types::{Address, CollectionId, Key};

#[derive(Copy, Clone, Debug, Default)]
pub struct ReadOptions {
    /// Record the read in the transaction's conflict set.
    pub track: bool,
    /// Report lengths only; no payload bytes are copied.
    pub lengths_only: bool,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct WriteOptions {
    /// Require durability before returning.
    pub flush: bool,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct CommitOptions {
    /// Require durability of the committed batch before returning.
    pub flush: bool,
}

/// Cardinality and byte estimates for a key range of one collection.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SizeEstimate {
    pub cardinality: u64,
    pub bytes_total: u64,
}

/// Contract every physical engine satisfies.
///
/// `read` appends exactly one tape entry per task into the arena, in task
/// order, using the missing-length sentinel for absent values. `write`
/// applies the batch in order; a `None` payload erases. Transactions
/// buffer writes until commit; tracked reads are validated optimistically
/// at commit time and a lost race surfaces as [`StoreError::Conflict`].
///
/// [`StoreError::Conflict`]: crate::StoreError::Conflict
pub trait KvEngine {
    type Txn;

    fn txn_begin(&self) -> Result<Self::Txn>;

    fn txn_commit(&self, txn: Self::Txn, opts: CommitOptions) -> Result<()>;

    fn read(
        &self,
        txn: Option<&mut Self::Txn>,
        tasks: &[Address],
        opts: ReadOptions,
        arena: &mut Arena,
    ) -> Result<()>;

    fn write(
        &self,
        txn: Option<&mut Self::Txn>,
        batch: &[(Address, Option<&[u8]>)],
        opts: WriteOptions,
    ) -> Result<()>;

    /// Keys of `collection` in substrate order, starting at `start`
    /// (inclusive) and bounded by [`KEY_UNKNOWN`](crate::types::KEY_UNKNOWN)
    /// (exclusive), at most `limit` of them.
    fn scan(
        &self,
        txn: Option<&mut Self::Txn>,
        collection: CollectionId,
        start: Key,
        limit: usize,
    ) -> Result<Vec<Key>>;

    /// Estimates for keys of `collection` in `[low, high)`.
    fn size_hint(&self, collection: CollectionId, low: Key, high: Key) -> Result<SizeEstimate>;
}
