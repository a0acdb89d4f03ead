use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::arena::Arena;
use crate::error::{Result, StoreError};
use crate::types::{Address, CollectionId, Key, KEY_UNKNOWN, LEN_MISSING};

use super::{CommitOptions, KvEngine, ReadOptions, SizeEstimate, WriteOptions};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MemEngineOptions {
    /// Acknowledge `flush` requests as already durable. The in-memory
    /// engine has no secondary medium, so this only affects logging.
    pub ack_flush: bool,
}

impl Default for MemEngineOptions {
    fn default() -> Self {
        Self { ack_flush: true }
    }
}

#[derive(Default)]
struct MemEngineMetrics {
    reads: AtomicU64,
    writes: AtomicU64,
    commits: AtomicU64,
    conflicts: AtomicU64,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct MemEngineMetricsSnapshot {
    pub reads: u64,
    pub writes: u64,
    pub commits: u64,
    pub conflicts: u64,
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<Address, Vec<u8>>,
    /// Last modification sequence per address, kept across erases so a
    /// tracked read of a later-deleted key still conflicts.
    versions: HashMap<Address, u64>,
    seq: u64,
}

impl Inner {
    fn version_of(&self, addr: &Address) -> u64 {
        self.versions.get(addr).copied().unwrap_or(0)
    }

    fn apply(&mut self, addr: Address, payload: Option<Vec<u8>>) {
        self.seq += 1;
        self.versions.insert(addr, self.seq);
        match payload {
            Some(bytes) => {
                self.entries.insert(addr, bytes);
            }
            None => {
                self.entries.remove(&addr);
            }
        }
    }
}

/// Reference substrate: a sorted map guarded by one reader-writer lock,
/// with buffered optimistic transactions. Shareable across threads for
/// independent transactions; a transaction handle is single-owner.
pub struct MemEngine {
    inner: RwLock<Inner>,
    opts: MemEngineOptions,
    metrics: MemEngineMetrics,
}

/// Buffered transaction state: an uncommitted write overlay plus the
/// versions observed by tracked reads.
pub struct MemTxn {
    writes: BTreeMap<Address, Option<Vec<u8>>>,
    read_set: Vec<(Address, u64)>,
}

impl Default for MemEngine {
    fn default() -> Self {
        Self::new(MemEngineOptions::default())
    }
}

impl MemEngine {
    pub fn new(opts: MemEngineOptions) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            opts,
            metrics: MemEngineMetrics::default(),
        }
    }

    pub fn metrics(&self) -> MemEngineMetricsSnapshot {
        MemEngineMetricsSnapshot {
            reads: self.metrics.reads.load(Ordering::Relaxed),
            writes: self.metrics.writes.load(Ordering::Relaxed),
            commits: self.metrics.commits.load(Ordering::Relaxed),
            conflicts: self.metrics.conflicts.load(Ordering::Relaxed),
        }
    }
}

impl KvEngine for MemEngine {
    type Txn = MemTxn;

    fn txn_begin(&self) -> Result<MemTxn> {
        trace!("mem.txn_begin");
        Ok(MemTxn {
            writes: BTreeMap::new(),
            read_set: Vec::new(),
        })
    }

    fn txn_commit(&self, txn: MemTxn, opts: CommitOptions) -> Result<()> {
        let mut inner = self.inner.write();
        for (addr, observed) in &txn.read_set {
            if inner.version_of(addr) != *observed {
                self.metrics.conflicts.fetch_add(1, Ordering::Relaxed);
                debug!(addr = %addr, "mem.txn_commit.conflict");
                return Err(StoreError::Conflict);
            }
        }
        let pending = txn.writes.len();
        for (addr, payload) in txn.writes {
            inner.apply(addr, payload);
        }
        self.metrics.commits.fetch_add(1, Ordering::Relaxed);
        debug!(
            pending,
            flush = opts.flush && self.opts.ack_flush,
            "mem.txn_commit"
        );
        Ok(())
    }

    fn read(
        &self,
        txn: Option<&mut MemTxn>,
        tasks: &[Address],
        opts: ReadOptions,
        arena: &mut Arena,
    ) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }
        let inner = self.inner.read();
        let overlay = txn.as_ref().map(|t| &t.writes);
        let mut tracked = Vec::new();
        for addr in tasks {
            // The overlay wins inside a transaction; tracked reads that
            // hit it need no validation since the data is our own.
            let (found, own_write): (Option<&[u8]>, bool) = match overlay.and_then(|w| w.get(addr))
            {
                Some(pending) => (pending.as_deref(), true),
                None => (inner.entries.get(addr).map(Vec::as_slice), false),
            };
            if opts.track && !own_write {
                tracked.push((*addr, inner.version_of(addr)));
            }
            if opts.lengths_only {
                arena
                    .tape
                    .push_len(found.map_or(LEN_MISSING, |b| b.len() as u32))?;
            } else {
                arena.tape.push(found)?;
            }
        }
        drop(inner);
        if let Some(txn) = txn {
            txn.read_set.extend(tracked);
        }
        self.metrics
            .reads
            .fetch_add(tasks.len() as u64, Ordering::Relaxed);
        trace!(tasks = tasks.len(), lengths_only = opts.lengths_only, "mem.read");
        Ok(())
    }

    fn write(
        &self,
        txn: Option<&mut MemTxn>,
        batch: &[(Address, Option<&[u8]>)],
        opts: WriteOptions,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        match txn {
            Some(txn) => {
                for (addr, payload) in batch {
                    txn.writes.insert(*addr, payload.map(<[u8]>::to_vec));
                }
            }
            None => {
                let mut inner = self.inner.write();
                for (addr, payload) in batch {
                    inner.apply(*addr, payload.map(<[u8]>::to_vec));
                }
            }
        }
        self.metrics
            .writes
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
        trace!(
            batch = batch.len(),
            flush = opts.flush && self.opts.ack_flush,
            "mem.write"
        );
        Ok(())
    }

    fn scan(
        &self,
        txn: Option<&mut MemTxn>,
        collection: CollectionId,
        start: Key,
        limit: usize,
    ) -> Result<Vec<Key>> {
        let low = Address::new(collection, start);
        let high = Address::new(collection, KEY_UNKNOWN);
        let inner = self.inner.read();
        let mut keys: Vec<Key> = inner
            .entries
            .range(low..high)
            .map(|(addr, _)| addr.key)
            .collect();
        if let Some(txn) = txn {
            for (addr, payload) in txn.writes.range(low..high) {
                match payload {
                    Some(_) => {
                        if let Err(pos) = keys.binary_search(&addr.key) {
                            keys.insert(pos, addr.key);
                        }
                    }
                    None => {
                        if let Ok(pos) = keys.binary_search(&addr.key) {
                            keys.remove(pos);
                        }
                    }
                }
            }
        }
        keys.truncate(limit);
        trace!(collection = %collection, start, found = keys.len(), "mem.scan");
        Ok(keys)
    }

    fn size_hint(&self, collection: CollectionId, low: Key, high: Key) -> Result<SizeEstimate> {
        let inner = self.inner.read();
        let mut estimate = SizeEstimate::default();
        let range = Address::new(collection, low)..Address::new(collection, high);
        for (_, bytes) in inner.entries.range(range) {
            estimate.cardinality += 1;
            estimate.bytes_total += bytes.len() as u64;
        }
        Ok(estimate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(key: Key) -> Address {
        Address::new(CollectionId::MAIN, key)
    }

    #[test]
    fn autocommit_write_then_read() {
        let engine = MemEngine::default();
        let mut arena = Arena::new();
        engine
            .write(None, &[(addr(1), Some(b"hello"))], WriteOptions::default())
            .unwrap();
        engine
            .read(None, &[addr(1), addr(2)], ReadOptions::default(), &mut arena)
            .unwrap();
        let tape = arena.tape();
        assert_eq!(tape.get(0), Some(&b"hello"[..]));
        assert_eq!(tape.get(1), None);
    }

    #[test]
    fn txn_buffers_until_commit() {
        let engine = MemEngine::default();
        let mut arena = Arena::new();
        let mut txn = engine.txn_begin().unwrap();
        engine
            .write(
                Some(&mut txn),
                &[(addr(7), Some(b"pending"))],
                WriteOptions::default(),
            )
            .unwrap();

        // Not visible outside the transaction yet.
        engine
            .read(None, &[addr(7)], ReadOptions::default(), &mut arena)
            .unwrap();
        assert_eq!(arena.tape().get(0), None);

        // Visible through the transaction's own overlay.
        arena.reset();
        engine
            .read(Some(&mut txn), &[addr(7)], ReadOptions::default(), &mut arena)
            .unwrap();
        assert_eq!(arena.tape().get(0), Some(&b"pending"[..]));

        engine.txn_commit(txn, CommitOptions::default()).unwrap();
        arena.reset();
        engine
            .read(None, &[addr(7)], ReadOptions::default(), &mut arena)
            .unwrap();
        assert_eq!(arena.tape().get(0), Some(&b"pending"[..]));
    }

    #[test]
    fn tracked_read_conflicts_on_interleaved_write() {
        let engine = MemEngine::default();
        let mut arena = Arena::new();
        let mut txn = engine.txn_begin().unwrap();
        engine
            .read(
                Some(&mut txn),
                &[addr(3)],
                ReadOptions {
                    track: true,
                    lengths_only: false,
                },
                &mut arena,
            )
            .unwrap();

        engine
            .write(None, &[(addr(3), Some(b"raced"))], WriteOptions::default())
            .unwrap();

        let err = engine.txn_commit(txn, CommitOptions::default()).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(engine.metrics().conflicts, 1);
    }

    #[test]
    fn scan_merges_txn_overlay() {
        let engine = MemEngine::default();
        engine
            .write(
                None,
                &[(addr(1), Some(b"a")), (addr(3), Some(b"c"))],
                WriteOptions::default(),
            )
            .unwrap();
        let mut txn = engine.txn_begin().unwrap();
        engine
            .write(
                Some(&mut txn),
                &[(addr(2), Some(b"b")), (addr(3), None)],
                WriteOptions::default(),
            )
            .unwrap();
        let keys = engine
            .scan(Some(&mut txn), CollectionId::MAIN, i64::MIN, 10)
            .unwrap();
        assert_eq!(keys, vec![1, 2]);
    }

    #[test]
    fn erase_bumps_version() {
        let engine = MemEngine::default();
        let mut arena = Arena::new();
        engine
            .write(None, &[(addr(9), Some(b"x"))], WriteOptions::default())
            .unwrap();

        let mut txn = engine.txn_begin().unwrap();
        engine
            .read(
                Some(&mut txn),
                &[addr(9)],
                ReadOptions {
                    track: true,
                    lengths_only: true,
                },
                &mut arena,
            )
            .unwrap();
        engine
            .write(None, &[(addr(9), None)], WriteOptions::default())
            .unwrap();
        assert!(engine
            .txn_commit(txn, CommitOptions::default())
            .is_err());
    }
}
