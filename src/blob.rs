//! Blob modality: the batched data-plane exposed as-is. Values are
//! opaque byte sequences; an empty payload is present-but-empty, a
//! missing one is reported through the length sentinel.

use crate::arena::{Arena, TapeView};
use crate::error::Result;
use crate::plane;
use crate::strided::{ReadSpec, WriteSpec};
use crate::substrate::{KvEngine, SizeEstimate};
use crate::types::{CollectionId, Key, Options};
use crate::Store;

impl<E: KvEngine> Store<E> {
    /// Batched point reads. Outputs land on the arena tape in task
    /// order; requesting `lengths_only` skips payload materialization.
    pub fn read<'a>(
        &self,
        txn: Option<&mut E::Txn>,
        spec: &ReadSpec<'_>,
        opts: Options,
        arena: &'a mut Arena,
    ) -> Result<TapeView<'a>> {
        plane::read(&self.engine, txn, spec, opts, arena)?;
        Ok(arena.tape())
    }

    /// Batched writes in caller order; a `None` payload erases.
    pub fn write(
        &self,
        txn: Option<&mut E::Txn>,
        spec: &WriteSpec<'_>,
        opts: Options,
    ) -> Result<()> {
        plane::write(&self.engine, txn, spec, opts)
    }

    /// Keys of one collection in substrate order, starting at `start`
    /// and capped at `limit`.
    pub fn scan(
        &self,
        txn: Option<&mut E::Txn>,
        collection: CollectionId,
        start: Key,
        limit: usize,
    ) -> Result<Vec<Key>> {
        self.engine.scan(txn, collection, start, limit)
    }

    /// Cardinality and byte estimates per `[low, high)` key range.
    pub fn size_estimates(
        &self,
        collection: CollectionId,
        ranges: &[(Key, Key)],
    ) -> Result<Vec<SizeEstimate>> {
        ranges
            .iter()
            .map(|&(low, high)| self.engine.size_hint(collection, low, high))
            .collect()
    }
}
