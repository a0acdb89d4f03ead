//! Call-scoped scratch memory.
//!
//! Every core operation writes its outputs into an [`Arena`] supplied by
//! the caller and returns borrowed views into it. The arena lives one
//! call deep by default; callers may hoist one across calls to amortize
//! allocation, but it is single-owner and the views it hands out are
//! invalidated by the next operation that takes it by `&mut`.

use crate::error::{Result, StoreError};
use crate::types::{Address, Edge, LEN_MISSING};

/// Concatenated payloads plus parallel per-task offset/length arrays.
///
/// A length of [`LEN_MISSING`] marks an absent value; zero marks a
/// present-but-empty one. Offsets and lengths are 32-bit, so one tape
/// holds at most 4 GiB of contents.
#[derive(Default)]
pub struct ByteTape {
    bytes: Vec<u8>,
    offsets: Vec<u32>,
    lengths: Vec<u32>,
}

impl ByteTape {
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.offsets.clear();
        self.lengths.clear();
    }

    pub fn count(&self) -> usize {
        self.offsets.len()
    }

    /// Appends one entry; `None` records the missing sentinel.
    pub fn push(&mut self, payload: Option<&[u8]>) -> Result<()> {
        match payload {
            Some(bytes) => {
                if bytes.len() as u64 >= LEN_MISSING as u64 {
                    return Err(StoreError::Fatal("value length reaches sentinel"));
                }
                let offset = self.offset_for(bytes.len())?;
                self.bytes.try_reserve(bytes.len())?;
                self.bytes.extend_from_slice(bytes);
                self.push_entry(offset, bytes.len() as u32)
            }
            None => self.push_entry(self.bytes.len() as u32, LEN_MISSING),
        }
    }

    /// Appends a length-only entry without payload bytes.
    pub fn push_len(&mut self, len: u32) -> Result<()> {
        self.push_entry(0, len)
    }

    /// Starts a new entry at the current end of the contents.
    pub fn begin_entry(&mut self) -> u32 {
        self.bytes.len() as u32
    }

    /// Grows the open entry with more payload bytes.
    pub fn extend_entry(&mut self, chunk: &[u8]) -> Result<()> {
        self.bytes.try_reserve(chunk.len())?;
        self.bytes.extend_from_slice(chunk);
        Ok(())
    }

    /// Seals the entry opened by [`ByteTape::begin_entry`].
    pub fn end_entry(&mut self, start: u32) -> Result<()> {
        let len = self.bytes.len() as u64 - start as u64;
        if len >= LEN_MISSING as u64 {
            return Err(StoreError::Fatal("value length reaches sentinel"));
        }
        self.push_entry(start, len as u32)
    }

    fn offset_for(&self, extra: usize) -> Result<u32> {
        let end = self.bytes.len() as u64 + extra as u64;
        if end > u32::MAX as u64 {
            return Err(StoreError::Fatal("tape offset overflows 32 bits"));
        }
        Ok(self.bytes.len() as u32)
    }

    fn push_entry(&mut self, offset: u32, length: u32) -> Result<()> {
        self.offsets.try_reserve(1)?;
        self.lengths.try_reserve(1)?;
        self.offsets.push(offset);
        self.lengths.push(length);
        Ok(())
    }

    /// Rebuilds the offset/length arrays so entry `i` of the result is the
    /// current entry `positions[i]`. Duplicated positions share payload
    /// bytes; the contents are left untouched.
    pub fn scatter(&mut self, positions: &[usize]) -> Result<()> {
        let mut offsets = Vec::new();
        let mut lengths = Vec::new();
        offsets.try_reserve(positions.len())?;
        lengths.try_reserve(positions.len())?;
        for &pos in positions {
            offsets.push(self.offsets[pos]);
            lengths.push(self.lengths[pos]);
        }
        self.offsets = offsets;
        self.lengths = lengths;
        Ok(())
    }

    pub fn view(&self) -> TapeView<'_> {
        TapeView {
            bytes: &self.bytes,
            offsets: &self.offsets,
            lengths: &self.lengths,
        }
    }
}

/// Borrowed view of a [`ByteTape`]; valid until the arena mutates.
#[derive(Copy, Clone)]
pub struct TapeView<'a> {
    bytes: &'a [u8],
    offsets: &'a [u32],
    lengths: &'a [u32],
}

impl<'a> TapeView<'a> {
    pub fn count(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Payload of entry `index`; `None` when the value is missing or the
    /// tape was produced by a length-only read and holds no contents.
    pub fn get(&self, index: usize) -> Option<&'a [u8]> {
        let len = self.lengths[index];
        if len == LEN_MISSING {
            return None;
        }
        let start = self.offsets[index] as usize;
        self.bytes.get(start..start + len as usize)
    }

    /// Raw length of entry `index` ([`LEN_MISSING`] when absent).
    pub fn length(&self, index: usize) -> u32 {
        self.lengths[index]
    }

    pub fn offsets(&self) -> &'a [u32] {
        self.offsets
    }

    pub fn lengths(&self) -> &'a [u32] {
        self.lengths
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&'a [u8]>> + '_ {
        (0..self.count()).map(move |i| self.get(i))
    }
}

/// Per-call scratch allocator with named regions.
///
/// Regions: a sort/dedupe key buffer, the growing output tape, a block
/// region for gather column layouts, an auxiliary byte tape for string
/// contents and packed paths, and decoded graph buffers.
#[derive(Default)]
pub struct Arena {
    pub(crate) keys: Vec<Address>,
    pub(crate) tape: ByteTape,
    pub(crate) block: Vec<u8>,
    pub(crate) aux: Vec<u8>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) degrees: Vec<u32>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all contents while keeping capacity for reuse.
    pub fn reset(&mut self) {
        self.keys.clear();
        self.tape.clear();
        self.block.clear();
        self.aux.clear();
        self.edges.clear();
        self.degrees.clear();
    }

    /// The batched outputs of the most recent read-like operation.
    pub fn tape(&self) -> TapeView<'_> {
        self.tape.view()
    }

    /// Sorted-unique addresses prepared by the most recent batched call.
    pub fn prepared_keys(&self) -> &[Address] {
        &self.keys
    }

    pub(crate) fn grow_block(&mut self, len: usize) -> Result<&mut [u8]> {
        self.block.try_reserve(len)?;
        let start = self.block.len();
        self.block.resize(start + len, 0);
        Ok(&mut self.block[start..])
    }
}
