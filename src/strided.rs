//! Strided views over caller memory.
//!
//! Every batched input is `(slice, element_stride, count)`; a zero stride
//! repeats element 0 for every index, which is the universal broadcast
//! mechanism for handing one collection, field or payload to many keys
//! without materializing arrays. A stride above 1 walks interleaved
//! layouts, e.g. the sources of a flattened `[s, t, e, s, t, e, ..]`
//! edge array with stride 3.

use crate::error::{Result, StoreError};
use crate::types::{Address, CollectionId, Key};

#[derive(Copy, Clone, Debug)]
pub struct Strided<'a, T> {
    items: &'a [T],
    stride: usize,
}

impl<'a, T> Strided<'a, T> {
    /// Dense view: element `i` comes from `items[i]`.
    pub fn new(items: &'a [T]) -> Self {
        Self { items, stride: 1 }
    }

    /// Broadcast a single element to every index.
    pub fn repeat(item: &'a T) -> Self {
        Self {
            items: std::slice::from_ref(item),
            stride: 0,
        }
    }

    /// Interleaved view with an explicit element stride.
    pub fn interleaved(items: &'a [T], stride: usize) -> Self {
        Self { items, stride }
    }

    pub fn is_broadcast(&self) -> bool {
        self.stride == 0
    }

    /// Checks the view can serve `count` elements.
    pub fn check(&self, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        if self.items.is_empty() {
            return Err(StoreError::Invalid("strided view over empty slice"));
        }
        let last = (count - 1) * self.stride;
        if last >= self.items.len() {
            return Err(StoreError::Invalid("strided view shorter than batch"));
        }
        Ok(())
    }

    pub fn get(&self, index: usize) -> &'a T {
        &self.items[index * self.stride]
    }
}

/// A batched read request: parallel strided collections and keys.
#[derive(Copy, Clone, Debug)]
pub struct ReadSpec<'a> {
    pub collections: Strided<'a, CollectionId>,
    pub keys: Strided<'a, Key>,
    pub count: usize,
}

impl<'a> ReadSpec<'a> {
    pub fn new(collections: Strided<'a, CollectionId>, keys: Strided<'a, Key>, count: usize) -> Self {
        Self {
            collections,
            keys,
            count,
        }
    }

    /// One collection, dense keys; the common shape.
    pub fn keys_in(collection: &'a CollectionId, keys: &'a [Key]) -> Self {
        Self {
            collections: Strided::repeat(collection),
            keys: Strided::new(keys),
            count: keys.len(),
        }
    }

    pub fn check(&self) -> Result<()> {
        self.collections.check(self.count)?;
        self.keys.check(self.count)
    }

    pub fn address(&self, index: usize) -> Address {
        Address::new(*self.collections.get(index), *self.keys.get(index))
    }
}

/// A batched write request; `None` payload erases the key.
#[derive(Copy, Clone, Debug)]
pub struct WriteSpec<'a> {
    pub collections: Strided<'a, CollectionId>,
    pub keys: Strided<'a, Key>,
    pub values: Strided<'a, Option<&'a [u8]>>,
    pub count: usize,
}

impl<'a> WriteSpec<'a> {
    pub fn new(
        collections: Strided<'a, CollectionId>,
        keys: Strided<'a, Key>,
        values: Strided<'a, Option<&'a [u8]>>,
        count: usize,
    ) -> Self {
        Self {
            collections,
            keys,
            values,
            count,
        }
    }

    /// One collection, dense keys and payloads.
    pub fn puts_in(
        collection: &'a CollectionId,
        keys: &'a [Key],
        values: &'a [Option<&'a [u8]>],
    ) -> Self {
        Self {
            collections: Strided::repeat(collection),
            keys: Strided::new(keys),
            values: Strided::new(values),
            count: keys.len(),
        }
    }

    pub fn check(&self) -> Result<()> {
        self.collections.check(self.count)?;
        self.keys.check(self.count)?;
        self.values.check(self.count)
    }

    pub fn address(&self, index: usize) -> Address {
        Address::new(*self.collections.get(index), *self.keys.get(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_and_broadcast() {
        let keys = [1i64, 2, 3];
        let dense = Strided::new(&keys);
        assert_eq!(*dense.get(2), 3);

        let col = CollectionId(7);
        let bcast = Strided::repeat(&col);
        assert!(bcast.is_broadcast());
        assert_eq!(*bcast.get(0), col);
        assert_eq!(*bcast.get(999), col);
        bcast.check(1000).unwrap();
    }

    #[test]
    fn interleaved_walks_flattened_rows() {
        // [s, t, e] rows, stride 3 picks every source.
        let flat = [1i64, 2, 100, 3, 4, 200];
        let sources = Strided::interleaved(&flat, 3);
        assert_eq!(*sources.get(0), 1);
        assert_eq!(*sources.get(1), 3);
        sources.check(2).unwrap();
        assert!(sources.check(3).is_err());
    }

    #[test]
    fn short_view_is_rejected() {
        let keys = [1i64];
        let view = Strided::new(&keys);
        assert!(view.check(2).is_err());
    }
}
