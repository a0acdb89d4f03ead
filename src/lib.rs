//! trikv — a unified multi-modal key-value engine.
//!
//! Three logically distinct data modalities — opaque blobs, structured
//! documents and graphs — share one sorted key-value substrate, one
//! batched request shape, and one caller-owned arena for outputs.
//!
//! ```
//! use trikv::{Arena, CollectionId, Options, ReadSpec, Store, WriteSpec};
//!
//! let store = Store::in_memory();
//! let mut arena = Arena::new();
//! let col = CollectionId::MAIN;
//!
//! let payload: Option<&[u8]> = Some(b"hello");
//! store
//!     .write(
//!         None,
//!         &WriteSpec::puts_in(&col, &[1], std::slice::from_ref(&payload)),
//!         Options::DEFAULT,
//!     )
//!     .unwrap();
//! let found = store
//!     .read(None, &ReadSpec::keys_in(&col, &[1]), Options::DEFAULT, &mut arena)
//!     .unwrap();
//! assert_eq!(found.get(0), Some(&b"hello"[..]));
//! ```

#![forbid(unsafe_code)]

pub mod arena;
mod blob;
pub mod docs;
mod error;
pub mod graph;
mod plane;
mod strided;
pub mod substrate;
pub mod types;

pub use arena::{Arena, TapeView};
pub use docs::{ColumnType, DocFormat, DocValue, FieldRef, GatherColumns, GistView};
pub use error::{Result, StoreError};
pub use graph::{EdgesView, GraphCollection, GraphConfig, VertexStream};
pub use strided::{ReadSpec, Strided, WriteSpec};
pub use substrate::{CommitOptions, KvEngine, MemEngine, SizeEstimate};
pub use types::{
    Address, CollectionId, Edge, Key, Options, Role, DEGREE_MISSING, EDGE_ID_ANY, KEY_UNKNOWN,
    LEN_MISSING,
};

/// Root handle owning the substrate engine.
///
/// The store owns transactions, a transaction is exclusive to its owner,
/// and every modality operation takes the transaction and the arena
/// explicitly; nothing holds back-references.
pub struct Store<E: KvEngine = MemEngine> {
    pub(crate) engine: E,
}

impl Store<MemEngine> {
    /// A store over the reference in-memory engine.
    pub fn in_memory() -> Self {
        Store::new(MemEngine::default())
    }
}

impl<E: KvEngine> Store<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Opens an optimistic transaction. Writes buffer until commit;
    /// reads with the `track` option join the conflict set.
    pub fn begin(&self) -> Result<E::Txn> {
        self.engine.txn_begin()
    }

    /// Commits, surfacing a retryable [`StoreError::Conflict`] when a
    /// tracked read lost its race.
    pub fn commit(&self, txn: E::Txn, opts: Options) -> Result<()> {
        self.engine
            .txn_commit(txn, CommitOptions { flush: opts.flush })
    }
}
