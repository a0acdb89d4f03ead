//! Graph modality: a symmetric inverted index over edges, keyed by
//! vertex. Every mutation keeps the two sides of each edge in lockstep;
//! observing one side without the other is a fatal bug, never a state.

mod adjacency;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::arena::Arena;
use crate::error::{Result, StoreError};
use crate::plane::{self, reborrow};
use crate::strided::Strided;
use crate::substrate::{KvEngine, WriteOptions};
use crate::types::{Address, CollectionId, Edge, Key, Options, Role, DEGREE_MISSING, KEY_UNKNOWN};
use crate::Store;

use adjacency::AdjacencyEntry;

/// Shape booleans a wrapper declares for one graph. The core primitives
/// do not enforce them; they exist so collaborators can.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct GraphConfig {
    pub directed: bool,
    pub multi: bool,
    pub allow_self_loops: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            directed: true,
            multi: true,
            allow_self_loops: true,
        }
    }
}

/// Per-vertex degrees plus the decoded edges, borrowed from the arena.
/// Do not hold across the arena's next mutation.
pub struct EdgesView<'a> {
    degrees: &'a [u32],
    edges: &'a [Edge],
}

impl<'a> EdgesView<'a> {
    /// Degree per queried vertex; [`DEGREE_MISSING`] marks an absent one.
    pub fn degrees(&self) -> &'a [u32] {
        self.degrees
    }

    /// All decoded edges, concatenated in query order.
    pub fn edges(&self) -> &'a [Edge] {
        self.edges
    }

    /// The edges belonging to the `index`-th queried vertex.
    pub fn edges_of(&self, index: usize) -> &'a [Edge] {
        let mut start = 0usize;
        for &deg in &self.degrees[..index] {
            if deg != DEGREE_MISSING {
                start += deg as usize;
            }
        }
        let count = match self.degrees[index] {
            DEGREE_MISSING => 0,
            deg => deg as usize,
        };
        &self.edges[start..start + count]
    }
}

impl<E: KvEngine> Store<E> {
    /// Inserts edges into the adjacency index, both sides per edge. A
    /// record already present is left alone, so re-upserting is free.
    pub fn graph_upsert_edges(
        &self,
        mut txn: Option<&mut E::Txn>,
        collections: Strided<'_, CollectionId>,
        edges: &[Edge],
        opts: Options,
        arena: &mut Arena,
    ) -> Result<()> {
        collections.check(edges.len())?;
        if edges.is_empty() {
            return Ok(());
        }
        let mut entries = self.load_touched(reborrow(&mut txn), collections, edges, opts, arena)?;
        for (index, edge) in edges.iter().enumerate() {
            let collection = *collections.get(index);
            entry_of(&mut entries, collection, edge.source).insert_out(edge.target, edge.id);
            entry_of(&mut entries, collection, edge.target).insert_in(edge.source, edge.id);
        }
        debug!(edges = edges.len(), vertices = entries.len(), "graph.upsert_edges");
        self.write_entries(txn, entries, opts)
    }

    /// Removes edges; edges not found are silently skipped. An edge id of
    /// [`EDGE_ID_ANY`](crate::types::EDGE_ID_ANY) matches the first
    /// record with the given endpoints on each side.
    pub fn graph_remove_edges(
        &self,
        mut txn: Option<&mut E::Txn>,
        collections: Strided<'_, CollectionId>,
        edges: &[Edge],
        opts: Options,
        arena: &mut Arena,
    ) -> Result<()> {
        collections.check(edges.len())?;
        if edges.is_empty() {
            return Ok(());
        }
        let mut entries = self.load_touched(reborrow(&mut txn), collections, edges, opts, arena)?;
        for (index, edge) in edges.iter().enumerate() {
            let collection = *collections.get(index);
            // Vertices without an entry stay without one; removal never
            // materializes anything.
            let removed = match entries
                .get_mut(&Address::new(collection, edge.source))
                .and_then(Option::as_mut)
            {
                Some(entry) => entry.remove_out(edge.target, edge.id),
                None => continue,
            };
            let Some(edge_id) = removed else {
                continue;
            };
            let other = entries
                .get_mut(&Address::new(collection, edge.target))
                .and_then(Option::as_mut)
                .and_then(|entry| entry.remove_in(edge.source, edge_id));
            if other.is_none() {
                return Err(StoreError::Fatal("adjacency asymmetry detected"));
            }
        }
        debug!(edges = edges.len(), vertices = entries.len(), "graph.remove_edges");
        self.write_entries(txn, entries, opts)
    }

    /// Removes vertices with a per-vertex role filter, cleaning up every
    /// record that references them from the opposite side. One batched
    /// substrate round-trip per fan-out level.
    pub fn graph_remove_vertices(
        &self,
        mut txn: Option<&mut E::Txn>,
        collections: Strided<'_, CollectionId>,
        vertices: &[Key],
        roles: Strided<'_, Role>,
        opts: Options,
        arena: &mut Arena,
    ) -> Result<()> {
        collections.check(vertices.len())?;
        roles.check(vertices.len())?;
        if vertices.is_empty() {
            return Ok(());
        }

        // Level one: the vertex entries themselves.
        let mut addrs: Vec<Address> = (0..vertices.len())
            .map(|i| Address::new(*collections.get(i), vertices[i]))
            .collect();
        addrs.sort_unstable();
        addrs.dedup();
        let mut entries = self.read_entries(reborrow(&mut txn), &addrs, opts, arena)?;

        // Level two: every neighbor referenced through a filtered role.
        let mut fanout: Vec<Address> = Vec::new();
        for index in 0..vertices.len() {
            let addr = Address::new(*collections.get(index), vertices[index]);
            let role = *roles.get(index);
            let Some(Some(entry)) = entries.get(&addr) else {
                continue;
            };
            if role.includes_source() {
                fanout.extend(
                    entry
                        .out
                        .iter()
                        .map(|&(n, _)| Address::new(addr.collection, n)),
                );
            }
            if role.includes_target() {
                fanout.extend(
                    entry
                        .inc
                        .iter()
                        .map(|&(n, _)| Address::new(addr.collection, n)),
                );
            }
        }
        fanout.sort_unstable();
        fanout.dedup();
        fanout.retain(|addr| !entries.contains_key(addr));
        if !fanout.is_empty() {
            let neighbors = self.read_entries(reborrow(&mut txn), &fanout, opts, arena)?;
            entries.extend(neighbors);
        }

        for index in 0..vertices.len() {
            let vertex = vertices[index];
            let addr = Address::new(*collections.get(index), vertex);
            let role = *roles.get(index);
            let Some(Some(entry)) = entries.get(&addr).cloned() else {
                continue;
            };
            if role.includes_source() {
                // Edges leaving the vertex live in the neighbors' in-lists.
                for &(neighbor, _) in &entry.out {
                    let peer = entries
                        .get_mut(&Address::new(addr.collection, neighbor))
                        .and_then(Option::as_mut)
                        .ok_or(StoreError::Fatal("adjacency asymmetry detected"))?;
                    peer.strip_in(vertex);
                }
            }
            if role.includes_target() {
                for &(neighbor, _) in &entry.inc {
                    let peer = entries
                        .get_mut(&Address::new(addr.collection, neighbor))
                        .and_then(Option::as_mut)
                        .ok_or(StoreError::Fatal("adjacency asymmetry detected"))?;
                    peer.strip_out(vertex);
                }
            }
            match role {
                Role::Any => {
                    *entries.get_mut(&addr).expect("loaded above") = None;
                }
                Role::Source => {
                    if let Some(Some(own)) = entries.get_mut(&addr) {
                        own.out.clear();
                    }
                }
                Role::Target => {
                    if let Some(Some(own)) = entries.get_mut(&addr) {
                        own.inc.clear();
                    }
                }
            }
        }
        debug!(vertices = vertices.len(), touched = entries.len(), "graph.remove_vertices");
        self.write_entries(txn, entries, opts)
    }

    /// Degrees and (unless `lengths_only`) decoded edges for each queried
    /// vertex; the edges live in the arena until its next mutation.
    pub fn graph_find_edges<'a>(
        &self,
        txn: Option<&mut E::Txn>,
        collections: Strided<'_, CollectionId>,
        vertices: &[Key],
        roles: Strided<'_, Role>,
        opts: Options,
        arena: &'a mut Arena,
    ) -> Result<EdgesView<'a>> {
        collections.check(vertices.len())?;
        roles.check(vertices.len())?;
        let tasks: Vec<Address> = (0..vertices.len())
            .map(|i| Address::new(*collections.get(i), vertices[i]))
            .collect();
        plane::read_addresses(
            &self.engine,
            txn,
            &tasks,
            Options { lengths_only: false, ..opts },
            arena,
        )?;

        arena.degrees.clear();
        arena.edges.clear();
        let tape = arena.tape.view();
        for index in 0..vertices.len() {
            let role = *roles.get(index);
            let Some(bytes) = tape.get(index) else {
                arena.degrees.push(DEGREE_MISSING);
                continue;
            };
            if opts.lengths_only {
                let (out_count, in_count) = AdjacencyEntry::decode_counts(bytes)?;
                arena.degrees.push(match role {
                    Role::Source => out_count,
                    Role::Target => in_count,
                    Role::Any => out_count + in_count,
                });
                continue;
            }
            let entry = AdjacencyEntry::decode(bytes)?;
            let vertex = vertices[index];
            let mut count = 0u32;
            if role.includes_source() {
                for &(neighbor, edge) in &entry.out {
                    arena.edges.push(Edge::new(vertex, neighbor, edge));
                    count += 1;
                }
            }
            if role.includes_target() {
                for &(neighbor, edge) in &entry.inc {
                    arena.edges.push(Edge::new(neighbor, vertex, edge));
                    count += 1;
                }
            }
            arena.degrees.push(count);
        }
        trace!(vertices = vertices.len(), edges = arena.edges.len(), "graph.find_edges");
        Ok(EdgesView {
            degrees: &arena.degrees,
            edges: &arena.edges,
        })
    }

    /// Convenience handle for one graph collection.
    pub fn graph(&self, collection: CollectionId) -> GraphCollection<'_, E> {
        GraphCollection {
            store: self,
            collection,
            config: GraphConfig::default(),
        }
    }

    fn load_touched(
        &self,
        txn: Option<&mut E::Txn>,
        collections: Strided<'_, CollectionId>,
        edges: &[Edge],
        opts: Options,
        arena: &mut Arena,
    ) -> Result<Entries> {
        let mut addrs: Vec<Address> = Vec::with_capacity(edges.len() * 2);
        for (index, edge) in edges.iter().enumerate() {
            let collection = *collections.get(index);
            addrs.push(Address::new(collection, edge.source));
            addrs.push(Address::new(collection, edge.target));
        }
        addrs.sort_unstable();
        addrs.dedup();
        self.read_entries(txn, &addrs, opts, arena)
    }

    fn read_entries(
        &self,
        txn: Option<&mut E::Txn>,
        addrs: &[Address],
        opts: Options,
        arena: &mut Arena,
    ) -> Result<Entries> {
        plane::read_addresses(
            &self.engine,
            txn,
            addrs,
            Options {
                lengths_only: false,
                flush: false,
                track: opts.track,
            },
            arena,
        )?;
        let tape = arena.tape.view();
        let mut entries = Entries::new();
        for (index, addr) in addrs.iter().enumerate() {
            let entry = match tape.get(index) {
                Some(bytes) => Some(AdjacencyEntry::decode(bytes)?),
                None => None,
            };
            entries.insert(*addr, entry);
        }
        Ok(entries)
    }

    fn write_entries(
        &self,
        txn: Option<&mut E::Txn>,
        entries: Entries,
        opts: Options,
    ) -> Result<()> {
        let mut blobs: Vec<(Address, Option<Vec<u8>>)> = Vec::with_capacity(entries.len());
        for (addr, entry) in entries {
            match entry {
                Some(entry) => {
                    let mut bytes = Vec::new();
                    entry.encode(&mut bytes);
                    blobs.push((addr, Some(bytes)));
                }
                None => blobs.push((addr, None)),
            }
        }
        let batch: Vec<(Address, Option<&[u8]>)> = blobs
            .iter()
            .map(|(addr, bytes)| (*addr, bytes.as_deref()))
            .collect();
        self.engine
            .write(txn, &batch, WriteOptions { flush: opts.flush })
    }
}

/// Loaded adjacency entries keyed by address; `None` marks a vertex
/// without an entry (or one erased mid-operation).
type Entries = BTreeMap<Address, Option<AdjacencyEntry>>;

fn entry_of(entries: &mut Entries, collection: CollectionId, vertex: Key) -> &mut AdjacencyEntry {
    entries
        .entry(Address::new(collection, vertex))
        .or_insert(None)
        .get_or_insert_with(AdjacencyEntry::default)
}

/// Borrowed view of one graph collection, mirroring the common queries a
/// wrapper needs. Holds no transaction; pass one per call.
pub struct GraphCollection<'a, E: KvEngine> {
    store: &'a Store<E>,
    collection: CollectionId,
    config: GraphConfig,
}

impl<'a, E: KvEngine> GraphCollection<'a, E> {
    pub fn with_config(mut self, config: GraphConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> GraphConfig {
        self.config
    }

    pub fn collection(&self) -> CollectionId {
        self.collection
    }

    /// Degree of one vertex; `None` when the vertex has no entry.
    pub fn degree(
        &self,
        txn: Option<&mut E::Txn>,
        vertex: Key,
        role: Role,
        arena: &mut Arena,
    ) -> Result<Option<u32>> {
        let view = self.store.graph_find_edges(
            txn,
            Strided::repeat(&self.collection),
            &[vertex],
            Strided::repeat(&role),
            Options {
                lengths_only: true,
                ..Options::DEFAULT
            },
            arena,
        )?;
        Ok(match view.degrees()[0] {
            DEGREE_MISSING => None,
            degree => Some(degree),
        })
    }

    /// Whether the vertex has an adjacency entry at all. Disconnected
    /// vertices removed role-by-role still count until erased.
    pub fn contains(
        &self,
        txn: Option<&mut E::Txn>,
        vertex: Key,
        arena: &mut Arena,
    ) -> Result<bool> {
        self.degree(txn, vertex, Role::Any, arena)
            .map(|deg| deg.is_some())
    }

    /// Every edge touching `vertex` in the given role. With `Role::Any`
    /// the out-portion precedes the in-portion.
    pub fn edges<'b>(
        &self,
        txn: Option<&mut E::Txn>,
        vertex: Key,
        role: Role,
        arena: &'b mut Arena,
    ) -> Result<&'b [Edge]> {
        let view = self.store.graph_find_edges(
            txn,
            Strided::repeat(&self.collection),
            &[vertex],
            Strided::repeat(&role),
            Options::DEFAULT,
            arena,
        )?;
        Ok(view.edges())
    }

    /// Edges from `source` to `target`, found by binary search in the
    /// source's out-list.
    pub fn edges_between<'b>(
        &self,
        txn: Option<&mut E::Txn>,
        source: Key,
        target: Key,
        arena: &'b mut Arena,
    ) -> Result<&'b [Edge]> {
        let all = self.edges(txn, source, Role::Source, arena)?;
        let start = all.partition_point(|edge| edge.target < target);
        let end = all.partition_point(|edge| edge.target <= target);
        Ok(&all[start..end])
    }

    /// Neighbor records canonicalized so that `source == vertex`,
    /// regardless of each edge's stored direction.
    pub fn neighbors<'b>(
        &self,
        txn: Option<&mut E::Txn>,
        vertex: Key,
        arena: &'b mut Arena,
    ) -> Result<&'b [Edge]> {
        self.store.graph_find_edges(
            txn,
            Strided::repeat(&self.collection),
            &[vertex],
            Strided::repeat(&Role::Any),
            Options::DEFAULT,
            arena,
        )?;
        for edge in &mut arena.edges {
            if edge.target == vertex {
                std::mem::swap(&mut edge.source, &mut edge.target);
            }
        }
        Ok(&arena.edges)
    }

    /// Successor vertex keys (targets of the out-list).
    pub fn successors(
        &self,
        txn: Option<&mut E::Txn>,
        vertex: Key,
        arena: &mut Arena,
    ) -> Result<Vec<Key>> {
        Ok(self
            .edges(txn, vertex, Role::Source, arena)?
            .iter()
            .map(|edge| edge.target)
            .collect())
    }

    /// Predecessor vertex keys (sources of the in-list).
    pub fn predecessors(
        &self,
        txn: Option<&mut E::Txn>,
        vertex: Key,
        arena: &mut Arena,
    ) -> Result<Vec<Key>> {
        Ok(self
            .edges(txn, vertex, Role::Target, arena)?
            .iter()
            .map(|edge| edge.source)
            .collect())
    }

    /// Iterator over vertex keys in substrate order. The read-ahead
    /// window is a cooperative hint; the stream observes committed state.
    pub fn vertices(&self, read_ahead: usize) -> VertexStream<'a, E> {
        VertexStream {
            store: self.store,
            collection: self.collection,
            read_ahead: read_ahead.max(1),
            buffer: Vec::new(),
            cursor: 0,
            next_start: Key::MIN,
            exhausted: false,
        }
    }
}

/// Default read-ahead window for [`GraphCollection::vertices`].
pub const DEFAULT_READ_AHEAD: usize = 256;

pub struct VertexStream<'a, E: KvEngine> {
    store: &'a Store<E>,
    collection: CollectionId,
    read_ahead: usize,
    buffer: Vec<Key>,
    cursor: usize,
    next_start: Key,
    exhausted: bool,
}

impl<'a, E: KvEngine> VertexStream<'a, E> {
    pub fn next(&mut self) -> Result<Option<Key>> {
        if self.cursor == self.buffer.len() {
            if self.exhausted {
                return Ok(None);
            }
            self.buffer = self.store.engine.scan(
                None,
                self.collection,
                self.next_start,
                self.read_ahead,
            )?;
            self.cursor = 0;
            match self.buffer.last() {
                Some(&last) => {
                    self.exhausted = last == KEY_UNKNOWN - 1 || self.buffer.len() < self.read_ahead;
                    self.next_start = last.saturating_add(1);
                }
                None => {
                    self.exhausted = true;
                    return Ok(None);
                }
            }
        }
        let key = self.buffer[self.cursor];
        self.cursor += 1;
        Ok(Some(key))
    }
}
