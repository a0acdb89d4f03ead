//! Document modality: semi-structured values over the blob plane.
//!
//! The substrate only ever sees canonical MessagePack bytes; this layer
//! parses, patches, projects and re-serializes at the API boundary, and
//! gathers fields across many documents into columnar buffers.

mod bson;
mod bytes;
mod cbor;
mod field;
mod format;
mod gather;
mod msgpack;
mod patch;
mod ubjson;
mod value;

pub use field::FieldRef;
pub use format::{DocFormat, CANONICAL};
pub use gather::{ColumnType, GatherColumns};
pub use value::{DocKind, DocValue};

use std::collections::BTreeSet;

use tracing::debug;

use crate::arena::{Arena, TapeView};
use crate::error::Result;
use crate::plane::{self, reborrow};
use crate::strided::{ReadSpec, Strided, WriteSpec};
use crate::substrate::{KvEngine, WriteOptions};
use crate::types::{Address, Options};
use crate::Store;

use format::{dump_any, parse_any};
use gather::GatherLayout;
use patch::{json_patch, merge_patch};

/// Deduplicated set of JSON-Pointer paths observed across a batch,
/// packed NUL-terminated in the arena.
pub struct GistView<'a> {
    bytes: &'a [u8],
    count: usize,
}

impl<'a> GistView<'a> {
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.bytes
            .split(|&b| b == 0)
            .take(self.count)
            .map(|raw| std::str::from_utf8(raw).expect("paths are UTF-8"))
    }
}

impl<E: KvEngine> Store<E> {
    /// Writes documents arriving in `format`, optionally targeted at a
    /// sub-field. Canonical whole-document writes pass straight through
    /// to the substrate; patch formats and field targets go through the
    /// batched read-modify-write pipeline. A `None` payload erases.
    pub fn docs_write(
        &self,
        mut txn: Option<&mut E::Txn>,
        spec: &WriteSpec<'_>,
        fields: Option<Strided<'_, FieldRef>>,
        format: DocFormat,
        opts: Options,
        arena: &mut Arena,
    ) -> Result<()> {
        spec.check()?;
        if let Some(fields) = &fields {
            fields.check(spec.count)?;
        }
        if spec.count == 0 {
            return Ok(());
        }
        debug!(tasks = spec.count, ?format, "docs.write");
        if fields.is_none() {
            if format == CANONICAL {
                return plane::write(&self.engine, txn, spec, opts);
            }
            if !format.is_patch() {
                return self.replace_docs(txn, spec, format, opts, arena);
            }
        }
        self.read_modify_write(reborrow(&mut txn), spec, fields, format, opts, arena)
    }

    /// Reads documents, optionally projecting one field per task, and
    /// re-serializes into `format`. Output entries land on the arena
    /// tape in task order; a missing document yields a missing entry.
    pub fn docs_read<'a>(
        &self,
        txn: Option<&mut E::Txn>,
        spec: &ReadSpec<'_>,
        fields: Option<Strided<'_, FieldRef>>,
        format: DocFormat,
        opts: Options,
        arena: &'a mut Arena,
    ) -> Result<TapeView<'a>> {
        spec.check()?;
        if let Some(fields) = &fields {
            fields.check(spec.count)?;
        }
        if fields.is_none() && format == CANONICAL {
            plane::read(&self.engine, txn, spec, opts, arena)?;
            return Ok(arena.tape());
        }
        plane::read(&self.engine, txn, spec, Options { lengths_only: false, ..opts }, arena)?;
        debug!(tasks = spec.count, ?format, "docs.read");

        // Parse each unique document once, even when the batch repeats
        // addresses.
        let mut parsed: Vec<Option<DocValue>> = Vec::new();
        parsed.resize_with(arena.keys.len(), || None);
        let mut rows: Vec<Option<usize>> = Vec::with_capacity(spec.count);
        {
            let tape = arena.tape.view();
            for index in 0..spec.count {
                let pos = unique_position(&arena.keys, spec.address(index));
                match tape.get(index) {
                    Some(bytes) => {
                        if parsed[pos].is_none() {
                            parsed[pos] = Some(parse_any(bytes, CANONICAL)?);
                        }
                        rows.push(Some(pos));
                    }
                    None => rows.push(None),
                }
            }
        }

        arena.tape.clear();
        let mut buf = Vec::new();
        // One null object shared by every missing field in the batch.
        let null_object = DocValue::Null;
        for index in 0..spec.count {
            let Some(pos) = rows[index] else {
                arena.tape.push(None)?;
                continue;
            };
            let doc = parsed[pos].as_ref().expect("parsed above");
            let part = match &fields {
                Some(fields) => fields.get(index).lookup(doc).unwrap_or(&null_object),
                None => doc,
            };
            buf.clear();
            dump_any(part, format, &mut buf)?;
            arena.tape.push(Some(&buf))?;
        }
        Ok(arena.tape())
    }

    /// Union set of JSON-Pointer paths present across the batch.
    pub fn docs_gist<'a>(
        &self,
        txn: Option<&mut E::Txn>,
        spec: &ReadSpec<'_>,
        opts: Options,
        arena: &'a mut Arena,
    ) -> Result<GistView<'a>> {
        spec.check()?;
        plane::read(&self.engine, txn, spec, Options { lengths_only: false, ..opts }, arena)?;

        let mut paths = BTreeSet::new();
        {
            let tape = arena.tape.view();
            for index in 0..tape.count() {
                // Duplicate tasks share tape positions; reparsing them
                // only re-inserts the same paths.
                let Some(bytes) = tape.get(index) else {
                    continue;
                };
                let doc = parse_any(bytes, CANONICAL)?;
                flatten_paths(&doc, &mut String::new(), &mut paths);
            }
        }
        debug!(docs = spec.count, paths = paths.len(), "docs.gist");

        arena.aux.clear();
        let count = paths.len();
        for path in &paths {
            arena.aux.try_reserve(path.len() + 1)?;
            arena.aux.extend_from_slice(path.as_bytes());
            arena.aux.push(0);
        }
        Ok(GistView {
            bytes: &arena.aux,
            count,
        })
    }

    /// Columnar gather of M fields over N documents; see [`GatherColumns`].
    pub fn docs_gather<'a>(
        &self,
        txn: Option<&mut E::Txn>,
        spec: &ReadSpec<'_>,
        fields: &[FieldRef],
        types: &[ColumnType],
        opts: Options,
        arena: &'a mut Arena,
    ) -> Result<GatherColumns<'a>> {
        spec.check()?;
        gather::check_request(fields.len(), types)?;
        plane::read(&self.engine, txn, spec, Options { lengths_only: false, ..opts }, arena)?;

        let docs = spec.count;
        let mut parsed: Vec<Option<DocValue>> = Vec::new();
        parsed.resize_with(arena.keys.len(), || None);
        let mut rows: Vec<Option<usize>> = Vec::with_capacity(docs);
        {
            let tape = arena.tape.view();
            for row in 0..docs {
                let pos = unique_position(&arena.keys, spec.address(row));
                match tape.get(row) {
                    Some(bytes) => {
                        if parsed[pos].is_none() {
                            parsed[pos] = Some(parse_any(bytes, CANONICAL)?);
                        }
                        rows.push(Some(pos));
                    }
                    None => rows.push(None),
                }
            }
        }

        let layout = GatherLayout::plan(docs, types);
        arena.block.clear();
        arena.grow_block(layout.total_bytes())?;
        arena.aux.clear();
        debug!(docs, fields = fields.len(), "docs.gather");

        let block = &mut arena.block;
        let tape = &mut arena.aux;
        let null_object = DocValue::Null;
        for row in 0..docs {
            let doc = rows[row]
                .and_then(|pos| parsed[pos].as_ref())
                .unwrap_or(&null_object);
            for (index, field) in fields.iter().enumerate() {
                let value = field.lookup(doc).unwrap_or(&null_object);
                gather::fill_cell(&layout, index, row, value, block, tape);
            }
        }
        Ok(GatherColumns::new(layout, &arena.block, &arena.aux))
    }

    fn replace_docs(
        &self,
        txn: Option<&mut E::Txn>,
        spec: &WriteSpec<'_>,
        format: DocFormat,
        opts: Options,
        arena: &mut Arena,
    ) -> Result<()> {
        arena.tape.clear();
        let mut buf = Vec::new();
        for index in 0..spec.count {
            match *spec.values.get(index) {
                None => arena.tape.push(None)?,
                Some(bytes) => {
                    let parsed = parse_any(bytes, format)?;
                    buf.clear();
                    dump_any(&parsed, CANONICAL, &mut buf)?;
                    arena.tape.push(Some(&buf))?;
                }
            }
        }
        let tape = arena.tape.view();
        let mut batch: Vec<(Address, Option<&[u8]>)> = Vec::with_capacity(spec.count);
        for index in 0..spec.count {
            batch.push((spec.address(index), tape.get(index)));
        }
        self.engine
            .write(txn, &batch, WriteOptions { flush: opts.flush })
    }

    fn read_modify_write(
        &self,
        mut txn: Option<&mut E::Txn>,
        spec: &WriteSpec<'_>,
        fields: Option<Strided<'_, FieldRef>>,
        format: DocFormat,
        opts: Options,
        arena: &mut Arena,
    ) -> Result<()> {
        let tasks: Vec<Address> = (0..spec.count).map(|i| spec.address(i)).collect();
        plane::read_addresses(
            &self.engine,
            reborrow(&mut txn),
            &tasks,
            Options {
                lengths_only: false,
                flush: false,
                track: opts.track,
            },
            arena,
        )?;

        // One slot per unique document; absent documents enter as Null so
        // a patch against a fresh key materializes its result.
        let mut docs: Vec<Option<DocValue>> = Vec::new();
        docs.resize_with(arena.keys.len(), || None);
        let mut erased = vec![false; arena.keys.len()];
        {
            let tape = arena.tape.view();
            for index in 0..spec.count {
                let pos = unique_position(&arena.keys, tasks[index]);
                if docs[pos].is_none() {
                    docs[pos] = Some(match tape.get(index) {
                        Some(bytes) => parse_any(bytes, CANONICAL)?,
                        None => DocValue::Null,
                    });
                }
                let doc = docs[pos].as_mut().expect("slot filled above");

                let Some(payload) = *spec.values.get(index) else {
                    *doc = DocValue::Null;
                    erased[pos] = true;
                    continue;
                };
                erased[pos] = false;
                let incoming = parse_any(payload, format)?;
                match fields.as_ref().map(|f| f.get(index)) {
                    Some(field) => match field.lookup_mut(doc) {
                        Some(part) => apply_payload(part, incoming, format)?,
                        // Patch formats skip missing paths; replacements
                        // materialize them.
                        None if format.is_patch() => {}
                        None => field.insert(doc, incoming)?,
                    },
                    None => apply_payload(doc, incoming, format)?,
                }
            }
        }

        arena.tape.clear();
        let mut buf = Vec::new();
        for (pos, doc) in docs.iter().enumerate() {
            if erased[pos] {
                arena.tape.push(None)?;
                continue;
            }
            let doc = doc.as_ref().expect("every unique slot belongs to a task");
            buf.clear();
            dump_any(doc, CANONICAL, &mut buf)?;
            arena.tape.push(Some(&buf))?;
        }

        let tape = arena.tape.view();
        let mut batch: Vec<(Address, Option<&[u8]>)> = Vec::with_capacity(arena.keys.len());
        for (pos, addr) in arena.keys.iter().enumerate() {
            batch.push((*addr, tape.get(pos)));
        }
        self.engine
            .write(txn, &batch, WriteOptions { flush: opts.flush })
    }
}

fn apply_payload(target: &mut DocValue, incoming: DocValue, format: DocFormat) -> Result<()> {
    match format {
        DocFormat::JsonPatch => json_patch(target, &incoming),
        DocFormat::JsonMergePatch => {
            merge_patch(target, &incoming);
            Ok(())
        }
        _ => {
            *target = incoming;
            Ok(())
        }
    }
}

fn unique_position(keys: &[Address], addr: Address) -> usize {
    keys.binary_search(&addr)
        .expect("task address missing from its own sorted batch")
}

/// Leaf JSON-Pointer paths of a document. Scalars at the root flatten to
/// the empty pointer; empty containers count as leaves.
fn flatten_paths(value: &DocValue, prefix: &mut String, out: &mut BTreeSet<String>) {
    match value {
        DocValue::Object(map) if !map.is_empty() => {
            for (key, item) in map {
                let rollback = prefix.len();
                prefix.push('/');
                prefix.push_str(&field::escape_segment(key));
                flatten_paths(item, prefix, out);
                prefix.truncate(rollback);
            }
        }
        DocValue::Array(items) if !items.is_empty() => {
            for (index, item) in items.iter().enumerate() {
                let rollback = prefix.len();
                prefix.push('/');
                prefix.push_str(&index.to_string());
                flatten_paths(item, prefix, out);
                prefix.truncate(rollback);
            }
        }
        _ => {
            out.insert(prefix.clone());
        }
    }
}
